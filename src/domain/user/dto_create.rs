/// Input for inserting a user. The password is already hashed; the store
/// never sees plaintext.
#[derive(Debug, Clone)]
pub struct CreateUserDto {
    pub email: String,
    pub password_hash: String,
}
