//! Authentication API handlers

use axum::{body::Bytes, extract::State, http::StatusCode, Extension, Json};

use super::dto::{
    ChangePasswordRequest, LoginRequest, LoginResponse, LogoutRequest, RefreshRequest,
    RefreshResponse, RegisterRequest, UserInfo,
};
use crate::application::identity::LoginOutcome;
use crate::domain::DomainError;
use crate::interfaces::http::common::{ApiError, ApiResponse, MessageResponse, ValidatedJson};
use crate::interfaces::http::middleware::{AuthState, AuthenticatedUser};

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Authentication",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = ApiResponse<UserInfo>),
        (status = 400, description = "Validation error or weak password"),
        (status = 409, description = "Email already registered"),
        (status = 429, description = "Too many requests")
    )
)]
pub async fn register(
    State(state): State<AuthState>,
    ValidatedJson(request): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserInfo>>), ApiError> {
    let user = state.service.register(&request.email, &request.password).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(user.into()))))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair, or a two-factor challenge", body = ApiResponse<LoginResponse>),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many requests")
    )
)]
pub async fn login(
    State(state): State<AuthState>,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    let response = match state.service.login(&request.email, &request.password).await? {
        LoginOutcome::TokenIssued { user, tokens } => LoginResponse {
            requires_2fa: false,
            user_id: None,
            tokens: Some(tokens.into()),
            user: Some(user.into()),
        },
        LoginOutcome::TwoFactorRequired { user_id } => LoginResponse {
            requires_2fa: true,
            user_id: Some(user_id),
            tokens: None,
            user: None,
        },
    };

    Ok(Json(ApiResponse::success(response)))
}

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "Authentication",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token", body = ApiResponse<RefreshResponse>),
        (status = 401, description = "Refresh token invalid, expired or revoked")
    )
)]
pub async fn refresh(
    State(state): State<AuthState>,
    ValidatedJson(request): ValidatedJson<RefreshRequest>,
) -> Result<Json<ApiResponse<RefreshResponse>>, ApiError> {
    let access = state.service.refresh(&request.refresh_token).await?;
    Ok(Json(ApiResponse::success(access.into())))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Authentication",
    request_body(content = LogoutRequest, description = "Optional refresh token to revoke as well"),
    responses(
        (status = 200, description = "Token revoked", body = ApiResponse<MessageResponse>),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(state): State<AuthState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Bytes,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let request: LogoutRequest = if body.iter().all(u8::is_ascii_whitespace) {
        LogoutRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| DomainError::Validation(format!("Invalid JSON: {}", e)))?
    };

    state
        .service
        .logout(&user.token, request.refresh_token.as_deref())
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new("Logged out"))))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "Authentication",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<UserInfo>),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_current_user(
    State(state): State<AuthState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    let user = state.service.current_user(user.user_id).await?;
    Ok(Json(ApiResponse::success(user.into())))
}

#[utoipa::path(
    put,
    path = "/api/auth/change-password",
    tag = "Authentication",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = ApiResponse<MessageResponse>),
        (status = 400, description = "New password too weak"),
        (status = 401, description = "Current password is wrong")
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    State(state): State<AuthState>,
    Extension(user): Extension<AuthenticatedUser>,
    ValidatedJson(request): ValidatedJson<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .service
        .change_password(user.user_id, &request.current_password, &request.new_password)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new("Password changed"))))
}
