pub mod clock;
pub mod errors;
pub mod shutdown;
pub mod utils;

pub use clock::*;
pub use errors::*;
pub use shutdown::*;
pub use utils::*;
