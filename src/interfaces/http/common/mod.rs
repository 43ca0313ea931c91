//! Shared HTTP building blocks: response envelope, error mapping, extractors

pub mod api_error;
pub mod response;
pub mod validated_json;

pub use api_error::ApiError;
pub use response::{ApiResponse, MessageResponse};
pub use validated_json::ValidatedJson;
