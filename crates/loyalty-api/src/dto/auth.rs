use serde::{Deserialize, Serialize};
use validator::Validate;

/// Body of `/register` and `/login`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CredentialsRequest {
    #[validate(length(min = 1, max = 255, message = "must be 1-255 characters"))]
    pub login: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
