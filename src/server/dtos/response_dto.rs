use serde::{Deserialize, Serialize};

/// success envelope, same shape the admin frontend already parses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub message: String,
    pub code: i32,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(message: String, code: i32, data: T) -> Self {
        Self {
            message,
            code,
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub message: String,
    pub code: i32,
    pub error: String,
}
