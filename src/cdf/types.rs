//! Wire envelopes of the data modeling API.

use serde::{Deserialize, Serialize};

/// Request body wrapping a batch of items.
#[derive(Debug, Serialize)]
pub struct ItemsRequest<'a, T> {
    /// The batch.
    pub items: &'a [T],
}

/// Response body wrapping a batch of items.
#[derive(Debug, Deserialize)]
pub struct ItemsResponse<T> {
    /// The batch.
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Error response body.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// The error.
    pub error: ErrorBody,
}

/// Error details, including the items a partial failure applies to.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    /// HTTP status code.
    pub code: u16,
    /// Human readable message.
    pub message: String,
    /// Referenced items that do not exist.
    #[serde(default)]
    pub missing: Vec<serde_json::Value>,
    /// Items given more than once or conflicting.
    #[serde(default)]
    pub duplicated: Vec<serde_json::Value>,
}

impl ErrorBody {
    /// Every item the error names.
    #[must_use]
    pub fn affected_items(&self) -> impl Iterator<Item = &serde_json::Value> {
        self.missing.iter().chain(self.duplicated.iter())
    }
}
