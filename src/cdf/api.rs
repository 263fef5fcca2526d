//! Transport contract used by the resource loaders.

use async_trait::async_trait;
use std::fmt;

use crate::error::{ApiError, SyncError};
use crate::schema::ResourceKind;

/// A failed remote call.
///
/// A rejected request applies nothing. `failed` names the items the API
/// blamed for the rejection, or every requested item when it named none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFailure<Id> {
    /// HTTP status code, `0` when no response was received.
    pub status: u16,
    /// Human readable message.
    pub message: String,
    /// Identities of the items that failed.
    pub failed: Vec<Id>,
}

/// Result of a remote call.
pub type ApiResult<T, Id> = std::result::Result<T, ApiFailure<Id>>;

/// Remote CRUD operations for one resource kind.
///
/// Implementations must omit unknown ids from `retrieve` results rather
/// than failing, and must tolerate deleting ids that no longer exist.
#[async_trait]
pub trait ResourceApi<K: ResourceKind>: Send + Sync {
    /// Creates (applies) the given resources.
    async fn create(&self, items: &[K::Write]) -> ApiResult<Vec<K::Read>, K::Id>;

    /// Retrieves resources by identity.
    async fn retrieve(&self, ids: &[K::Id]) -> ApiResult<Vec<K::Read>, K::Id>;

    /// Updates existing resources in place.
    async fn update(&self, items: &[K::Write]) -> ApiResult<Vec<K::Read>, K::Id>;

    /// Deletes resources, returning the identities actually deleted.
    async fn delete(&self, ids: &[K::Id]) -> ApiResult<Vec<K::Id>, K::Id>;
}

impl<Id> ApiFailure<Id> {
    /// Creates a failure that applies to every given item.
    #[must_use]
    pub fn new(status: u16, message: impl Into<String>, failed: Vec<Id>) -> Self {
        Self {
            status,
            message: message.into(),
            failed,
        }
    }

    /// Builds a failure from a transport error.
    #[must_use]
    pub fn from_error(error: &ApiError, failed: Vec<Id>) -> Self {
        Self::new(error.status(), error.to_string(), failed)
    }

    /// Returns true for rate limiting, server-side and network failures.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.status == 0 || self.status == 429 || self.status >= 500
    }
}

impl<Id: fmt::Display> fmt::Display for ApiFailure<Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (status {})", self.message, self.status)?;
        if !self.failed.is_empty() {
            let ids: Vec<String> = self.failed.iter().map(ToString::to_string).collect();
            write!(f, " [{}]", ids.join(", "))?;
        }
        Ok(())
    }
}

impl<Id> From<ApiFailure<Id>> for SyncError {
    fn from(failure: ApiFailure<Id>) -> Self {
        if failure.status == 0 {
            Self::Api(ApiError::network(failure.message))
        } else {
            Self::Api(ApiError::request_failed(failure.status, failure.message))
        }
    }
}
