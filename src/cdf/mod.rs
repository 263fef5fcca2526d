//! Data modeling API integration module.
//!
//! This module provides the transport used by the resource loaders: the
//! [`ResourceApi`] contract, the partial-failure type it reports, and the
//! HTTP client that implements it against the data modeling endpoints.

mod api;
mod client;
mod types;

pub use api::{ApiFailure, ApiResult, ResourceApi};
pub use client::CdfClient;
pub use types::{ErrorBody, ErrorResponse, ItemsRequest, ItemsResponse};
