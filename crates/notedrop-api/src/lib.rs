//! HTTP API for notedrop.
//!
//! This crate wires the domain policy engine and the storage backend into
//! an axum application: request extractors for bearer-token auth, the
//! storage-to-policy adapter, error mapping, structured logging setup, and
//! the route handlers themselves.

pub mod adapters;
pub mod auth;
pub mod errors;
pub mod http;
pub mod observability;

pub use errors::ApiError;
pub use http::{create_router, create_router_with_body_limit, AppState};
