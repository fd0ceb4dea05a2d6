//! HTTP layer: application state, router, and handlers.

pub mod routes;
pub mod state;

#[cfg(test)]
mod tests;

pub use routes::{create_router, create_router_with_body_limit};
pub use state::AppState;
