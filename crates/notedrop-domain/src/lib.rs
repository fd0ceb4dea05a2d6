//! notedrop-domain: Core domain logic for the notedrop backend
//!
//! This crate contains the decision logic of the system:
//! - Entity types and the ownership seam
//! - Access policy engine (per-endpoint predicate conjunctions)
//! - Quota guard (storage ceilings and free-tier group limits)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              notedrop-domain                 │
//! ├─────────────────────────────────────────────┤
//! │  model.rs  - Entities, Owned trait,         │
//! │              derived aggregates             │
//! │  policy.rs - Access policy engine           │
//! │  quota.rs  - Storage & membership quotas    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Policies read entity state through the narrow [`policy::AccessReader`]
//! trait; the HTTP layer adapts the storage backend to it. Nothing in this
//! crate performs I/O of its own.

pub mod error;
pub mod model;
pub mod policy;
pub mod quota;

// Re-export commonly used types at the crate root
pub use error::{DomainError, DomainResult};
pub use model::Owned;
pub use policy::{evaluate, AccessReader, AccessRequest, Policy, Verb};
