//! notedrop-storage: Storage abstraction layer
//!
//! This crate provides the storage abstraction for notedrop, including:
//! - DataStore trait for entity operations
//! - In-memory implementation backing tests and single-node deployments
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             notedrop-storage                 │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs - DataStore trait + filters      │
//! │  memory.rs - In-memory implementation       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Read-then-write sequences with cross-row invariants (cumulative file
//! size, membership ceilings, invitation consumption) are single trait
//! methods, so every backend can make them atomic. The memory backend
//! serializes them under one lock.

pub mod error;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use memory::MemoryDataStore;
pub use traits::{
    DataStore, NewNote, NewNoteFile, NewRating, NewUser, NoteChanges, NoteFilter, UniversityFilter,
    UserFilter,
};
