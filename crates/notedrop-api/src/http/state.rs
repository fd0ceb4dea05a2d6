//! Application state for HTTP handlers.

use std::sync::Arc;

use notedrop_storage::DataStore;

use crate::adapters::StoreAccessReader;

/// Shared state: the storage backend and its policy-reader adapter.
pub struct AppState<S: DataStore> {
    pub storage: Arc<S>,
    pub reader: StoreAccessReader<S>,
}

impl<S: DataStore> AppState<S> {
    pub fn new(storage: Arc<S>) -> Self {
        let reader = StoreAccessReader::new(Arc::clone(&storage));
        Self { storage, reader }
    }
}

impl<S: DataStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            reader: self.reader.clone(),
        }
    }
}
