//! Store selection.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use flowhands_protocols::store::FlowStore;

use crate::memory::MemoryStore;
use crate::sqlite::SqliteStore;

/// Open the durable store at `path`, falling back to the in-memory store
/// when no path is given or the database cannot be opened.
pub async fn open_store(path: Option<&Path>) -> Arc<dyn FlowStore> {
    let Some(path) = path else {
        info!("No database path configured, using in-memory store");
        return Arc::new(MemoryStore::new());
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("Cannot create database directory {:?}: {}", parent, e);
            }
        }
    }

    match SqliteStore::open(path).await {
        Ok(store) => {
            info!("Using SQLite store at {:?}", path);
            Arc::new(store)
        }
        Err(e) => {
            warn!(
                "Cannot open SQLite store at {:?}: {}. Falling back to in-memory store",
                path, e
            );
            Arc::new(MemoryStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowhands_protocols::store::RunStore;

    #[tokio::test]
    async fn test_no_path_uses_memory() {
        let store = open_store(None).await;
        assert_eq!(store.id(), "memory");
    }

    #[tokio::test]
    async fn test_path_opens_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("flows.db");
        let store = open_store(Some(&path)).await;
        assert_eq!(store.id(), "sqlite");
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_unopenable_path_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        // A directory is not a database file.
        let store = open_store(Some(dir.path())).await;
        assert_eq!(store.id(), "memory");
    }
}
