//! Session history stores for Parley.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryHistory;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteHistory;

use parley_config::HistoryConfig;
use parley_core::error::HistoryError;
use parley_core::history::HistoryStore;
use std::sync::Arc;
use tracing::info;

/// Open the history backend named by `history.backend`.
pub async fn open_from_config(config: &HistoryConfig) -> Result<Arc<dyn HistoryStore>, HistoryError> {
    match config.backend.as_str() {
        "memory" => {
            info!("Using in-memory history (not persisted)");
            Ok(Arc::new(InMemoryHistory::new()))
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let path = config.resolved_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    HistoryError::Storage(format!("Cannot create {}: {e}", parent.display()))
                })?;
            }
            let store = SqliteHistory::open(&path.to_string_lossy()).await?;
            Ok(Arc::new(store))
        }
        other => Err(HistoryError::Storage(format!(
            "Unsupported history backend: {other}"
        ))),
    }
}
