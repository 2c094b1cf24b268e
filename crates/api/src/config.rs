//! Runtime configuration, read once at startup and passed down.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_POD_LOG_TAIL_LINES: i64 = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckConfig {
    /// SQLite file holding composite workload records.
    pub db_path: String,
    /// Explicit kubeconfig; the default client chain is used when unset.
    pub kubeconfig: Option<PathBuf>,
    pub pod_log_tail_lines: i64,
    pub field_manager: String,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            db_path: deck_persist::default_db_path(),
            kubeconfig: None,
            pod_log_tail_lines: DEFAULT_POD_LOG_TAIL_LINES,
            field_manager: deck_ops::DEFAULT_FIELD_MANAGER.to_string(),
        }
    }
}

impl DeckConfig {
    /// `DECK_DB_PATH`, `DECK_KUBECONFIG`, `DECK_POD_LOG_TAIL_LINES`, `DECK_FIELD_MANAGER`.
    pub fn from_env() -> Self { Self::from_lookup(|k| std::env::var(k).ok()) }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        let mut pod_log_tail_lines = DEFAULT_POD_LOG_TAIL_LINES;
        if let Some(raw) = get("DECK_POD_LOG_TAIL_LINES") {
            match raw.parse::<i64>() {
                Ok(n) if n > 0 => pod_log_tail_lines = n,
                _ => warn!(value = %raw, "invalid DECK_POD_LOG_TAIL_LINES; using default"),
            }
        }
        Self {
            db_path: get("DECK_DB_PATH").unwrap_or_else(deck_persist::default_db_path),
            kubeconfig: get("DECK_KUBECONFIG").map(PathBuf::from),
            pod_log_tail_lines,
            field_manager: get("DECK_FIELD_MANAGER").unwrap_or_else(|| deck_ops::DEFAULT_FIELD_MANAGER.to_string()),
        }
    }
}
