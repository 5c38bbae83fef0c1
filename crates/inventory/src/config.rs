//! Organizer configuration.

use chrono::Duration;

use crate::dedup::DEFAULT_DEDUP_WINDOW_MS;
use crate::ordering::SortKey;

pub const ENV_DEDUP_WINDOW_MS: &str = "STOWAGE_DEDUP_WINDOW_MS";
pub const ENV_MERGE_AFTER_SORT: &str = "STOWAGE_MERGE_AFTER_SORT";
pub const ENV_SORT_KEY: &str = "STOWAGE_SORT_KEY";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizerConfig {
    /// Confirmations with the same command id closer together than this are duplicates.
    pub dedup_window: Duration,
    /// Fold compatible stacks together when sorting.
    pub merge_after_sort: bool,
    pub sort_key: SortKey,
}

impl Default for OrganizerConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::milliseconds(DEFAULT_DEDUP_WINDOW_MS),
            merge_after_sort: true,
            sort_key: SortKey::Name,
        }
    }
}

impl OrganizerConfig {
    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    pub fn with_merge_after_sort(mut self, merge: bool) -> Self {
        self.merge_after_sort = merge;
        self
    }

    pub fn with_sort_key(mut self, key: SortKey) -> Self {
        self.sort_key = key;
        self
    }

    /// Defaults overridden by `STOWAGE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns. Unparseable values are logged and
    /// ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_DEDUP_WINDOW_MS) {
            match raw.trim().parse::<i64>() {
                Ok(ms) if ms >= 0 => config.dedup_window = Duration::milliseconds(ms),
                _ => tracing::warn!(value = %raw, "invalid {ENV_DEDUP_WINDOW_MS}, using default"),
            }
        }

        if let Some(raw) = lookup(ENV_MERGE_AFTER_SORT) {
            match raw.trim().parse::<bool>() {
                Ok(merge) => config.merge_after_sort = merge,
                Err(_) => tracing::warn!(value = %raw, "invalid {ENV_MERGE_AFTER_SORT}, using default"),
            }
        }

        if let Some(raw) = lookup(ENV_SORT_KEY) {
            match raw.parse::<SortKey>() {
                Ok(key) => config.sort_key = key,
                Err(err) => tracing::warn!(value = %raw, "invalid {ENV_SORT_KEY}, using default: {err}"),
            }
        }

        config
    }
}
