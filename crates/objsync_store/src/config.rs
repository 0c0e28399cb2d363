//! Store configuration.

use std::path::PathBuf;

/// Where a store keeps its data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StoreKind {
    /// Rows live in memory only and vanish when the store is dropped.
    #[default]
    InMemory,
    /// Rows live in memory and every commit is journaled to this directory.
    File(PathBuf),
}

/// Configuration for opening a [`LocalStore`](crate::LocalStore).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Storage location.
    pub kind: StoreKind,

    /// Whether to create the store directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to sync the journal on every commit (safer but slower).
    pub sync_on_commit: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::InMemory,
            create_if_missing: true,
            sync_on_commit: true,
        }
    }
}

impl StoreConfig {
    /// Creates an in-memory configuration.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Creates a configuration journaling to `path`.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: StoreKind::File(path.into()),
            ..Self::default()
        }
    }

    /// Sets whether to create the directory if missing.
    #[must_use]
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync the journal on every commit.
    #[must_use]
    pub fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.kind, StoreKind::InMemory);
        assert!(config.create_if_missing);
        assert!(config.sync_on_commit);
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::file("/tmp/objsync")
            .create_if_missing(false)
            .sync_on_commit(false);
        assert_eq!(config.kind, StoreKind::File(PathBuf::from("/tmp/objsync")));
        assert!(!config.create_if_missing);
        assert!(!config.sync_on_commit);
    }
}
