//! Data stack configuration.

use objsync_store::{MergePolicy, StoreConfig};

/// Configuration for opening a [`DataStack`](crate::DataStack).
#[derive(Debug, Clone)]
pub struct StackConfig {
    /// Where the store keeps its data.
    pub store: StoreConfig,

    /// Merge policy of background contexts.
    pub background_merge_policy: MergePolicy,

    /// Merge policy of the view context.
    pub view_merge_policy: MergePolicy,

    /// Whether the view context absorbs commits from other contexts.
    pub automatically_merges_changes: bool,

    /// Prefix for context queue thread names.
    pub queue_label: String,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::in_memory(),
            background_merge_policy: MergePolicy::ObjectTrump,
            view_merge_policy: MergePolicy::StoreTrump,
            automatically_merges_changes: true,
            queue_label: "objsync".to_string(),
        }
    }
}

impl StackConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the store configuration.
    #[must_use]
    pub fn store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Sets the background context merge policy.
    #[must_use]
    pub fn background_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.background_merge_policy = policy;
        self
    }

    /// Sets the view context merge policy.
    #[must_use]
    pub fn view_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.view_merge_policy = policy;
        self
    }

    /// Sets whether the view context absorbs other contexts' commits.
    #[must_use]
    pub fn automatically_merges_changes(mut self, value: bool) -> Self {
        self.automatically_merges_changes = value;
        self
    }

    /// Sets the queue label prefix.
    #[must_use]
    pub fn queue_label(mut self, label: impl Into<String>) -> Self {
        self.queue_label = label.into();
        self
    }
}
