use std::sync::Arc;

use serde_json::Value;

/// Callback handed to an adapter's config-changed hook.
pub type AdapterConfigListener = Arc<dyn Fn(Value) + Send + Sync>;

/// Shared handle to an adapter.
pub type AdapterRef = Arc<dyn XAdapter>;

/// The request adapter the plugin is installed with.
///
/// The core never issues requests itself; it only holds the adapter so
/// feature actions can reach it, and bridges its config changes onto the bus.
pub trait XAdapter: Send + Sync {
    /// Human-readable adapter name, used in logs.
    fn name(&self) -> &str;

    /// Register `listener` for adapter configuration changes.
    ///
    /// Returns `false` when the adapter has no such hook.
    fn add_config_changed_listener(&self, _listener: AdapterConfigListener) -> bool {
        false
    }
}
