//! Controller-wide tunables.
//!
//! Kept deliberately small: wiring these from a config file, environment, or
//! CLI is out of scope, so this is a plain struct rather than a layered
//! configuration crate.

/// Tunables for a [`crate::controller::Controller`] instance.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Default `max_entries` used by a [`crate::graph::Graph`] fetch when the
    /// caller does not pin a viewport width.
    pub default_max_entries: u64,
    /// Upper bound on concurrently in-flight `graph_fetch_async` /
    /// `table_fetch_async` requests before new ones queue behind the
    /// Controller's request map lock.
    pub max_concurrent_fetches: usize,
    /// Soft budget, in bytes, for cached per-event property arrays
    /// (CallStack/FlowControl/ExtData) before the Controller starts evicting
    /// on the next `delete_event_property_for` opportunity.
    pub event_property_cache_budget_bytes: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_max_entries: 2048,
            max_concurrent_fetches: 64,
            event_property_cache_budget_bytes: 64 * 1024 * 1024,
        }
    }
}
