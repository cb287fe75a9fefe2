use std::time::Duration;

/// Configuration for an [`ExpireMap`](crate::ExpireMap).
///
/// By default reclamation is purely lazy: due entries are purged inside the
/// callers' own operations, and no background work runs at all. Enabling a
/// sweep interval adds a periodic task that reaps on a timer, for systems
/// that need memory to stay bounded even under zero traffic.
///
/// # Example
///
/// ```rust
/// use expire_map::MapConfig;
/// use std::time::Duration;
///
/// let config = MapConfig::default()
///     .with_sweep_interval(Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MapConfig {
    /// Interval between background sweeps (default: none, lazy reclamation only)
    pub sweep_interval: Option<Duration>,
}

impl MapConfig {
    /// Creates a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables the periodic background sweep.
    ///
    /// Maps built with a sweep interval must be constructed inside a Tokio
    /// runtime, which hosts the sweep task.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }
}
