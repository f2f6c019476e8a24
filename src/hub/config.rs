//! Hub configuration

use std::time::Duration;

/// Tunables for a hub and the pipes it creates.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Flush interval applied to newly added pipes. Zero writes every
    /// message immediately; subscribers can change their own interval at
    /// runtime via control frames.
    pub default_interval: Duration,

    /// Capacity of each pipe's outbound queue. A full queue applies
    /// backpressure to `send_all` for that one pipe.
    pub outbound_capacity: usize,

    /// Capacity of each pipe's inbound delivery queue. A full queue stalls
    /// that pipe's inbound loop until the owner drains it.
    pub delivery_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            default_interval: Duration::ZERO,
            outbound_capacity: 20,
            delivery_capacity: 20,
        }
    }
}

impl HubConfig {
    /// Config with a given default flush interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            default_interval: interval,
            ..Default::default()
        }
    }

    /// Set the default flush interval for new pipes.
    pub fn default_interval(mut self, interval: Duration) -> Self {
        self.default_interval = interval;
        self
    }

    /// Set the outbound queue capacity (minimum 1).
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Set the delivery queue capacity (minimum 1).
    pub fn delivery_capacity(mut self, capacity: usize) -> Self {
        self.delivery_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();

        assert_eq!(config.default_interval, Duration::ZERO);
        assert_eq!(config.outbound_capacity, 20);
        assert_eq!(config.delivery_capacity, 20);
    }

    #[test]
    fn test_with_interval() {
        let config = HubConfig::with_interval(Duration::from_millis(100));

        assert_eq!(config.default_interval, Duration::from_millis(100));
        assert_eq!(config.outbound_capacity, 20);
    }

    #[test]
    fn test_builder_chaining() {
        let config = HubConfig::default()
            .default_interval(Duration::from_secs(1))
            .outbound_capacity(64)
            .delivery_capacity(8);

        assert_eq!(config.default_interval, Duration::from_secs(1));
        assert_eq!(config.outbound_capacity, 64);
        assert_eq!(config.delivery_capacity, 8);
    }

    #[test]
    fn test_builder_capacity_floor() {
        // Zero-capacity queues cannot exist; the builder floors at 1.
        let config = HubConfig::default().outbound_capacity(0).delivery_capacity(0);

        assert_eq!(config.outbound_capacity, 1);
        assert_eq!(config.delivery_capacity, 1);
    }
}
