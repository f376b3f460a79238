use crate::domain::{DomainError, DomainResult};
use std::time::Duration;

/// Sizing and freshness settings for the telemetry cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Number of keys tracked by the admission frequency sketch (default: 1000)
    pub num_counters: usize,

    /// Total cost budget, roughly bytes (default: 500 MiB)
    pub max_cost: u64,

    /// Capacity of the pending write buffer (default: 64)
    pub buffer_items: usize,

    /// How long an entry is served after it was stored (default: 5 minutes)
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            num_counters: 1000,
            max_cost: 500 << 20,
            buffer_items: 64,
            ttl: Duration::from_secs(5 * 60),
        }
    }
}

impl CacheConfig {
    pub fn with_max_cost(mut self, max_cost: u64) -> Self {
        self.max_cost = max_cost;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_buffer_items(mut self, buffer_items: usize) -> Self {
        self.buffer_items = buffer_items;
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.num_counters == 0 {
            return Err(DomainError::CacheInitError(
                "num_counters must be greater than zero".to_string(),
            ));
        }
        if self.max_cost == 0 {
            return Err(DomainError::CacheInitError(
                "max_cost must be greater than zero".to_string(),
            ));
        }
        if self.buffer_items == 0 {
            return Err(DomainError::CacheInitError(
                "buffer_items must be greater than zero".to_string(),
            ));
        }
        if self.ttl.is_zero() {
            return Err(DomainError::CacheInitError(
                "ttl must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.num_counters, 1000);
        assert_eq!(config.max_cost, 524_288_000);
        assert_eq!(config.buffer_items, 64);
        assert_eq!(config.ttl, Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_values_are_rejected() {
        let configs = [
            CacheConfig {
                num_counters: 0,
                ..Default::default()
            },
            CacheConfig::default().with_max_cost(0),
            CacheConfig::default().with_buffer_items(0),
            CacheConfig::default().with_ttl(Duration::ZERO),
        ];

        for config in configs {
            assert!(matches!(
                config.validate(),
                Err(DomainError::CacheInitError(_))
            ));
        }
    }
}
