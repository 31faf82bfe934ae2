//! Dispatch configuration.

use std::time::Duration;

use derive_builder::Builder;

/// Configuration for dispatch, polling, and result retrieval.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct DispatchConfig {
    /// Interval between remote status polls.
    #[builder(default = "Duration::from_millis(500)")]
    pub poll_interval: Duration,

    /// Overall deadline for one job to reach a terminal state.
    #[builder(default = "Duration::from_secs(600)")]
    pub poll_deadline: Duration,

    /// Retries for a result download that reports the resource missing.
    #[builder(default = "3")]
    pub download_retries: u32,

    /// Delay between download retries.
    #[builder(default = "Duration::from_millis(500)")]
    pub download_retry_delay: Duration,

    /// Whether to rewrite path-bearing slots for the remote OS.
    #[builder(default = "true")]
    pub normalize_paths: bool,
}

impl DispatchConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(interval) = self.poll_interval {
            if interval.is_zero() {
                return Err("poll_interval must be non-zero".into());
            }
        }
        if let (Some(interval), Some(deadline)) = (self.poll_interval, self.poll_deadline) {
            if deadline < interval {
                return Err("poll_deadline must be at least poll_interval".into());
            }
        }
        Ok(())
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            poll_deadline: Duration::from_secs(600),
            download_retries: 3,
            download_retry_delay: Duration::from_millis(500),
            normalize_paths: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.poll_deadline, Duration::from_secs(600));
        assert_eq!(config.download_retries, 3);
        assert!(config.normalize_paths);
    }

    #[test]
    fn test_builder_rejects_zero_interval() {
        let result = DispatchConfigBuilder::default()
            .poll_interval(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_deadline_below_interval() {
        let result = DispatchConfigBuilder::default()
            .poll_interval(Duration::from_secs(10))
            .poll_deadline(Duration::from_secs(1))
            .build();
        assert!(result.is_err());
    }
}
