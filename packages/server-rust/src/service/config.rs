use std::time::Duration;

use super::executor::ExecutorConfig;

/// Server-level configuration for the service layer.
///
/// Controls the background executor, session lifetime, and background task
/// intervals.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Pool used for asynchronous continuations.
    pub executor: ExecutorConfig,
    /// Sessions idle for longer than this are discarded.
    pub session_ttl: Duration,
    /// Interval between session reaper runs.
    pub session_reap_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            session_ttl: Duration::from_secs(30 * 60),
            session_reap_interval: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.session_ttl, Duration::from_secs(1800));
        assert_eq!(config.session_reap_interval, Duration::from_secs(60));
        assert_eq!(config.executor.core_pool_size, 5);
    }
}
