//! Listener and HTTP settings.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Interface to bind, e.g. `0.0.0.0` or `127.0.0.1`.
    pub host: String,
    /// `0` asks the OS for a free port; `NetworkModule::start` reports the real one.
    pub port: u16,
    /// Origins admitted by CORS. `"*"` admits all of them.
    pub cors_origins: Vec<String>,
    /// Requests still running after this are answered with `408`.
    pub request_timeout: Duration,
    /// Longest time shutdown waits for the worker pool to drain.
    pub drain_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8080,
            cors_origins: vec!["*".to_owned()],
            request_timeout: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(30),
        }
    }
}
