//! Command-line entry point of the `reqctx` server.

use std::time::Duration;

use clap::Parser;
use reqctx_server::{
    telemetry, ExecutorConfig, LogFormat, NetworkConfig, NetworkModule, RejectionPolicy,
    ServerConfig,
};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "reqctx-server", version, about = "Request context demo service")]
struct Args {
    /// Bind address.
    #[arg(long, env = "REQCTX_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Listen port; 0 picks a free port.
    #[arg(long, env = "REQCTX_PORT", default_value_t = 8080)]
    port: u16,

    /// Allowed CORS origins, comma separated; `*` allows any.
    #[arg(long, env = "REQCTX_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    cors_origins: Vec<String>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "REQCTX_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout_secs: u64,

    /// Worker threads kept alive when idle.
    #[arg(long, env = "REQCTX_CORE_POOL_SIZE", default_value_t = 5)]
    core_pool_size: usize,

    /// Upper bound on worker threads.
    #[arg(long, env = "REQCTX_MAX_POOL_SIZE", default_value_t = 10)]
    max_pool_size: usize,

    /// Tasks that may wait for a worker.
    #[arg(long, env = "REQCTX_QUEUE_CAPACITY", default_value_t = 100)]
    queue_capacity: usize,

    /// What to do with a task when the pool is saturated.
    #[arg(long, env = "REQCTX_REJECTION_POLICY", value_enum, default_value_t = RejectionPolicy::CallerRuns)]
    rejection_policy: RejectionPolicy,

    /// Idle time in seconds after which a session is discarded.
    #[arg(long, env = "REQCTX_SESSION_TTL_SECS", default_value_t = 1800)]
    session_ttl_secs: u64,

    /// Log line format.
    #[arg(long, env = "REQCTX_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Log filter in `EnvFilter` syntax.
    #[arg(long, env = "RUST_LOG", default_value = "info,reqctx_server=debug,reqctx_core=debug")]
    log_filter: String,
}

impl Args {
    fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            cors_origins: self.cors_origins.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..NetworkConfig::default()
        }
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            executor: ExecutorConfig {
                core_pool_size: self.core_pool_size,
                max_pool_size: self.max_pool_size,
                queue_capacity: self.queue_capacity,
                rejection_policy: self.rejection_policy,
                ..ExecutorConfig::default()
            },
            session_ttl: Duration::from_secs(self.session_ttl_secs),
            ..ServerConfig::default()
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    telemetry::init(args.log_format, &args.log_filter)?;

    let mut module = NetworkModule::new(args.network_config(), args.server_config());
    let port = module.start().await?;
    info!(port, "Request context demo service started");

    module.serve(shutdown_signal()).await
}
