//! Tidewire server binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on all interfaces, port 80
//! tidewire-server
//!
//! # Local development
//! tidewire-server --server-ip 127.0.0.1 --server-port 8080 --log-level debug
//!
//! # Graceful shutdown
//! kill -HUP <pid>
//! ```

use std::{process::ExitCode, time::Duration};

use clap::Parser;
use tidewire_core::TaskScheduler;
use tidewire_server::{
    DEFAULT_MAX_CONNECTIONS, DEFAULT_SERVER_IP, DEFAULT_SERVER_PORT, EventLoop, ServerConfig,
    WireEchoFactory,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Tidewire event-loop server
#[derive(Parser, Debug)]
#[command(name = "tidewire-server")]
#[command(about = "Single-threaded TCP server speaking the tidewire wire format")]
#[command(version)]
struct Args {
    /// IP address to listen on
    #[arg(long, default_value = DEFAULT_SERVER_IP)]
    server_ip: String,

    /// TCP port to listen on
    #[arg(long, default_value_t = DEFAULT_SERVER_PORT)]
    server_port: u16,

    /// Maximum concurrent connections
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: usize,

    /// Longest poll wait in milliseconds while no request thread is ready
    #[arg(long, default_value_t = 100)]
    poll_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = ServerConfig {
        server_ip: args.server_ip,
        server_port: args.server_port,
        max_connections: args.max_connections,
        poll_timeout: Duration::from_millis(args.poll_timeout_ms),
        ..ServerConfig::default()
    };
    let scheduler =
        TaskScheduler::new(WireEchoFactory::new()).with_max_threads(config.max_connections);

    let mut server = match EventLoop::bind(config, scheduler) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            return ExitCode::FAILURE;
        },
    };

    match server.run() {
        Ok(()) => {
            tracing::info!("Server shut down");
            ExitCode::SUCCESS
        },
        Err(e) => {
            tracing::error!("Server stopped: {}", e);
            ExitCode::FAILURE
        },
    }
}
