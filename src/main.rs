//! cgi-proxy
//!
//! Bridges a CGI invocation (or, in `serve` mode, a TCP listener) to an HTTP
//! and WebSocket backend reachable only through a Unix domain socket.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────┐
//!                    │                   cgi-proxy                      │
//!   web server       │  ┌──────────┐   ┌────────────┐   ┌───────────┐  │
//!   (CGI env+stdin) ─┼─▶│   cgi    │──▶│   http     │──▶│  rewrite  │  │
//!   or TCP client    │  │ adapter  │   │  router    │   └─────┬─────┘  │
//!                    │  └──────────┘   └────────────┘         │        │
//!                    │                        ┌───────────────┴─────┐  │
//!                    │                        ▼                     ▼  │
//!                    │                 ┌────────────┐      ┌──────────┐│      backend
//!                    │                 │  forward   │      │websocket ││ ───▶ (unix
//!                    │                 │  (HTTP/1)  │      │ + relay  ││      socket)
//!                    │                 └────────────┘      └──────────┘│
//!                    └──────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use cgi_proxy::backend::BackendTarget;
use cgi_proxy::config::{load_config, BridgeConfig};
use cgi_proxy::http::{build_router, HttpServer};
use cgi_proxy::lifecycle::{signals, Shutdown};
use cgi_proxy::{cgi, observability};

#[derive(Parser)]
#[command(name = "cgi-proxy")]
#[command(about = "Bridge CGI invocations to a Unix-socket HTTP/WebSocket backend", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Dotenv file loaded into the environment (default: ./.env if present).
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle one CGI invocation from the environment and stdin (default)
    Cgi,
    /// Run a standalone HTTP server in front of the backend
    Serve {
        /// Listen address, overriding listener.bind_address
        #[arg(short, long)]
        listen: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref(), cli.env_file.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            observability::logging::init(&BridgeConfig::default().logging);
            tracing::error!(error = %e, "Failed to load configuration");
            if matches!(cli.command, None | Some(Commands::Cgi)) {
                let _ = write_cgi_failure().await;
            }
            return ExitCode::FAILURE;
        }
    };

    observability::logging::init(&config.logging);

    let target = match BackendTarget::from_config(&config.backend) {
        Ok(target) => target,
        Err(e) => {
            tracing::error!(error = %e, "Failed to resolve base path");
            if matches!(cli.command, None | Some(Commands::Cgi)) {
                let _ = write_cgi_failure().await;
            }
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        None | Some(Commands::Cgi) => run_cgi(target).await,
        Some(Commands::Serve { listen }) => {
            let address = listen.unwrap_or(config.listener.bind_address);
            run_server(target, &address).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "cgi-proxy failed");
            ExitCode::FAILURE
        }
    }
}

async fn run_cgi(target: BackendTarget) -> Result<(), Box<dyn std::error::Error>> {
    let vars: HashMap<String, String> = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect();
    let app = build_router(Arc::new(target));
    let mut stdout = tokio::io::stdout();

    cgi::serve(app, &vars, tokio::io::stdin(), &mut stdout).await?;
    Ok(())
}

async fn run_server(target: BackendTarget, address: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    let server_shutdown = shutdown.subscribe();
    signals::forward_signals(shutdown.clone());

    HttpServer::new(target).run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// The web server still expects a CGI document when startup fails.
async fn write_cgi_failure() -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(b"Status: 500 Internal Server Error\r\n\r\n")
        .await?;
    stdout.flush().await
}
