//! Parley gateway entry point.
//!
//! Binary name: `parley`
//!
//! Parses CLI arguments, loads configuration, then starts the HTTP gateway
//! with its background idle-session sweeper.

mod cli;
mod http;
mod state;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use clap_complete::generate;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use state::{AppState, ConcreteRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,parley=debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(shell, &mut cmd, "parley", &mut std::io::stdout());
            Ok(())
        }
        Commands::Serve { host, port } => serve(host, port).await,
    }
}

/// Run the HTTP gateway until Ctrl+C/SIGTERM, then drain the registry.
async fn serve(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let state = AppState::init().await?;

    let host = host.unwrap_or_else(|| state.config.server.host.clone());
    let port = port.unwrap_or(state.config.server.port);

    // Background sweeper: evicts sessions idle past the configured timeout.
    let max_idle = Duration::from_secs(state.config.session.idle_timeout_secs);
    let sweep_every = Duration::from_secs(state.config.session.sweep_interval_secs.max(1));
    let sweeper_token = CancellationToken::new();
    let sweeper = tokio::spawn(run_sweeper(
        Arc::clone(&state.registry),
        max_idle,
        sweep_every,
        sweeper_token.clone(),
    ));

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!(
        "  {} Parley gateway listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    println!(
        "  {} agent command: {}",
        console::style("↪").dim(),
        console::style(&state.config.agent.command).dim()
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let registry = Arc::clone(&state.registry);
    let router = http::router::build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the sweeper, then close every remaining agent handle.
    sweeper_token.cancel();
    let _ = sweeper.await;
    registry.shutdown().await;

    println!("\n  Server stopped.");
    Ok(())
}

/// Periodic idle-session eviction until cancelled.
async fn run_sweeper(
    registry: Arc<ConcreteRegistry>,
    max_idle: Duration,
    sweep_every: Duration,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval(sweep_every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = interval.tick() => {
                let evicted = registry.evict_idle(max_idle).await;
                if evicted > 0 {
                    tracing::info!(evicted, "idle session sweep complete");
                }
            }
        }
    }
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
