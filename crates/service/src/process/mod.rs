mod utils;

use std::time::Duration;

use common::pool::run_refresh_loop;
use futures::future::join_all;
use tokio::time::timeout;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::http;
use crate::{Config, ServiceState};

const FINAL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Initialize logging, panic handler, and build info reporting.
/// Returns guards that must be kept alive for the duration of the program.
fn init_logging(config: &Config) -> Vec<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::fmt::format::FmtSpan;

    let mut guards = Vec::new();

    // Stdout layer
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(stdout_guard);

    let stdout_env_filter = EnvFilter::builder()
        .with_default_directive(config.log_level.into())
        .from_env_lossy();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_filter(stdout_env_filter);

    // File layer (if log_dir is set)
    if let Some(log_dir) = &config.log_dir {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: Failed to create log directory {:?}: {}",
                log_dir, e
            );
        }

        let file_appender = tracing_appender::rolling::daily(log_dir, "shardgate.log");
        let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        guards.push(file_guard);

        let file_env_filter = EnvFilter::builder()
            .with_default_directive(config.log_level.into())
            .from_env_lossy();

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(file_env_filter);

        tracing_subscriber::registry()
            .with(stdout_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry().with(stdout_layer).init();
    }

    utils::register_panic_logger();
    utils::report_build_info();

    guards
}

/// Create service state from config, exiting on error.
async fn create_state(config: &Config) -> ServiceState {
    match ServiceState::from_config(config).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("error creating server state: {}", e);
            std::process::exit(3);
        }
    }
}

/// Wait for shutdown and join all handles with timeout.
async fn shutdown_and_join(
    graceful_waiter: tokio::task::JoinHandle<()>,
    handles: Vec<tokio::task::JoinHandle<()>>,
) {
    let _ = graceful_waiter.await;

    if timeout(FINAL_SHUTDOWN_TIMEOUT, join_all(handles))
        .await
        .is_err()
    {
        tracing::error!(
            "Failed to shut down within {} seconds",
            FINAL_SHUTDOWN_TIMEOUT.as_secs()
        );
        std::process::exit(4);
    }
}

/// Runs the gateway: discovers and connects the initial node set, then
/// serves the object API and refreshes membership until shutdown.
pub async fn spawn_service(config: &Config) {
    let _guards = init_logging(config);
    let state = create_state(config).await;
    let (graceful_waiter, shutdown_rx) =
        match utils::graceful_shutdown_blocker(state.draining().clone()) {
            Ok(blocker) => blocker,
            Err(e) => {
                tracing::error!("failed to install signal handlers: {}", e);
                std::process::exit(3);
            }
        };

    let mut handles = Vec::new();

    // Periodic membership refresh
    let refresh_pool = state.pool().clone();
    let refresh_rx = shutdown_rx.clone();
    handles.push(tokio::spawn(run_refresh_loop(refresh_pool, refresh_rx)));

    // Object API server
    let listen_addr = config.listen_addr;
    let mut http_config = http::Config::new(listen_addr, config.request_timeout);
    http_config.log_level = config.log_level;
    let api_state = state.clone();
    let api_rx = shutdown_rx.clone();
    let api_handle = tokio::spawn(async move {
        tracing::info!("Starting object API server on {}", listen_addr);
        if let Err(e) = http::run(http_config, api_state, api_rx).await {
            tracing::error!("Object API server error: {}", e);
        }
    });
    handles.push(api_handle);

    tracing::info!(
        nodes = state.pool().len(),
        bucket = %state.pool().bucket(),
        "Running: gateway on {}",
        listen_addr
    );

    shutdown_and_join(graceful_waiter, handles).await;
}
