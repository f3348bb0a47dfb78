use crate::services::manager::{ServiceExit, ServiceManager};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

/// Run until a termination signal arrives or a service exits, then shut
/// everything down within `shutdown_timeout`.
pub async fn handle_shutdown_signals(
    mut service_manager: ServiceManager,
    shutdown_timeout: Duration,
) -> ExitCode {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = ?e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = ?e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    let mut exit_code = tokio::select! {
        (name, exit) = service_manager.next_exit() => {
            match exit {
                ServiceExit::Completed => {
                    warn!(service = name, "Service exited unexpectedly, shutting down");
                    ExitCode::SUCCESS
                }
                ServiceExit::Failed(_) | ServiceExit::Crashed(_) => ExitCode::FAILURE,
            }
        }
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
            ExitCode::SUCCESS
        }
        _ = sigterm => {
            info!("Received SIGTERM, shutting down");
            ExitCode::SUCCESS
        }
    };

    if let Err(stuck) = service_manager.shutdown(shutdown_timeout).await {
        warn!(
            services = ?stuck,
            "Graceful shutdown timed out, services were aborted"
        );
        exit_code = ExitCode::FAILURE;
    }

    exit_code
}
