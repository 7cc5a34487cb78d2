use tokio::signal;

use crate::core::state::AppState;

async fn wait_for_signal() -> &'static str {
    let interrupt = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut stream) = signal::unix::signal(signal::unix::SignalKind::terminate())
            .inspect_err(|err| tracing::error!(error = %err, "Failed to listen for SIGTERM"))
        else {
            return std::future::pending::<()>().await;
        };
        stream.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}

/// Resolves on SIGINT or SIGTERM so in-flight requests can drain.
pub(crate) async fn shutdown_signal() {
    let signal_name = wait_for_signal().await;
    tracing::info!(signal = signal_name, "Shutdown requested, draining connections");
}

/// Drops every open upload wizard, which revokes its preview URLs.
pub(crate) async fn release_staged_uploads(state: &AppState) {
    let released = state.uploads().discard_all().await;
    if released > 0 {
        tracing::info!(wizards = released, "Discarded unfinished upload wizards");
    }
}
