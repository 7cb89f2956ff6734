//! Utility functions.

use tracing::{info, warn};

/// Resolve when the process receives Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

/// Shorten a long identifier such as a mint address for display.
///
/// `So11111111111111111111111111111111111111112` becomes `So11..1112`.
pub fn short_id(id: &str) -> String {
    const KEEP: usize = 4;
    if id.chars().count() <= KEEP * 2 + 2 {
        return id.to_string();
    }
    let head: String = id.chars().take(KEEP).collect();
    let tail: String = id
        .chars()
        .rev()
        .take(KEEP)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("{}..{}", head, tail)
}
