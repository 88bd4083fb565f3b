use std::future::{Future, pending};

use tracing::{info, warn};

/// Runs `fut` until it completes or the process receives SIGINT or SIGTERM, then calls
/// `on_shutdown`.
pub(crate) async fn run_until_shutdown<F, S>(fut: F, on_shutdown: S) -> eyre::Result<()>
where
    F: Future<Output = eyre::Result<()>>,
    S: FnOnce(),
{
    let res = tokio::select! {
        res = fut => res,
        signal = shutdown_signal() => {
            info!(signal, "Received shutdown signal");
            Ok(())
        }
    };

    on_shutdown();
    res
}

/// Resolves to the name of the first shutdown signal received.
async fn shutdown_signal() -> &'static str {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(%err, "Failed to listen for SIGINT");
            pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(%err, "Failed to listen for SIGTERM");
                pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = pending::<()>();

    tokio::select! {
        () = interrupt => "SIGINT",
        () = terminate => "SIGTERM",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[tokio::test]
    async fn returns_result_of_completed_future() {
        let called = AtomicBool::new(false);

        let res = run_until_shutdown(async { Err(eyre::eyre!("engine down")) }, || {
            called.store(true, Ordering::SeqCst);
        })
        .await;

        assert_eq!(res.unwrap_err().to_string(), "engine down");
        assert!(called.load(Ordering::SeqCst));
    }
}
