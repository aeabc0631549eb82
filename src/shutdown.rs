//! Graceful shutdown coordinator.
//!
//! Listens for SIGINT (Ctrl+C), SIGTERM, and SIGHUP, then cancels a
//! [`tokio_util::sync::CancellationToken`]. The sync pipeline checks the
//! token between files, so the file in flight finishes and its ledger
//! writes land before the process exits. A second signal force-exits.

use std::sync::atomic::{AtomicU32, Ordering};

use tokio_util::sync::CancellationToken;

/// Wait for the next shutdown signal.
#[cfg(unix)]
async fn next_signal(
    sigterm: &mut Option<tokio::signal::unix::Signal>,
    sighup: &mut Option<tokio::signal::unix::Signal>,
) {
    async fn recv(signal: &mut Option<tokio::signal::unix::Signal>) {
        match signal {
            Some(s) => {
                s.recv().await;
            }
            None => std::future::pending().await,
        }
    }
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = recv(sigterm) => {}
        _ = recv(sighup) => {}
    }
}

#[cfg(not(unix))]
async fn next_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalResponse {
    /// Let the file in flight finish, then stop.
    Drain,
    ForceExit,
}

/// Count a received signal: the first cancels `token`, any later one forces exit.
fn respond(received: &AtomicU32, token: &CancellationToken) -> SignalResponse {
    if received.fetch_add(1, Ordering::SeqCst) == 0 {
        token.cancel();
        SignalResponse::Drain
    } else {
        SignalResponse::ForceExit
    }
}

/// Install signal handlers and return a [`CancellationToken`] that is
/// cancelled on the first SIGINT / SIGTERM / SIGHUP.
pub(crate) fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let received = AtomicU32::new(0);

    let handler_token = token.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        let (mut sigterm, mut sighup) = {
            use tokio::signal::unix::{signal, SignalKind};
            let register = |kind: SignalKind, name: &str| match signal(kind) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!("Cannot register {} handler: {}", name, e);
                    None
                }
            };
            (
                register(SignalKind::terminate(), "SIGTERM"),
                register(SignalKind::hangup(), "SIGHUP"),
            )
        };

        loop {
            #[cfg(unix)]
            next_signal(&mut sigterm, &mut sighup).await;
            #[cfg(not(unix))]
            next_signal().await;

            match respond(&received, &handler_token) {
                SignalResponse::Drain => {
                    tracing::info!("Received shutdown signal, finishing the current file...");
                    tracing::info!("Press Ctrl+C again to force exit");
                }
                SignalResponse::ForceExit => {
                    tracing::warn!("Force exit requested");
                    std::process::exit(130);
                }
            }
        }
    });

    token
}
