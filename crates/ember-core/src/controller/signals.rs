//! OS signal subscription performed once during controller start.
//!
//! ## Unix
//! SIGINT, SIGTERM and SIGQUIT are forwarded into the shutdown-trigger
//! channel. The shutdown guard makes any signal after the first a no-op,
//! so the listener simply keeps forwarding until the receiver is gone.
//!
//! ## Windows
//! Only Ctrl-C is observed.

use tokio::sync::mpsc;

use ember_model::{ShutdownReason, Sig};

#[cfg(unix)]
pub(crate) fn subscribe(tx: mpsc::Sender<ShutdownReason>) -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::spawn(async move {
        loop {
            let sig = tokio::select! {
                _ = sigint.recv() => Sig::Int,
                _ = sigterm.recv() => Sig::Term,
                _ = sigquit.recv() => Sig::Quit,
            };
            if tx.send(ShutdownReason::Signal(sig)).await.is_err() {
                break;
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn subscribe(tx: mpsc::Sender<ShutdownReason>) -> std::io::Result<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(ShutdownReason::Signal(Sig::Int)).await.is_err() {
                break;
            }
        }
    });
    Ok(())
}
