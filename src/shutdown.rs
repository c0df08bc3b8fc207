//! Process shutdown signalling

use tokio::sync::watch;

/// Receiving side, cloned into every loop that must stop
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Sending side
#[derive(Clone)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown was triggered or every trigger was dropped
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                break;
            }
        }
    }
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// Trigger shutdown on SIGINT or SIGTERM
pub async fn listen_for_signals(trigger: ShutdownTrigger) {
    #[cfg(unix)]
    let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(signal) => signal,
        Err(err) => {
            tracing::warn!(error = %err, "failed to register SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            trigger.trigger();
            return;
        }
    };

    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = term.recv() => {},
    }

    #[cfg(not(unix))]
    let _ = ctrl_c.await;

    tracing::info!("shutdown signal received");
    trigger.trigger();
}
