//! Process shutdown: signal handling and the one-shot session close.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use crate::session::TelemetrySession;

/// Closes the registered telemetry session exactly once.
///
/// Runs explicitly after the server stops, and again (as a no-op) on drop.
#[derive(Default)]
pub struct ShutdownHook {
    session: Mutex<Option<Arc<dyn TelemetrySession>>>,
}

impl ShutdownHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: Arc<dyn TelemetrySession>) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    /// Close the session if one is registered. Returns whether it did.
    pub fn run(&self) -> bool {
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match session {
            Some(session) => {
                info!("closing telemetry session");
                session.close();
                true
            }
            None => false,
        }
    }
}

impl Drop for ShutdownHook {
    fn drop(&mut self) {
        self.run();
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}
