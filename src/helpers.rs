use std::{future::Future, pin::Pin};

use axum::{http::StatusCode, response::IntoResponse, Json};
use futures::future;
use serde_json::json;
use tokio::signal;
use tracing::info;

pub async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({"error": "not found"})))
}

/// Resolves when the process receives ctrl+c or SIGTERM.
pub async fn do_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl+c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("starting graceful shutdown...");
}

/// Collects async teardown hooks to run once, at shutdown.
pub struct Closer {
    closers: Vec<Pin<Box<dyn Future<Output = ()> + Send + 'static>>>,
}

impl Closer {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            closers: Vec::new(),
        }
    }

    pub fn add<F>(&mut self, f: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.closers.push(Box::pin(f));
    }

    pub async fn close(self) {
        future::join_all(self.closers).await;
    }
}
