pub mod config;
pub mod error;
pub mod helpers;
pub mod http;
pub mod media;
pub mod session;

use std::sync::{Arc, Mutex};

use axum::{extract::DefaultBodyLimit, routing, Extension, Router};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use http::AppState;
use session::SessionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,kompres=debug")),
        )
        .init();

    let config = Config::from_env()?;
    let store = SessionStore::new(config.scratch_dir.clone(), config.session_ttl).await?;
    let max_upload_bytes = config.max_upload_bytes;

    let state = Arc::new(AppState {
        config,
        store,
        progress: Mutex::new(Default::default()),
    });

    let mut closer = helpers::Closer::new();
    {
        // Final sweep so an orderly shutdown leaves no scratch behind.
        let store = state.store.clone();
        closer.add(async move {
            store.sweep().await;
        });
    }

    let app = Router::new()
        .route("/", routing::get(http::index))
        .route("/api/presets", routing::get(http::presets))
        .route("/api/upload", routing::post(http::upload))
        .route(
            "/api/session/:token",
            routing::get(http::resume_session).delete(http::release_session),
        )
        .route("/api/compress", routing::post(http::compress))
        .route("/api/progress/:token", routing::get(http::progress))
        .route("/api/download/:token", routing::get(http::download))
        .fallback(helpers::handler_404)
        .layer(Extension(Arc::clone(&state)))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&state.config.bind_addr).await?;
    info!(addr = %state.config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(helpers::do_shutdown())
        .await?;

    closer.close().await;

    Ok(())
}
