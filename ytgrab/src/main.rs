mod config;
mod error;
mod fetcher;
mod handlers;
mod models;
mod state;
mod validation;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post}
};
use tower_http::{
    catch_panic::CatchPanicLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use fetcher::YtDlpFetcher;
use handlers::{api, pages};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ytgrab=info,yt_dlp=info,tower_http=debug".into())
        )
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    let yt_dlp = config.yt_dlp_client();
    match yt_dlp.check_binary().await {
        Ok(version) => tracing::info!("yt-dlp version: {}", version),
        Err(e) => tracing::warn!("yt-dlp not found or not executable: {}", e)
    }

    tokio::fs::create_dir_all(&config.download_dir)
        .await
        .with_context(|| format!("failed to create {}", config.download_dir.display()))?;
    tracing::info!("Saving downloads to {}", config.download_dir.display());

    let fetcher = YtDlpFetcher::new(yt_dlp, &config.download_format, config.max_file_size);
    let addr = config.bind_addr.clone();

    let state = AppState {
        fetcher: Arc::new(fetcher),
        config: Arc::new(config)
    };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let static_dir = state.config.static_dir.clone();

    Router::new()
        .route("/", get(pages::index_page))
        .route("/health", get(api::health))
        .route("/download", post(api::download))
        .route("/files/{filename}", get(api::serve_file))
        .nest_service("/static", ServeDir::new(static_dir))
        .fallback(api::not_found)
        .layer(CatchPanicLayer::custom(api::panic_response))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
