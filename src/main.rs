use std::sync::Arc;

use pxtracker::config::TrackerConfig;
use pxtracker::routes;
use pxtracker::services::board::{BoardGrid, BoardState};
use pxtracker::services::bootstrap::{BootstrapError, CanvasInfo, PxlsApi};
use pxtracker::services::ingest::{IngestGate, WsFeedConnector, spawn_ingest};
use pxtracker::services::refresh::spawn_refresh;
use pxtracker::services::template_source::HttpImageFetcher;
use pxtracker::state::{AppState, CanvasTracker};

async fn bootstrap(config: &TrackerConfig) -> Result<(PxlsApi, CanvasInfo, BoardGrid), BootstrapError> {
    let api = PxlsApi::new(&config.api_url, config.http_timeout)?;
    let info = api.fetch_info(config.cooldown).await?;
    let grid = api.hydrate(&info).await?;
    Ok((api, info, grid))
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = TrackerConfig::from_env().expect("invalid configuration");
    let port = config.port;
    let fetcher = Arc::new(HttpImageFetcher::new(config.http_timeout).expect("http client init failed"));

    // A canvas that fails to bootstrap leaves the archive endpoints serving.
    let tracker = match bootstrap(&config).await {
        Ok((api, info, grid)) => {
            let board = Arc::new(BoardState::new(grid));
            let gate = Arc::new(IngestGate::new(Arc::clone(&board), config.pause_queue_capacity));
            let connector = Arc::new(WsFeedConnector::new(config.feed_url.clone(), config.cfauth.clone()));
            let (ingest, _task) = spawn_ingest(connector, Arc::clone(&gate), config.reconnect_backoff);
            let tracker = CanvasTracker::new(info, board, ingest);
            let _refresh = spawn_refresh(
                Arc::new(api),
                Arc::clone(&tracker.canvas),
                gate,
                config.cooldown,
                config.canvas_refresh,
            );
            Some(tracker)
        }
        Err(e) => {
            tracing::error!(error = %e, api_url = %config.api_url, "canvas bootstrap failed; running untracked");
            None
        }
    };

    let app = routes::app(AppState::new(config, tracker, fetcher));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "pxtracker listening");
    axum::serve(listener, app).await.expect("server failed");
}
