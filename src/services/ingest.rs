//! Stream ingest — the background task that keeps the board in sync with
//! the canvas server's realtime feed.
//!
//! DESIGN
//! ======
//! One task per tracked canvas loops forever:
//! `Disconnected → Connecting → Connected → Disconnected → …`, sleeping a
//! fixed backoff before every reconnect. There is no retry limit. Decoded
//! messages pass through an [`IngestGate`] which applies them to the board
//! in arrival order, or queues them while a caller holds the gate paused.
//!
//! The transport sits behind [`FeedConnector`] so tests can script feed
//! sessions without a network.
//!
//! ERROR HANDLING
//! ==============
//! Decode failures and rejected events are logged and skipped. Connection
//! failures end the session; board state survives the reconnect, only the
//! online count is cleared until the next `users` message. While paused the
//! queue is bounded: on overflow the oldest message is dropped with a warning.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use feed::FeedMessage;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{COOKIE, HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::board::{BoardGrid, BoardState};
use crate::error::{ErrorCode, ErrorKind};

const CFAUTH_HEADER: &str = "x-pxls-cfauth";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid feed request: {0}")]
    InvalidRequest(String),
    #[error("feed connection failed: {0}")]
    Connect(Box<tungstenite::Error>),
    #[error("feed connection closed")]
    Closed,
}

impl ErrorCode for IngestError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "E_FEED_INVALID_REQUEST",
            Self::Connect(_) => "E_FEED_CONNECT",
            Self::Closed => "E_FEED_CLOSED",
        }
    }

    fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::Input,
            Self::Connect(_) | Self::Closed => ErrorKind::Transient,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Raw feed payloads of one connection; the stream ends or yields an error
/// when the connection drops.
pub type FeedStream = BoxStream<'static, Result<Vec<u8>, IngestError>>;

/// Opens one feed session.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    async fn connect(&self) -> Result<FeedStream, IngestError>;
}

// =============================================================================
// WEBSOCKET CONNECTOR
// =============================================================================

/// Websocket transport for the canvas server feed.
#[derive(Debug, Clone)]
pub struct WsFeedConnector {
    url: String,
    cfauth: Option<String>,
}

impl WsFeedConnector {
    #[must_use]
    pub fn new(url: impl Into<String>, cfauth: Option<String>) -> Self {
        Self { url: url.into(), cfauth }
    }
}

#[async_trait]
impl FeedConnector for WsFeedConnector {
    async fn connect(&self) -> Result<FeedStream, IngestError> {
        let invalid = |e: &dyn std::fmt::Display| IngestError::InvalidRequest(e.to_string());

        let mut request = self.url.as_str().into_client_request().map_err(|e| invalid(&e))?;
        let cookie = format!("pxls-validate={}", Uuid::new_v4());
        let headers = request.headers_mut();
        headers.insert(COOKIE, HeaderValue::from_str(&cookie).map_err(|e| invalid(&e))?);
        if let Some(token) = &self.cfauth {
            headers.insert(
                HeaderName::from_static(CFAUTH_HEADER),
                HeaderValue::from_str(token).map_err(|e| invalid(&e))?,
            );
        }

        let (socket, _response) = connect_async(request)
            .await
            .map_err(|error| IngestError::Connect(Box::new(error)))?;

        let stream = socket.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(text.as_bytes().to_vec())),
                Ok(Message::Binary(bytes)) => Some(Ok(bytes.to_vec())),
                Ok(Message::Close(_)) => Some(Err(IngestError::Closed)),
                Ok(_) => None,
                Err(error) => Some(Err(IngestError::Connect(Box::new(error)))),
            }
        });
        Ok(stream.boxed())
    }
}

// =============================================================================
// GATE
// =============================================================================

/// Applies feed messages to the board, or buffers them while paused.
#[derive(Debug)]
pub struct IngestGate {
    board: Arc<BoardState>,
    capacity: usize,
    inner: Mutex<GateInner>,
}

#[derive(Debug, Default)]
struct GateInner {
    /// Outstanding `pause()` calls.
    pause_depth: usize,
    queue: VecDeque<FeedMessage>,
    dropped: u64,
}

impl IngestGate {
    #[must_use]
    pub fn new(board: Arc<BoardState>, capacity: usize) -> Self {
        Self { board, capacity: capacity.max(1), inner: Mutex::new(GateInner::default()) }
    }

    #[must_use]
    pub fn board(&self) -> &Arc<BoardState> {
        &self.board
    }

    /// Apply `message` now, or queue it if the gate is paused.
    pub fn dispatch(&self, message: FeedMessage) {
        if message == FeedMessage::Unknown {
            return;
        }
        let mut inner = self.lock();
        if inner.pause_depth == 0 {
            self.apply(message);
            return;
        }

        if inner.queue.len() >= self.capacity {
            inner.queue.pop_front();
            inner.dropped += 1;
            warn!(capacity = self.capacity, dropped = inner.dropped, "pause queue full; dropping oldest feed message");
        }
        inner.queue.push_back(message);
    }

    /// Stop applying messages until a matching [`IngestGate::resume`].
    pub fn pause(&self) {
        let mut inner = self.lock();
        inner.pause_depth += 1;
        debug!(depth = inner.pause_depth, "feed ingest paused");
    }

    /// Release one pause. When the last pause is released, queued messages
    /// are applied in arrival order; returns how many were replayed.
    pub fn resume(&self) -> usize {
        let mut inner = self.lock();
        if inner.pause_depth == 0 {
            return 0;
        }
        inner.pause_depth -= 1;
        if inner.pause_depth > 0 {
            return 0;
        }

        let queued: Vec<FeedMessage> = inner.queue.drain(..).collect();
        let replayed = queued.len();
        for message in queued {
            self.apply(message);
        }
        if replayed > 0 {
            info!(replayed, "feed ingest resumed; replayed queued messages");
        }
        replayed
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.lock().pause_depth > 0
    }

    /// Messages dropped because the pause queue overflowed.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    /// Swap in a new canvas generation. Queued messages belong to the old
    /// grid and are discarded; returns how many.
    pub fn reset_board(&self, grid: BoardGrid) -> usize {
        let mut inner = self.lock();
        let discarded = inner.queue.len();
        inner.queue.clear();
        self.board.replace(grid);
        if discarded > 0 {
            warn!(discarded, "canvas reset; discarded queued feed messages");
        }
        discarded
    }

    /// Pause until the returned guard is dropped.
    #[must_use]
    pub fn paused(&self) -> PauseGuard<'_> {
        self.pause();
        PauseGuard { gate: self }
    }

    // Callers hold the gate lock so a resume cannot interleave with live messages.
    fn apply(&self, message: FeedMessage) {
        match message {
            FeedMessage::Pixel { pixels } => {
                for error in self.board.apply_batch(&pixels) {
                    warn!(code = error.error_code(), error = %error, "rejected feed pixel");
                }
            }
            FeedMessage::Users { count } => self.board.set_online_count(count),
            FeedMessage::Unknown => {}
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resumes the gate on drop.
#[derive(Debug)]
pub struct PauseGuard<'a> {
    gate: &'a IngestGate,
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.gate.resume();
    }
}

// =============================================================================
// TASK
// =============================================================================

/// Handle to a running ingest task.
#[derive(Debug, Clone)]
pub struct IngestHandle {
    gate: Arc<IngestGate>,
    state: watch::Receiver<ConnectionState>,
}

impl IngestHandle {
    #[must_use]
    pub fn gate(&self) -> &Arc<IngestGate> {
        &self.gate
    }

    pub fn pause(&self) {
        self.gate.pause();
    }

    pub fn resume(&self) -> usize {
        self.gate.resume()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

/// Spawn the ingest loop. It runs for the lifetime of the runtime.
pub fn spawn_ingest(connector: Arc<dyn FeedConnector>, gate: Arc<IngestGate>, backoff: Duration) -> (IngestHandle, JoinHandle<()>) {
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
    let handle = IngestHandle { gate: Arc::clone(&gate), state: state_rx };

    info!(?backoff, capacity = gate.capacity, "feed ingest configured");
    let task = tokio::spawn(async move {
        loop {
            state_tx.send_replace(ConnectionState::Connecting);
            match connector.connect().await {
                Ok(stream) => {
                    state_tx.send_replace(ConnectionState::Connected);
                    info!("feed connected");
                    let reason = run_session(stream, &gate).await;
                    warn!(error = %reason, "feed disconnected");
                }
                Err(error) => warn!(error = %error, "feed connect failed"),
            }

            gate.board().clear_online_count();
            state_tx.send_replace(ConnectionState::Disconnected);
            tokio::time::sleep(backoff).await;
        }
    });

    (handle, task)
}

async fn run_session(mut stream: FeedStream, gate: &IngestGate) -> IngestError {
    while let Some(item) = stream.next().await {
        let bytes = match item {
            Ok(bytes) => bytes,
            Err(error) => return error,
        };
        match feed::decode_message(&bytes) {
            Ok(message) => gate.dispatch(message),
            Err(error) => warn!(error = %error, "skipping undecodable feed message"),
        }
    }
    IngestError::Closed
}

#[cfg(test)]
#[path = "ingest_test.rs"]
mod tests;
