//! How the store reaches the executor: one POST per run, answered with an
//! event stream.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::{debug, warn};

use engine::RunRequest;

use crate::StoreError;

/// Raw response body, chunked however the network delivered it.
pub type ByteStream = BoxStream<'static, Result<Bytes, StoreError>>;

#[async_trait]
pub trait RunTransport: Send + Sync {
    /// Submit `request` and return the response body as it arrives.
    async fn open(&self, request: &RunRequest) -> Result<ByteStream, StoreError>;
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Posts run requests to a workflow server over HTTP.
pub struct HttpTransport {
    client: reqwest::Client,
    run_url: String,
    token: Option<String>,
}

impl HttpTransport {
    /// `base_url` is the server root, e.g. `http://localhost:3000`.
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            run_url: format!("{}/api/v1/workflows/run", base_url.trim_end_matches('/')),
            token,
        }
    }
}

#[async_trait]
impl RunTransport for HttpTransport {
    async fn open(&self, request: &RunRequest) -> Result<ByteStream, StoreError> {
        debug!(url = %self.run_url, workflow_id = %request.workflow_id, "opening run stream");

        let mut builder = self
            .client
            .post(&self.run_url)
            .header("Accept", "text/event-stream")
            .json(request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            warn!(%status, "run request rejected");
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| StoreError::Transport(e.to_string())))
            .boxed())
    }
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

enum Step {
    Chunk(Bytes),
    Fail(String),
}

/// Plays back a fixed chunk script and records every request it was given.
///
/// Chunks are delivered exactly as scripted, so a test can split an event
/// anywhere it likes.
#[derive(Default)]
pub struct ReplayTransport {
    script: Vec<Step>,
    opened: AtomicUsize,
    requests: Mutex<Vec<RunRequest>>,
}

impl ReplayTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk(mut self, bytes: impl Into<Bytes>) -> Self {
        self.script.push(Step::Chunk(bytes.into()));
        self
    }

    /// End the body with a transport failure.
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.script.push(Step::Fail(message.into()));
        self
    }

    /// How many times [`RunTransport::open`] was called.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RunRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RunTransport for ReplayTransport {
    async fn open(&self, request: &RunRequest) -> Result<ByteStream, StoreError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let items: Vec<Result<Bytes, StoreError>> = self
            .script
            .iter()
            .map(|step| match step {
                Step::Chunk(bytes) => Ok(bytes.clone()),
                Step::Fail(message) => Err(StoreError::Transport(message.clone())),
            })
            .collect();
        Ok(stream::iter(items).boxed())
    }
}
