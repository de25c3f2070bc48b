//! `POST /api/v1/workflows/run`: execute a workflow and stream its events.
//!
//! The response is always HTTP 200; request and run failures arrive as
//! events in the body.

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::stream;
use tokio::sync::mpsc;
use tracing::{debug, info};

use engine::sse::encode_event;

use crate::AppState;

const EVENT_BUFFER: usize = 32;

pub async fn run(State(state): State<AppState>, body: Bytes) -> Response {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let executor = state.executor.clone();
    tokio::spawn(async move {
        executor.handle(&body, tx).await;
        debug!("run task finished");
    });
    info!("streaming workflow run");

    // Dropping the body (client gone) drops `rx`, which ends the run task.
    let events = stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Ok::<_, Infallible>(encode_event(&event)), rx))
    });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(events),
    )
        .into_response()
}
