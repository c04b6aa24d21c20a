//! HTTP API for the shared tally store
//!
//! - `GET /tally`: the record, 404 until a client initializes it
//! - `PUT /tally`: overwrite the record (409 if a counter would go down)
//! - `GET /tally/watch/ws`, `GET /tally/watch/sse`: current record, then
//!   every change
//! - `GET /health`

use crate::backend::SharedBackend;
use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::{Error, Tally, TallyEvent};
use async_stream::stream;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct PollState {
    pub store: Arc<SharedBackend>,
    /// Refuse writes that would decrement a counter
    pub reject_regressions: bool,
}

fn error_response(e: Error) -> Response {
    (e.to_http_status(), Json(json!({ "error": e.to_string() }))).into_response()
}

/// Creates the HTTP router with all public endpoints.
pub fn create_router(state: PollState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/tally", get(get_tally).put(put_tally))
        .route("/tally/watch/ws", get(watch_ws))
        .route("/tally/watch/sse", get(watch_sse))
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(axum::middleware::from_fn(request_tracing_middleware))
        .with_state(state)
}

async fn get_tally(State(state): State<PollState>) -> Response {
    match state.store.current() {
        Ok(Some(tally)) => Json(tally).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "tally not initialized" })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn put_tally(State(state): State<PollState>, Json(tally): Json<Tally>) -> Response {
    let result = if state.reject_regressions {
        state.store.put_monotonic(tally)
    } else {
        state.store.put(tally)
    };

    match result {
        Ok(()) => Json(json!({ "status": "ok", "tally": tally })).into_response(),
        Err(e) => {
            warn!(tally = %tally, error = %e, "tally write refused");
            error_response(e)
        }
    }
}

async fn health(State(state): State<PollState>) -> Response {
    match state.store.current() {
        Ok(current) => Json(json!({
            "status": "ok",
            "initialized": current.is_some(),
            "watchers": state.store.watcher_count(),
            "version": crate::VERSION,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// SSE endpoint for tally change notifications
async fn watch_sse(
    State(state): State<PollState>,
) -> Sse<impl futures_util::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.store.watch();
    let snapshot = state.store.current().ok().flatten();
    let stream = stream! {
        if let Some(tally) = snapshot {
            if let Ok(data) = serde_json::to_string(&TallyEvent::now(tally)) {
                yield Ok(Event::default().data(data));
            }
        }
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Ok(data) = serde_json::to_string(&event) {
                        yield Ok(Event::default().data(data));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "sse watcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// WebSocket endpoint for tally change notifications
async fn watch_ws(ws: WebSocketUpgrade, State(state): State<PollState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state.store))
}

async fn handle_ws(socket: WebSocket, store: Arc<SharedBackend>) {
    // Subscribe before taking the snapshot so no change slips between them.
    let mut rx = store.watch();
    let (mut sender, mut receiver) = socket.split();

    if let Ok(Some(tally)) = store.current() {
        if send_event(&mut sender, &TallyEvent::now(tally)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket watcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(error = %e, "websocket watcher dropped");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn send_event<S>(sender: &mut S, event: &TallyEvent) -> Result<(), ()>
where
    S: futures_util::Sink<Message> + Unpin,
{
    let text = serde_json::to_string(event).map_err(|_| ())?;
    sender.send(Message::Text(text)).await.map_err(|_| ())
}
