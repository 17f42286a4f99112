//! WebSocket live feed
//!
//! Each session polls the store on its own timer and pushes a snapshot of
//! the trailing hour. It is an observer: ingestion never notifies it.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use chrono::{Duration, Utc};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::{stream_filter, ApiState, StreamQuery};
use crate::analytics;
use crate::types::LiveSnapshot;

/// Messages pushed to live clients.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveMessage {
    Connection {
        status: &'static str,
        message: &'static str,
    },
    StatsUpdate {
        data: LiveSnapshot,
    },
}

impl LiveMessage {
    fn connected() -> Self {
        Self::Connection {
            status: "connected",
            message: "WebSocket connection established",
        }
    }

    fn to_text(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(text) => Some(Message::Text(text)),
            Err(e) => {
                warn!(error = %e, "Failed to encode live message");
                None
            }
        }
    }
}

/// GET /ws/live - Upgrade to the live feed
pub async fn live_feed(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let stream = match stream_filter(query.stream.as_deref()) {
        Ok(s) => s.map(str::to_string),
        Err(resp) => return resp,
    };
    ws.on_upgrade(move |socket| live_session(socket, state, stream))
}

async fn live_session(socket: WebSocket, state: ApiState, stream: Option<String>) {
    let (mut sender, mut receiver) = socket.split();

    if let Some(msg) = LiveMessage::connected().to_text() {
        if sender.send(msg).await.is_err() {
            return;
        }
    }
    debug!(stream = ?stream, "Live session started");

    let window = Duration::seconds(state.live.window_secs);
    let mut ticker = tokio::time::interval(state.live.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = state.shutdown.cancelled() => break,
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "Live session receive error");
                    break;
                }
            },
            _ = ticker.tick() => {
                let snapshot = analytics::live_snapshot(
                    state.store.as_ref(),
                    stream.as_deref(),
                    Utc::now(),
                    window,
                )
                .await;
                let data = match snapshot {
                    Ok(Some(data)) => data,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(error = %e, "Live snapshot failed, skipping cycle");
                        continue;
                    }
                };
                let Some(msg) = (LiveMessage::StatsUpdate { data }).to_text() else {
                    continue;
                };
                if sender.send(msg).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = sender.close().await;
    debug!(stream = ?stream, "Live session ended");
}
