//! Live production feed over SSE.
//!
//! The bridge never replays history, so each connection subscribes first,
//! then sends the backlog after `?after=N`, then forwards live updates while
//! skipping anything at or below the last sequence already sent.

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use super::super::AppState;
use super::{AfterQuery, ApiError};
use crate::core::notify::Notification;
use crate::core::orchestrator::Orchestrator;
use crate::core::production::{Message, Production};

fn production_event(p: &Production) -> Event {
    Event::default()
        .event("production")
        .data(serde_json::to_string(p).unwrap_or_default())
}

fn message_event(m: &Message) -> Event {
    Event::default()
        .event("message")
        .id(m.sequence.to_string())
        .data(serde_json::to_string(m).unwrap_or_default())
}

/// Sends messages above `last`, advancing it. False once the client is gone.
async fn forward(tx: &mpsc::Sender<Event>, messages: &[Message], last: &mut i64) -> bool {
    for m in messages {
        if m.sequence <= *last {
            continue;
        }
        if tx.send(message_event(m)).await.is_err() {
            return false;
        }
        *last = m.sequence;
    }
    true
}

async fn resync(
    orch: &Orchestrator,
    id: &str,
    tx: &mpsc::Sender<Event>,
    last: &mut i64,
) -> bool {
    let Ok(missed) = orch.messages(id, *last).await else {
        return false;
    };
    if !forward(tx, &missed, last).await {
        return false;
    }
    match orch.status(id).await {
        Ok(p) => tx.send(production_event(&p)).await.is_ok(),
        Err(_) => false,
    }
}

pub async fn stream_production(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<AfterQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let orch = state.orchestrator.clone();
    // Unknown ids fail before a bridge channel is opened for them.
    orch.status(&id).await?;
    let mut live = Box::pin(orch.subscribe(&id).await);
    let backlog = orch.messages(&id, query.after.max(0)).await?;
    let current = orch.status(&id).await?;

    let (tx, rx) = mpsc::channel::<Event>(64);
    tokio::spawn(async move {
        let mut last = query.after.max(0);
        if tx.send(production_event(&current)).await.is_err() {
            return;
        }
        if !forward(&tx, &backlog, &mut last).await {
            return;
        }
        loop {
            let next = tokio::select! {
                _ = tx.closed() => break,
                next = live.next() => next,
            };
            let alive = match next {
                Some(Notification::Update(update)) => {
                    forward(&tx, &update.messages, &mut last).await
                        && tx.send(production_event(&update.production)).await.is_ok()
                }
                Some(Notification::Lagged { skipped }) => {
                    warn!(production = %id, skipped, "Stream subscriber lagged; resyncing from the log");
                    resync(&orch, &id, &tx, &mut last).await
                }
                None => false,
            };
            if !alive {
                break;
            }
        }
        debug!(production = %id, "Stream closed");
    });

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::production::{Role, Stage};

    fn message(sequence: i64) -> Message {
        Message {
            id: format!("m{}", sequence),
            production_id: "p".to_string(),
            role: Role::Agent,
            stage: Stage::Analysis,
            content: format!("message {}", sequence),
            data: serde_json::Value::Null,
            kind: None,
            timestamp: chrono::Utc::now(),
            sequence,
        }
    }

    #[tokio::test]
    async fn forward_skips_what_was_already_sent() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut last = 2;
        let batch: Vec<Message> = [1, 2, 3, 4].into_iter().map(message).collect();

        assert!(forward(&tx, &batch, &mut last).await);
        assert_eq!(last, 4);
        drop(tx);
        let mut sent = 0;
        while rx.recv().await.is_some() {
            sent += 1;
        }
        assert_eq!(sent, 2);
    }

    #[tokio::test]
    async fn forward_stops_once_the_client_is_gone() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let mut last = 0;
        assert!(!forward(&tx, &[message(1)], &mut last).await);
        assert_eq!(last, 0);
    }
}
