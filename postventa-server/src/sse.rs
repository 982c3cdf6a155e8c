//! Server-Sent Events stream and store file watcher.

use std::convert::Infallible;
use std::path::Path;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use notify::{Event as NotifyEvent, EventKind, PollWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::state::{AppState, ChangeEvent};

#[derive(Debug, PartialEq, Eq, Serialize)]
struct SsePayload {
    #[serde(rename = "type")]
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
}

impl SsePayload {
    fn new(event_type: &'static str) -> Self {
        Self {
            event_type,
            id: None,
            count: None,
        }
    }

    fn with_id(event_type: &'static str, id: impl Into<u64>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::new(event_type)
        }
    }
}

impl From<&ChangeEvent> for SsePayload {
    fn from(event: &ChangeEvent) -> Self {
        match *event {
            ChangeEvent::ClaimChanged { claim } => SsePayload::with_id("claim_changed", claim),
            ChangeEvent::AppointmentChanged { appointment } => {
                SsePayload::with_id("appointment_changed", appointment)
            }
            ChangeEvent::DebrisChanged { debris } => SsePayload::with_id("debris_changed", debris),
            ChangeEvent::NotificationsQueued { count } => SsePayload {
                count: Some(count),
                ..SsePayload::new("notifications_queued")
            },
            ChangeEvent::StoreReloaded => SsePayload::new("store_reloaded"),
        }
    }
}

/// GET /events - change notifications for connected clients.
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.event_tx.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data("{}"));

        loop {
            match rx.recv().await {
                Ok(change_event) => {
                    let payload = SsePayload::from(&change_event);
                    if let Ok(json) = serde_json::to_string(&payload) {
                        yield Ok(Event::default().event("change").data(json));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "SSE client lagged, some events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

/// Watch the state directory so edits made by the CLI reach the server.
pub fn start_store_watcher(state: AppState) {
    tokio::spawn(async move {
        if let Err(e) = run_store_watcher(state).await {
            warn!(error = %e, "store watcher failed");
        }
    });
}

async fn run_store_watcher(state: AppState) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel::<NotifyEvent>(100);

    let mut watcher = PollWatcher::new(
        move |res: Result<NotifyEvent, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.try_send(event);
            }
        },
        notify::Config::default().with_poll_interval(Duration::from_millis(500)),
    )?;

    let state_dir = state.paths.state_dir.clone();
    watcher.watch(&state_dir, RecursiveMode::NonRecursive)?;
    info!(path = %state_dir.display(), "watching state directory");

    let mut pending_events: Vec<NotifyEvent> = Vec::new();
    let mut flush_tick = tokio::time::interval(Duration::from_millis(250));
    flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                pending_events.push(event);
            }
            _ = flush_tick.tick() => {
                if pending_events.is_empty() {
                    continue;
                }
                if touches_store(&state.paths.store_path, &pending_events) {
                    reload_store(&state).await;
                }
                pending_events.clear();
            }
        }
    }
}

/// Whether any create/modify event in the batch hit the store file.
fn touches_store(store_path: &Path, events: &[NotifyEvent]) -> bool {
    events.iter().any(|event| {
        matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
            && event.paths.iter().any(|path| path == store_path)
    })
}

/// `AppState::reload` broadcasts `StoreReloaded` itself when the data changed.
async fn reload_store(state: &AppState) {
    match state.reload().await {
        Ok(changed) => debug!(changed, "store file event handled"),
        Err(e) => warn!(error = %format!("{e:#}"), "store file changed but could not be loaded"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use postventa::core::types::ClaimId;
    use postventa::io::store_file::write_store;
    use postventa::test_support::sample_store;

    use crate::routes::testing;

    fn event(kind: EventKind, path: std::path::PathBuf) -> NotifyEvent {
        NotifyEvent {
            kind,
            paths: vec![path],
            attrs: Default::default(),
        }
    }

    #[test]
    fn only_store_writes_count() {
        let store_path = Path::new("/p/.postventa/state/store.json");
        let modify = || EventKind::Modify(notify::event::ModifyKind::Any);
        assert!(touches_store(
            store_path,
            &[event(modify(), store_path.to_path_buf())]
        ));
        assert!(!touches_store(
            store_path,
            &[event(modify(), store_path.with_file_name("store.json.tmp"))]
        ));
        assert!(!touches_store(
            store_path,
            &[event(
                EventKind::Remove(notify::event::RemoveKind::Any),
                store_path.to_path_buf()
            )]
        ));
    }

    #[test]
    fn payload_carries_type_and_id() {
        let json = serde_json::to_value(SsePayload::from(&ChangeEvent::ClaimChanged {
            claim: ClaimId(7),
        }))
        .expect("json");
        assert_eq!(json, serde_json::json!({"type": "claim_changed", "id": 7}));

        let json = serde_json::to_value(SsePayload::from(&ChangeEvent::StoreReloaded))
            .expect("json");
        assert_eq!(json, serde_json::json!({"type": "store_reloaded"}));
    }

    #[tokio::test]
    async fn outside_write_is_reloaded_and_broadcast() {
        let (_temp, state) = testing::state();
        let mut rx = state.event_tx.subscribe();

        reload_store(&state).await;
        assert!(rx.try_recv().is_err(), "unchanged file is not news");

        let mut edited = sample_store();
        edited.technicians[0].active = false;
        write_store(&state.paths.store_path, &edited).expect("edit");
        reload_store(&state).await;
        assert_eq!(rx.try_recv().ok(), Some(ChangeEvent::StoreReloaded));
        assert!(rx.try_recv().is_err(), "one event per reload");
        assert!(!state.read().await.technicians[0].active);
    }
}
