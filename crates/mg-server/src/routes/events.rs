//! Server-Sent Events (SSE) handler for lifecycle events.
//!
//! Subscribes to the [`mg_core::events::EventBus`], optionally filters by job,
//! replays recent events for late joiners, and sends keepalive heartbeats.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use mg_core::events::Event as BusEvent;
use serde::Deserialize;

use crate::context::AppContext;

/// Number of past events replayed to a new subscriber.
const REPLAY: usize = 50;

/// Optional query parameter for job filtering.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventsQuery {
    /// Only forward events about this job.
    pub job_id: Option<String>,
}

/// GET /api/events -- SSE stream of job lifecycle events.
#[utoipa::path(
    get,
    path = "/api/events",
    params(EventsQuery),
    responses(
        (status = 200, description = "SSE stream of lifecycle events")
    )
)]
pub async fn events_handler(
    State(ctx): State<AppContext>,
    Query(params): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let job_filter = params.job_id;

    // Subscribe before reading the backlog so nothing falls in between.
    let mut rx = ctx.event_bus.subscribe();
    let recent = ctx.event_bus.recent_events(REPLAY);

    let stream = async_stream::stream! {
        let mut replayed = std::collections::HashSet::new();
        for event in recent.into_iter().rev() {
            replayed.insert(event.id);
            if matches_job(&event, &job_filter) {
                if let Ok(data) = serde_json::to_string(&event) {
                    yield Ok(Event::default().data(data));
                }
            }
        }

        let mut heartbeat = tokio::time::interval(Duration::from_secs(15));

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            if replayed.remove(&event.id) {
                                continue;
                            }
                            if matches_job(&event, &job_filter) {
                                if let Ok(data) = serde_json::to_string(&event) {
                                    yield Ok(Event::default().data(data));
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::debug!("SSE client lagged by {n} events");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    yield Ok(Event::default()
                        .event("heartbeat")
                        .data(r#"{"type":"heartbeat"}"#));
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

fn matches_job(event: &BusEvent, filter: &Option<String>) -> bool {
    match filter {
        None => true,
        Some(id) => event.payload.job_id().to_string() == *id,
    }
}
