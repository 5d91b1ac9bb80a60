//! Progress observation channel.
//!
//! [`observe`] turns a job id into a finite stream of snapshots, sampled at a
//! fixed interval from the job cell. The stream is transport-agnostic; the
//! WebSocket and SSE handlers only serialize what it yields. Dropping the
//! stream has no effect on the job.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use mg_core::JobSnapshot;
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;

use crate::registry::JobRegistry;

pub const JOB_NOT_FOUND: &str = "job not found";

/// Lower bound on the sampling interval.
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// One message pushed to an observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelMessage {
    Snapshot(JobSnapshot),
    Error { error: String },
}

impl ChannelMessage {
    /// Whether the stream ends after this message.
    pub fn is_final(&self) -> bool {
        match self {
            ChannelMessage::Snapshot(snap) => snap.is_terminal(),
            ChannelMessage::Error { .. } => true,
        }
    }
}

/// Stream snapshots of `task_id` every `interval` until it is terminal.
///
/// The first snapshot is yielded immediately and the terminal snapshot is
/// always the last item. An unknown id yields exactly one
/// [`ChannelMessage::Error`].
pub fn observe(
    registry: Arc<JobRegistry>,
    task_id: String,
    interval: Duration,
) -> impl Stream<Item = ChannelMessage> + Send + 'static {
    async_stream::stream! {
        match registry.cell(&task_id) {
            None => {
                tracing::debug!(task_id = %task_id, "Observer asked for unknown job");
                yield ChannelMessage::Error { error: JOB_NOT_FOUND.to_string() };
            }
            Some(cell) => {
                let mut ticker = tokio::time::interval(interval.max(MIN_INTERVAL));
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let snapshot = cell.snapshot();
                    let done = snapshot.is_terminal();
                    yield ChannelMessage::Snapshot(snapshot);
                    if done {
                        break;
                    }
                }
            }
        }
    }
}
