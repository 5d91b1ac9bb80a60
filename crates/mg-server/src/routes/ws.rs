//! WebSocket transport for the observation channel.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::StreamExt;

use crate::channel::observe;
use crate::context::AppContext;

/// GET /ws/{task_id} -- push job snapshots as JSON text frames until the job
/// is terminal, then close.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(ctx): State<AppContext>,
    Path(task_id): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| push_snapshots(socket, ctx, task_id))
}

async fn push_snapshots(mut socket: WebSocket, ctx: AppContext, task_id: String) {
    let updates = observe(
        ctx.registry.clone(),
        task_id.clone(),
        ctx.config.workers.progress_interval(),
    );
    futures::pin_mut!(updates);

    while let Some(message) = updates.next().await {
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(task_id = %task_id, "Failed to encode snapshot: {e}");
                break;
            }
        };
        if socket.send(Message::Text(text.into())).await.is_err() {
            tracing::debug!(task_id = %task_id, "Observer went away");
            return;
        }
    }

    let _ = socket.send(Message::Close(None)).await;
}
