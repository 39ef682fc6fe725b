//! Live log push over Server-Sent Events.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::info;

use super::auth::AuthenticatedCaller;
use super::error::ApiError;
use super::AppState;
use crate::models::permission::PermissionTier;

/// Lines buffered per client before the slowest ones start dropping.
const CLIENT_BUFFER: usize = 256;

/// `GET /api/logs/stream`: a `connected` event, then one `log` event per
/// line, with a comment heartbeat while idle.
///
/// The hub subscription lives inside the response stream, so it is
/// released as soon as the client disconnects.
pub async fn stream_logs(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    caller.require(PermissionTier::Moderator)?;

    let (subscription, rx) = state.logs.subscribe_channel(CLIENT_BUFFER);
    info!(subject = %caller.subject, observer = subscription.id(), "log stream opened");

    let hello = serde_json::to_string(&caller).unwrap_or_else(|_| "{}".into());
    let connected = tokio_stream::once(Ok(Event::default().event("connected").data(hello)));

    let lines = ReceiverStream::new(rx).map(move |line| {
        let _held = &subscription;
        let data = serde_json::to_string(&line).unwrap_or_else(|_| "{}".into());
        Ok(Event::default().event("log").data(data))
    });

    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(state.config.logs.heartbeat_seconds.max(1)))
        .text("heartbeat");

    Ok(Sse::new(connected.chain(lines)).keep_alive(keep_alive))
}
