//! Per-room SSE plumbing. The event stream doubles as the liveness signal:
//! attaching marks the seat connected, and stream teardown starts the
//! disconnect grace handling.

use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::{
    dto::sse::ServerEvent,
    error::ServiceError,
    services::{reconnect_service, session_service::require_room, snapshot_service},
    state::SharedState,
};

/// Attach a subscriber to a session's event channel. When `participant_id`
/// names a seat it is marked connected, and an expired-hold cleanup runs.
/// The snapshot is re-broadcast after subscription so the new stream opens
/// with the current state.
pub async fn attach(
    state: &SharedState,
    code: &str,
    participant_id: Option<Uuid>,
) -> Result<broadcast::Receiver<ServerEvent>, ServiceError> {
    let room = require_room(state, code)?;
    let receiver = room.hub().subscribe();

    let mut session = room.session().lock().await;
    if let Some(id) = participant_id
        && let Some(seat) = session.participant_mut(id)
    {
        seat.connected = true;
        session.seat_holds.retain(|hold| hold.participant.id != id);
        if session.host().is_some_and(|host| host.id == id) {
            session.host_grace_deadline = None;
        }
    }
    snapshot_service::broadcast(&room, &session);

    Ok(receiver)
}

/// Ownership handle for stream teardown; dropping the response stream fires
/// the disconnect handling for the attached seat.
#[derive(Clone)]
pub struct StreamTicket {
    /// Shared application state; cloning only bumps the inner `Arc`.
    pub state: SharedState,
    /// The room this stream belongs to.
    pub code: String,
    /// The seat the stream authenticated as, if any.
    pub participant_id: Option<Uuid>,
}

/// Convert a broadcast receiver into an SSE response, forwarding events and
/// running seat-disconnect handling once the client goes away.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    ticket: StreamTicket,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Small bounded channel between the forwarder and the response body.
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            let mut event = Event::default().data(payload.data);
                            if let Some(name) = payload.event {
                                event = event.event(name);
                            }

                            if tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(_)) => {
                            // Skip lagged messages but keep the stream alive.
                            continue;
                        }
                    }
                }
            }
        }

        // The teardown owns its state clone so cleanup runs even after the
        // request context has dropped.
        let Some(id) = ticket.participant_id else {
            tracing::debug!(code = %ticket.code, "spectator stream disconnected");
            return;
        };
        handle_detach(&ticket.state, &ticket.code, id).await;
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Dispatch a dropped stream to the matching grace handler.
async fn handle_detach(state: &SharedState, code: &str, participant_id: Uuid) {
    let is_host = {
        let Some(room) = state.room(code) else {
            return;
        };
        let session = room.session().lock().await;
        match session.host() {
            Some(host) => host.id == participant_id,
            None => false,
        }
    };

    if is_host {
        reconnect_service::host_disconnected(state, code).await;
    } else {
        reconnect_service::player_disconnected(state, code, participant_id).await;
    }
}
