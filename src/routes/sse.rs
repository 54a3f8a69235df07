use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, Query, State},
    response::sse::Sse,
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{
    dto::session::SnapshotQuery,
    error::AppError,
    services::sse_service::{self, StreamTicket},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sessions/{code}/events",
    tag = "sse",
    params(
        ("code" = String, Path, description = "Join code"),
        ("participant_id" = Option<Uuid>, Query, description = "Seat this stream authenticates as; marks it connected")
    ),
    responses(
        (status = 200, description = "Session event stream", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown join code")
    )
)]
/// Stream realtime session events. The stream doubles as the liveness
/// signal for the seat named by `participant_id`.
pub async fn session_stream(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>>, AppError> {
    let receiver = sse_service::attach(&state, &code, query.participant_id).await?;
    info!(%code, participant = ?query.participant_id, "new session SSE connection");
    Ok(sse_service::to_sse_stream(
        receiver,
        StreamTicket {
            state,
            code,
            participant_id: query.participant_id,
        },
    ))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sessions/{code}/events", get(session_stream))
}
