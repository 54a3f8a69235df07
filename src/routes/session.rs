use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dao::models::MatchSummary,
    dto::session::{
        CreateSessionRequest, CreateSessionResponse, DirectoryEntry, DirectoryQuery,
        HostActionRequest, JoinSessionRequest, JoinSessionResponse, KickRequest, LeaveRequest,
        RejoinRequest, RejoinResponse, SnapshotQuery, SwitchTeamRequest, VoteRequest,
    },
    dto::snapshot::SessionSnapshot,
    error::AppError,
    services::{
        export_service, reconnect_service, round_service, session_service, snapshot_service,
    },
    state::SharedState,
};

/// Session lifecycle, gameplay, and host-control endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session).get(directory))
        .route("/sessions/{code}", get(session_snapshot))
        .route("/sessions/{code}/join", post(join_session))
        .route("/sessions/{code}/rejoin", post(rejoin_session))
        .route("/sessions/{code}/leave", post(leave_session))
        .route("/sessions/{code}/team", post(switch_team))
        .route("/sessions/{code}/votes", post(submit_vote))
        .route("/sessions/{code}/start", post(start_match))
        .route("/sessions/{code}/pause", post(pause_match))
        .route("/sessions/{code}/resume", post(resume_match))
        .route("/sessions/{code}/skip", post(skip_round))
        .route("/sessions/{code}/close", post(close_session))
        .route("/sessions/{code}/kick", post(kick_participant))
        .route("/sessions/{code}/export", get(export_summary))
}

/// Open a new session lobby and claim the host seat.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created", body = CreateSessionResponse),
        (status = 400, description = "Invalid topic, mode, or pack selection")
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateSessionRequest>>,
) -> Result<Json<CreateSessionResponse>, AppError> {
    Ok(Json(session_service::create_session(&state, payload).await?))
}

/// List sessions, optionally filtered by phase and mode.
#[utoipa::path(
    get,
    path = "/sessions",
    tag = "sessions",
    params(
        ("phase" = Option<String>, Query, description = "Restrict to a lifecycle phase label"),
        ("mode" = Option<String>, Query, description = "Restrict to a gameplay mode identifier")
    ),
    responses((status = 200, description = "Session directory", body = [DirectoryEntry]))
)]
pub async fn directory(
    State(state): State<SharedState>,
    Query(query): Query<DirectoryQuery>,
) -> Json<Vec<DirectoryEntry>> {
    Json(session_service::directory(&state, query).await)
}

/// Fetch the full state view of one session. Passing `participant_id`
/// personalizes the view with that seat's own vote.
#[utoipa::path(
    get,
    path = "/sessions/{code}",
    tag = "sessions",
    params(
        ("code" = String, Path, description = "Join code"),
        ("participant_id" = Option<Uuid>, Query, description = "Viewer seat for vote personalization")
    ),
    responses(
        (status = 200, description = "Session snapshot", body = SessionSnapshot),
        (status = 404, description = "Unknown join code")
    )
)]
pub async fn session_snapshot(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let room = session_service::require_room(&state, &code)?;
    let session = room.session().lock().await;
    Ok(Json(snapshot_service::snapshot(&session, query.participant_id)))
}

/// Join a session as a player.
#[utoipa::path(
    post,
    path = "/sessions/{code}/join",
    tag = "sessions",
    params(("code" = String, Path, description = "Join code")),
    request_body = JoinSessionRequest,
    responses(
        (status = 200, description = "Seat assigned", body = JoinSessionResponse),
        (status = 401, description = "Wrong password"),
        (status = 409, description = "Match already started or session full")
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Valid(Json(payload)): Valid<Json<JoinSessionRequest>>,
) -> Result<Json<JoinSessionResponse>, AppError> {
    Ok(Json(
        session_service::join_session(&state, &code, payload).await?,
    ))
}

/// Reclaim a held seat with the credential issued at create or join time.
#[utoipa::path(
    post,
    path = "/sessions/{code}/rejoin",
    tag = "sessions",
    params(("code" = String, Path, description = "Join code")),
    request_body = RejoinRequest,
    responses(
        (status = 200, description = "Seat restored", body = RejoinResponse),
        (status = 401, description = "Unknown credential")
    )
)]
pub async fn rejoin_session(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Valid(Json(payload)): Valid<Json<RejoinRequest>>,
) -> Result<Json<RejoinResponse>, AppError> {
    Ok(Json(
        reconnect_service::rejoin(&state, &code, payload).await?,
    ))
}

/// Leave a session voluntarily.
#[utoipa::path(
    post,
    path = "/sessions/{code}/leave",
    tag = "sessions",
    params(("code" = String, Path, description = "Join code")),
    request_body = LeaveRequest,
    responses((status = 204, description = "Seat released"))
)]
pub async fn leave_session(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<LeaveRequest>,
) -> Result<StatusCode, AppError> {
    session_service::leave(&state, &code, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Switch sides while in the lobby.
#[utoipa::path(
    post,
    path = "/sessions/{code}/team",
    tag = "sessions",
    params(("code" = String, Path, description = "Join code")),
    request_body = SwitchTeamRequest,
    responses(
        (status = 204, description = "Side switched"),
        (status = 409, description = "Teams are fixed or the side is taken")
    )
)]
pub async fn switch_team(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Valid(Json(payload)): Valid<Json<SwitchTeamRequest>>,
) -> Result<StatusCode, AppError> {
    session_service::switch_team(&state, &code, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Submit a vote or answer for the current round.
#[utoipa::path(
    post,
    path = "/sessions/{code}/votes",
    tag = "rounds",
    params(("code" = String, Path, description = "Join code")),
    request_body = VoteRequest,
    responses(
        (status = 204, description = "Vote recorded"),
        (status = 400, description = "Malformed vote or duplicate submission"),
        (status = 409, description = "No round is accepting votes")
    )
)]
pub async fn submit_vote(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<VoteRequest>,
) -> Result<StatusCode, AppError> {
    round_service::submit_vote(&state, &code, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Host control: start the match and kick off question generation.
#[utoipa::path(
    post,
    path = "/sessions/{code}/start",
    tag = "rounds",
    params(("code" = String, Path, description = "Join code")),
    request_body = HostActionRequest,
    responses(
        (status = 202, description = "Generation started"),
        (status = 400, description = "Roster is not ready"),
        (status = 401, description = "Caller is not the host")
    )
)]
pub async fn start_match(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<HostActionRequest>,
) -> Result<StatusCode, AppError> {
    round_service::start_match(&state, &code, payload).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Host control: pause the running match.
#[utoipa::path(
    post,
    path = "/sessions/{code}/pause",
    tag = "rounds",
    params(("code" = String, Path, description = "Join code")),
    request_body = HostActionRequest,
    responses((status = 204, description = "Match paused"))
)]
pub async fn pause_match(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<HostActionRequest>,
) -> Result<StatusCode, AppError> {
    round_service::pause(&state, &code, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Host control: resume a paused match.
#[utoipa::path(
    post,
    path = "/sessions/{code}/resume",
    tag = "rounds",
    params(("code" = String, Path, description = "Join code")),
    request_body = HostActionRequest,
    responses((status = 204, description = "Match resumed"))
)]
pub async fn resume_match(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<HostActionRequest>,
) -> Result<StatusCode, AppError> {
    round_service::resume(&state, &code, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Host control: skip the current round or cut the review window short.
#[utoipa::path(
    post,
    path = "/sessions/{code}/skip",
    tag = "rounds",
    params(("code" = String, Path, description = "Join code")),
    request_body = HostActionRequest,
    responses((status = 204, description = "Round skipped"))
)]
pub async fn skip_round(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<HostActionRequest>,
) -> Result<StatusCode, AppError> {
    round_service::skip(&state, &code, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Host control: close the session for everyone.
#[utoipa::path(
    post,
    path = "/sessions/{code}/close",
    tag = "sessions",
    params(("code" = String, Path, description = "Join code")),
    request_body = HostActionRequest,
    responses((status = 204, description = "Session closed"))
)]
pub async fn close_session(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<HostActionRequest>,
) -> Result<StatusCode, AppError> {
    session_service::close(&state, &code, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Host moderation: remove a player from the session.
#[utoipa::path(
    post,
    path = "/sessions/{code}/kick",
    tag = "sessions",
    params(("code" = String, Path, description = "Join code")),
    request_body = KickRequest,
    responses(
        (status = 204, description = "Player removed"),
        (status = 401, description = "Caller is not the host")
    )
)]
pub async fn kick_participant(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<KickRequest>,
) -> Result<StatusCode, AppError> {
    session_service::kick(&state, &code, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Fetch the match summary: final standings once finished, current
/// standings while the match is still running.
#[utoipa::path(
    get,
    path = "/sessions/{code}/export",
    tag = "sessions",
    params(("code" = String, Path, description = "Join code")),
    responses(
        (status = 200, description = "Match summary", body = MatchSummary),
        (status = 404, description = "Unknown join code")
    )
)]
pub async fn export_summary(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<MatchSummary>, AppError> {
    let room = session_service::require_room(&state, &code)?;
    let session = room.session().lock().await;
    Ok(Json(export_service::build_summary(&session)))
}
