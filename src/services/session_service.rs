//! Session lifecycle: creation, joins, team switches, departures, host
//! moderation, and the public directory.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::{
    dto::{
        format_epoch_ms,
        session::{
            CreateSessionRequest, CreateSessionResponse, DirectoryEntry, DirectoryQuery,
            HostActionRequest, JoinSessionRequest, JoinSessionResponse, KickRequest, LeaveRequest,
            SwitchTeamRequest,
        },
        sse::{ServerEvent, SessionClosedEvent},
        validation::validate_join_code,
    },
    error::ServiceError,
    generator::providers::AiMode,
    services::{round_service, snapshot_service},
    state::{
        SessionRoom, SharedState,
        session::{
            ContentPack, GameplayMode, HOST_CREDENTIAL_LENGTH, PLAYER_CREDENTIAL_LENGTH,
            Participant, ParticipantStats, QUESTION_COUNT_RANGE, Role, Session, SessionFormat,
            TeamId, generate_credential, generate_join_code, now_ms,
        },
        state_machine::{FinishReason, SessionPhase},
    },
};

/// Hard cap on players per session, host excluded.
const MAX_PLAYERS: usize = 16;
/// Join-code allocation attempts before giving up.
const CODE_ATTEMPTS: usize = 32;
/// Default questions per team set.
const DEFAULT_QUESTION_COUNT: usize = 6;
/// Default base round duration in seconds.
const DEFAULT_ROUND_SECONDS: u64 = 30;

/// Look up a session room or fail with a not-found error.
pub(crate) fn require_room(
    state: &SharedState,
    code: &str,
) -> Result<Arc<SessionRoom>, ServiceError> {
    // A malformed code can never be in the registry; skip the lookup.
    if validate_join_code(code).is_err() {
        return Err(ServiceError::NotFound(format!("session {code} not found")));
    }
    state
        .room(code)
        .ok_or_else(|| ServiceError::NotFound(format!("session {code} not found")))
}

/// Verify the caller holds the host seat.
pub(crate) fn require_host(session: &Session, host_id: Uuid) -> Result<(), ServiceError> {
    match session.host() {
        Some(host) if host.id == host_id => Ok(()),
        _ => Err(ServiceError::Unauthorized(
            "only the host may do that".into(),
        )),
    }
}

/// Create a session lobby with a fresh join code and the host seat filled.
pub async fn create_session(
    state: &SharedState,
    payload: CreateSessionRequest,
) -> Result<CreateSessionResponse, ServiceError> {
    let mode = GameplayMode::parse(&payload.mode)
        .ok_or_else(|| ServiceError::InvalidInput(format!("unknown mode '{}'", payload.mode)))?;
    let mut packs = Vec::new();
    for tag in &payload.packs {
        let pack = ContentPack::parse(tag)
            .ok_or_else(|| ServiceError::InvalidInput(format!("unknown pack '{tag}'")))?;
        if !packs.contains(&pack) {
            packs.push(pack);
        }
    }
    let ai_mode = AiMode::parse(&payload.ai_mode)
        .ok_or_else(|| ServiceError::InvalidInput(format!("unknown AI mode '{}'", payload.ai_mode)))?;
    let question_count = payload
        .question_count
        .unwrap_or(DEFAULT_QUESTION_COUNT)
        .clamp(QUESTION_COUNT_RANGE.0, QUESTION_COUNT_RANGE.1);
    let round_seconds = payload.round_seconds.unwrap_or(DEFAULT_ROUND_SECONDS);

    let host_id = Uuid::new_v4();
    let host_credential = generate_credential(HOST_CREDENTIAL_LENGTH);

    for _ in 0..CODE_ATTEMPTS {
        let code = generate_join_code();
        let mut session = Session::new(
            code.clone(),
            payload.topic.trim().to_string(),
            mode,
            packs.clone(),
            payload.password.clone(),
            ai_mode,
            payload.tone.clone(),
            question_count,
            round_seconds,
        );
        session.participants.push(Participant {
            id: host_id,
            name: payload.host_name.trim().to_string(),
            role: Role::Host,
            team: TeamId::A,
            credential: host_credential.clone(),
            connected: true,
            team_locked: false,
            joined_at: now_ms(),
            stats: ParticipantStats::default(),
        });
        session.push_timeline(format!("session opened by {}", payload.host_name.trim()));

        let room = Arc::new(SessionRoom::new(session));
        if state.insert_room(code.clone(), room) {
            info!(%code, mode = mode.as_str(), "session created");
            return Ok(CreateSessionResponse {
                code,
                host_id,
                host_credential,
            });
        }
    }

    Err(ServiceError::InvalidState(
        "could not allocate a join code".into(),
    ))
}

/// Join a session as a player. Admission is open in the lobby and while
/// questions are still being prepared.
pub async fn join_session(
    state: &SharedState,
    code: &str,
    payload: JoinSessionRequest,
) -> Result<JoinSessionResponse, ServiceError> {
    let room = require_room(state, code)?;
    let mut session = room.session().lock().await;

    if !matches!(
        session.machine.phase(),
        SessionPhase::Lobby | SessionPhase::Preparing
    ) {
        return Err(ServiceError::InvalidState(
            "the match has already started".into(),
        ));
    }
    if let Some(expected) = &session.password
        && payload.password.as_deref() != Some(expected.as_str())
    {
        return Err(ServiceError::Unauthorized("wrong session password".into()));
    }

    let name = payload.name.trim().to_string();
    let name_taken = session
        .participants
        .iter()
        .map(|p| p.name.as_str())
        .chain(session.seat_holds.iter().map(|hold| hold.participant.name.as_str()))
        .any(|existing| existing.eq_ignore_ascii_case(&name));
    if name_taken {
        return Err(ServiceError::InvalidInput(format!(
            "name '{name}' is already taken"
        )));
    }

    let players = session.team_size(TeamId::A) + session.team_size(TeamId::B);
    if players >= MAX_PLAYERS {
        return Err(ServiceError::InvalidState("session is full".into()));
    }
    if session.mode == GameplayMode::Duel
        && session.team_size(TeamId::A) >= 1
        && session.team_size(TeamId::B) >= 1
    {
        return Err(ServiceError::InvalidState("the duel is full".into()));
    }

    let team = session.team_for_new_player();
    let participant_id = Uuid::new_v4();
    let credential = generate_credential(PLAYER_CREDENTIAL_LENGTH);
    session.participants.push(Participant {
        id: participant_id,
        name: name.clone(),
        role: Role::Player,
        team,
        credential: credential.clone(),
        connected: true,
        team_locked: false,
        joined_at: now_ms(),
        stats: ParticipantStats::default(),
    });
    let joined = match session.format() {
        SessionFormat::Teams => format!("{name} joined team {}", team.label()),
        SessionFormat::FreeForAll => format!("{name} joined"),
    };
    session.push_timeline(joined);

    snapshot_service::broadcast(&room, &session);
    Ok(JoinSessionResponse {
        participant_id,
        credential,
        team: team.label().into(),
    })
}

/// Switch sides while still in the lobby. The chosen seat is locked so the
/// balancer will not move it back.
pub async fn switch_team(
    state: &SharedState,
    code: &str,
    payload: SwitchTeamRequest,
) -> Result<(), ServiceError> {
    let room = require_room(state, code)?;
    let mut session = room.session().lock().await;

    if *session.machine.phase() != SessionPhase::Lobby {
        return Err(ServiceError::InvalidState(
            "teams are fixed once the match starts".into(),
        ));
    }
    if session.format() != SessionFormat::Teams {
        return Err(ServiceError::InvalidInput(
            "this mode has no teams to switch".into(),
        ));
    }
    let target = match payload.team.as_str() {
        "A" => TeamId::A,
        "B" => TeamId::B,
        other => {
            return Err(ServiceError::InvalidInput(format!("unknown team '{other}'")));
        }
    };
    if session.mode == GameplayMode::Duel && session.team_size(target) >= 1 {
        return Err(ServiceError::InvalidState("that side is taken".into()));
    }

    let name = {
        let participant = session
            .participant_mut(payload.participant_id)
            .ok_or_else(|| ServiceError::NotFound("participant not found".into()))?;
        if participant.role != Role::Player {
            return Err(ServiceError::InvalidInput("the host has no team".into()));
        }
        participant.team = target;
        participant.team_locked = true;
        participant.name.clone()
    };
    session.push_timeline(format!("{name} moved to team {}", target.label()));
    snapshot_service::broadcast(&room, &session);
    Ok(())
}

/// Leave a session voluntarily. A departing host closes the session; a
/// player's seat is released immediately with its statistics preserved.
pub async fn leave(
    state: &SharedState,
    code: &str,
    payload: LeaveRequest,
) -> Result<(), ServiceError> {
    let room = require_room(state, code)?;
    let mut session = room.session().lock().await;

    let participant = session
        .participant(payload.participant_id)
        .ok_or_else(|| ServiceError::NotFound("participant not found".into()))?;
    let name = participant.name.clone();

    if participant.role == Role::Host {
        close_session(state, &room, &mut session, "the host left the session");
        return Ok(());
    }

    let position = session
        .participants
        .iter()
        .position(|p| p.id == payload.participant_id)
        .ok_or_else(|| ServiceError::NotFound("participant not found".into()))?;
    let mut seat = session.participants.remove(position);
    match session.machine.phase() {
        SessionPhase::Lobby => {
            session.rebalance_teams();
        }
        _ => {
            seat.connected = false;
            session.departed.push(seat);
        }
    }
    session.push_timeline(format!("{name} left"));
    round_service::on_roster_shrunk(&mut session);
    snapshot_service::broadcast(&room, &session);
    Ok(())
}

/// Host moderation: remove a player. In the lobby the seat vanishes; during
/// a match the player is disqualified and their statistics stay on record.
pub async fn kick(
    state: &SharedState,
    code: &str,
    payload: KickRequest,
) -> Result<(), ServiceError> {
    let room = require_room(state, code)?;
    let mut session = room.session().lock().await;
    require_host(&session, payload.host_id)?;

    if payload.target_id == payload.host_id {
        return Err(ServiceError::InvalidInput("the host cannot be kicked".into()));
    }
    let position = session
        .participants
        .iter()
        .position(|p| p.id == payload.target_id)
        .ok_or_else(|| ServiceError::NotFound("participant not found".into()))?;
    let name = session.participants[position].name.clone();

    if *session.machine.phase() == SessionPhase::Lobby {
        session.participants.remove(position);
        session.rebalance_teams();
    } else {
        session.participants[position].stats.disqualified = true;
    }
    session.push_timeline(format!("{name} was removed by the host"));
    round_service::on_roster_shrunk(&mut session);
    snapshot_service::broadcast(&room, &session);
    Ok(())
}

/// Host control: close the session for everyone.
pub async fn close(
    state: &SharedState,
    code: &str,
    payload: HostActionRequest,
) -> Result<(), ServiceError> {
    let room = require_room(state, code)?;
    let mut session = room.session().lock().await;
    require_host(&session, payload.host_id)?;
    close_session(state, &room, &mut session, "closed by the host");
    Ok(())
}

/// Finish (when still live), announce the closure, and broadcast the final
/// snapshot. The room stays in the registry until the sweeper prunes it so
/// late readers can still fetch the summary.
pub(crate) fn close_session(
    state: &SharedState,
    room: &SessionRoom,
    session: &mut Session,
    reason: &str,
) {
    if session.machine.is_live() {
        round_service::finish_session(state, session, FinishReason::ManualStop);
    }
    snapshot_service::broadcast(room, session);
    if let Ok(event) = ServerEvent::json(
        Some("session_closed".to_string()),
        &SessionClosedEvent {
            reason: reason.to_string(),
        },
    ) {
        room.hub().broadcast(event);
    }
    info!(code = %session.code, reason, "session closed");
}

/// Public directory of sessions, optionally filtered by phase and mode.
pub async fn directory(state: &SharedState, query: DirectoryQuery) -> Vec<DirectoryEntry> {
    let mut entries = Vec::new();
    let rooms: Vec<Arc<SessionRoom>> = state
        .sessions()
        .iter()
        .map(|entry| entry.value().clone())
        .collect();

    for room in rooms {
        let session = room.session().lock().await;
        let phase = session.machine.phase().label();
        if let Some(filter) = &query.phase
            && filter != phase
        {
            continue;
        }
        if let Some(filter) = &query.mode
            && filter != session.mode.as_str()
        {
            continue;
        }
        entries.push(DirectoryEntry {
            code: session.code.clone(),
            topic: session.topic.clone(),
            mode: session.mode.as_str().into(),
            phase: phase.into(),
            players: session.team_size(TeamId::A) + session.team_size(TeamId::B),
            locked: session.password.is_some(),
            created_at: format_epoch_ms(session.created_at),
        });
    }

    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::state::AppState;

    fn test_state() -> SharedState {
        AppState::new(AppConfig::default())
    }

    fn create_payload(mode: &str) -> CreateSessionRequest {
        CreateSessionRequest {
            topic: "space probes".into(),
            host_name: "quizmaster".into(),
            mode: mode.into(),
            packs: vec![],
            password: None,
            question_count: None,
            round_seconds: None,
            ai_mode: "synthetic".into(),
            tone: None,
        }
    }

    #[tokio::test]
    async fn create_then_join_assigns_teams() {
        let state = test_state();
        let created = create_session(&state, create_payload("team_battle"))
            .await
            .unwrap();
        assert_eq!(created.code.len(), 6);

        let first = join_session(
            &state,
            &created.code,
            JoinSessionRequest {
                name: "alice".into(),
                password: None,
            },
        )
        .await
        .unwrap();
        let second = join_session(
            &state,
            &created.code,
            JoinSessionRequest {
                name: "bob".into(),
                password: None,
            },
        )
        .await
        .unwrap();

        // Two joins into an empty lobby must land on opposite sides.
        assert_ne!(first.team, second.team);
    }

    #[tokio::test]
    async fn join_rejects_duplicate_names_and_wrong_passwords() {
        let state = test_state();
        let mut payload = create_payload("team_battle");
        payload.password = Some("hunter2".into());
        let created = create_session(&state, payload).await.unwrap();

        let denied = join_session(
            &state,
            &created.code,
            JoinSessionRequest {
                name: "alice".into(),
                password: Some("wrong".into()),
            },
        )
        .await;
        assert!(matches!(denied, Err(ServiceError::Unauthorized(_))));

        join_session(
            &state,
            &created.code,
            JoinSessionRequest {
                name: "alice".into(),
                password: Some("hunter2".into()),
            },
        )
        .await
        .unwrap();
        let duplicate = join_session(
            &state,
            &created.code,
            JoinSessionRequest {
                name: "ALICE".into(),
                password: Some("hunter2".into()),
            },
        )
        .await;
        assert!(matches!(duplicate, Err(ServiceError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn duel_admits_exactly_two_players() {
        let state = test_state();
        let created = create_session(&state, create_payload("duel_1v1"))
            .await
            .unwrap();
        for name in ["left", "right"] {
            join_session(
                &state,
                &created.code,
                JoinSessionRequest {
                    name: name.into(),
                    password: None,
                },
            )
            .await
            .unwrap();
        }

        let third = join_session(
            &state,
            &created.code,
            JoinSessionRequest {
                name: "third".into(),
                password: None,
            },
        )
        .await;
        assert!(matches!(third, Err(ServiceError::InvalidState(_))));
    }

    #[tokio::test]
    async fn directory_filters_by_phase_and_mode() {
        let state = test_state();
        create_session(&state, create_payload("team_battle"))
            .await
            .unwrap();
        create_session(&state, create_payload("solo_arena"))
            .await
            .unwrap();

        let all = directory(&state, DirectoryQuery::default()).await;
        assert_eq!(all.len(), 2);

        let solo = directory(
            &state,
            DirectoryQuery {
                phase: Some("lobby".into()),
                mode: Some("solo_arena".into()),
            },
        )
        .await;
        assert_eq!(solo.len(), 1);
        assert_eq!(solo[0].mode, "solo_arena");
    }

    #[tokio::test]
    async fn kick_in_lobby_removes_the_seat() {
        let state = test_state();
        let created = create_session(&state, create_payload("team_battle"))
            .await
            .unwrap();
        let joined = join_session(
            &state,
            &created.code,
            JoinSessionRequest {
                name: "alice".into(),
                password: None,
            },
        )
        .await
        .unwrap();

        kick(
            &state,
            &created.code,
            KickRequest {
                host_id: created.host_id,
                target_id: joined.participant_id,
            },
        )
        .await
        .unwrap();

        let room = state.room(&created.code).unwrap();
        let session = room.session().lock().await;
        assert!(session.participant(joined.participant_id).is_none());
    }

    #[tokio::test]
    async fn kick_requires_the_host_seat() {
        let state = test_state();
        let created = create_session(&state, create_payload("team_battle"))
            .await
            .unwrap();
        let joined = join_session(
            &state,
            &created.code,
            JoinSessionRequest {
                name: "alice".into(),
                password: None,
            },
        )
        .await
        .unwrap();

        let denied = kick(
            &state,
            &created.code,
            KickRequest {
                host_id: joined.participant_id,
                target_id: joined.participant_id,
            },
        )
        .await;
        assert!(matches!(denied, Err(ServiceError::Unauthorized(_))));
    }
}
