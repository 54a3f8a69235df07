//! Disconnect and rejoin handling. Player seats survive a transport drop
//! for a grace window; a dropped host pauses the match until they return or
//! the host grace expires.

use tracing::info;
use uuid::Uuid;

use crate::{
    dto::session::{RejoinRequest, RejoinResponse},
    error::ServiceError,
    services::{round_service, session_service::require_room, snapshot_service},
    state::{
        SharedState,
        session::{Role, SeatHold, Session, now_ms},
        state_machine::{PauseReason, SessionEvent, SessionPhase},
    },
};

/// Reclaim a seat with the credential issued at create or join time.
pub async fn rejoin(
    state: &SharedState,
    code: &str,
    payload: RejoinRequest,
) -> Result<RejoinResponse, ServiceError> {
    let room = require_room(state, code)?;
    let mut session = room.session().lock().await;

    if !session.machine.is_live() {
        return Err(ServiceError::InvalidState("the match has ended".into()));
    }

    // A held seat is the common case: the sweeper has not released it yet.
    if let Some(position) = session
        .seat_holds
        .iter()
        .position(|hold| hold.credential == payload.credential)
    {
        let hold = session.seat_holds.remove(position);
        let seat = match session.participant_mut(hold.participant.id) {
            Some(seat) => {
                seat.connected = true;
                seat.clone()
            }
            // The roster entry raced out from under the hold; restore the
            // seat exactly as it was at disconnect time.
            None => {
                let mut seat = hold.participant;
                seat.connected = true;
                session.departed.retain(|p| p.id != seat.id);
                session.participants.push(seat.clone());
                seat
            }
        };
        session.push_timeline(format!("{} reconnected", seat.name));
        info!(code, participant = %seat.id, "seat reclaimed from hold");
        snapshot_service::broadcast(&room, &session);
        return Ok(RejoinResponse {
            participant_id: seat.id,
            role: seat.role.label().into(),
            team: seat.team.label().into(),
        });
    }

    // No hold: a lobby-phase player or the host.
    let (seat_id, role, team, name) = {
        let seat = session
            .participants
            .iter_mut()
            .find(|p| p.credential == payload.credential)
            .ok_or_else(|| ServiceError::Unauthorized("unknown credential".into()))?;
        seat.connected = true;
        (seat.id, seat.role, seat.team, seat.name.clone())
    };

    if role == Role::Host {
        session.host_grace_deadline = None;
        resume_after_host_return(&mut session);
        session.push_timeline(format!("host {name} reconnected"));
        info!(code, "host reclaimed the session");
    } else {
        session.push_timeline(format!("{name} reconnected"));
    }

    snapshot_service::broadcast(&room, &session);
    Ok(RejoinResponse {
        participant_id: seat_id,
        role: role.label().into(),
        team: team.label().into(),
    })
}

/// A match paused by the host's disconnect resumes as soon as they return,
/// restoring the preserved clock.
fn resume_after_host_return(session: &mut Session) {
    if *session.machine.phase() != SessionPhase::Paused(PauseReason::HostDisconnected) {
        return;
    }
    if session.machine.apply(SessionEvent::Resume).is_err() {
        return;
    }
    let remaining = session.paused_remaining_ms.take();
    let now = now_ms();
    if let Some(active) = session.active.as_mut() {
        active.deadline_at = now + remaining.unwrap_or(active.duration_ms);
    } else if session.current_round < session.plan.len() {
        session.advance_at = Some(now + remaining.unwrap_or(0));
    }
}

/// Record a player's transport drop. Lobby seats are released immediately;
/// mid-match seats are held for the player grace window.
pub async fn player_disconnected(state: &SharedState, code: &str, participant_id: Uuid) {
    let Some(room) = state.room(code) else {
        return;
    };
    let mut session = room.session().lock().await;
    if !session.machine.is_live() {
        return;
    }
    let Some(seat) = session.participant_mut(participant_id) else {
        return;
    };
    if seat.role != Role::Player || !seat.connected {
        return;
    }
    seat.connected = false;
    let seat = seat.clone();
    let name = seat.name.clone();

    if *session.machine.phase() == SessionPhase::Lobby {
        session.participants.retain(|p| p.id != participant_id);
        session.rebalance_teams();
        session.push_timeline(format!("{name} left the lobby"));
    } else {
        let deadline_at = now_ms() + state.config().player_grace.as_millis() as u64;
        session.seat_holds.retain(|hold| hold.participant.id != participant_id);
        session.seat_holds.push(SeatHold {
            credential: seat.credential.clone(),
            participant: seat,
            deadline_at,
        });
        session.push_timeline(format!("{name} disconnected; seat held"));
        round_service::on_roster_shrunk(&mut session);
    }

    info!(code, participant = %participant_id, "player disconnected");
    snapshot_service::broadcast(&room, &session);
}

/// Record the host's transport drop. A live match pauses with the clock
/// preserved and the host grace countdown starts.
pub async fn host_disconnected(state: &SharedState, code: &str) {
    let Some(room) = state.room(code) else {
        return;
    };
    let mut session = room.session().lock().await;
    if !session.machine.is_live() {
        return;
    }
    let Some(host) = session.host_mut() else {
        return;
    };
    if !host.connected {
        return;
    }
    host.connected = false;

    if session
        .machine
        .apply(SessionEvent::Pause(PauseReason::HostDisconnected))
        .is_ok()
    {
        let now = now_ms();
        session.paused_remaining_ms = Some(match (&session.active, session.advance_at) {
            (Some(active), _) => active.remaining_ms(now),
            (None, Some(at)) => at.saturating_sub(now),
            (None, None) => session.round_duration_ms,
        });
        session.advance_at = None;
        session.push_timeline("host disconnected; match paused");
    }
    session.host_grace_deadline =
        Some(now_ms() + state.config().host_grace.as_millis() as u64);

    info!(code, "host disconnected; grace window started");
    snapshot_service::broadcast(&room, &session);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::dto::session::{CreateSessionRequest, JoinSessionRequest};
    use crate::services::session_service;
    use crate::state::AppState;
    use crate::state::session::TeamId;

    async fn lobby_with_player() -> (SharedState, String, Uuid, String, Uuid) {
        let state = AppState::new(AppConfig::default());
        let created = session_service::create_session(
            &state,
            CreateSessionRequest {
                topic: "deep sea life".into(),
                host_name: "host".into(),
                mode: "team_battle".into(),
                packs: vec![],
                password: None,
                question_count: None,
                round_seconds: None,
                ai_mode: "synthetic".into(),
                tone: None,
            },
        )
        .await
        .unwrap();
        let joined = session_service::join_session(
            &state,
            &created.code,
            JoinSessionRequest {
                name: "alice".into(),
                password: None,
            },
        )
        .await
        .unwrap();
        (
            state,
            created.code,
            created.host_id,
            joined.credential,
            joined.participant_id,
        )
    }

    #[tokio::test]
    async fn lobby_disconnect_releases_the_seat() {
        let (state, code, _, _, player_id) = lobby_with_player().await;
        player_disconnected(&state, &code, player_id).await;

        let room = state.room(&code).unwrap();
        let session = room.session().lock().await;
        assert!(session.participant(player_id).is_none());
        assert!(session.seat_holds.is_empty());
    }

    #[tokio::test]
    async fn mid_match_disconnect_holds_the_seat_until_rejoin() {
        let (state, code, _, credential, player_id) = lobby_with_player().await;
        {
            let room = state.room(&code).unwrap();
            let mut session = room.session().lock().await;
            session.machine.apply(SessionEvent::StartRequested).unwrap();
        }

        player_disconnected(&state, &code, player_id).await;
        {
            let room = state.room(&code).unwrap();
            let session = room.session().lock().await;
            assert_eq!(session.seat_holds.len(), 1);
            assert!(!session.participant(player_id).unwrap().connected);
        }

        let restored = rejoin(&state, &code, RejoinRequest { credential })
            .await
            .unwrap();
        assert_eq!(restored.participant_id, player_id);

        let room = state.room(&code).unwrap();
        let session = room.session().lock().await;
        assert!(session.seat_holds.is_empty());
        assert!(session.participant(player_id).unwrap().connected);
    }

    #[tokio::test]
    async fn rejoin_rejects_unknown_credentials() {
        let (state, code, _, _, _) = lobby_with_player().await;
        let denied = rejoin(
            &state,
            &code,
            RejoinRequest {
                credential: "not-a-real-credential".into(),
            },
        )
        .await;
        assert!(matches!(denied, Err(ServiceError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn host_drop_pauses_and_rejoin_resumes() {
        let (state, code, _host_id, _, _) = lobby_with_player().await;
        session_service::join_session(
            &state,
            &code,
            JoinSessionRequest {
                name: "bob".into(),
                password: None,
            },
        )
        .await
        .unwrap();
        let host_credential = {
            let room = state.room(&code).unwrap();
            let mut session = room.session().lock().await;
            session.machine.apply(SessionEvent::StartRequested).unwrap();
            session.machine.apply(SessionEvent::QuestionsReady).unwrap();
            round_service::start_round(&mut session);
            session.host().unwrap().credential.clone()
        };

        host_disconnected(&state, &code).await;
        {
            let room = state.room(&code).unwrap();
            let session = room.session().lock().await;
            assert_eq!(
                *session.machine.phase(),
                SessionPhase::Paused(PauseReason::HostDisconnected)
            );
            assert!(session.host_grace_deadline.is_some());
            assert!(session.paused_remaining_ms.is_some());
        }

        let restored = rejoin(
            &state,
            &code,
            RejoinRequest {
                credential: host_credential,
            },
        )
        .await
        .unwrap();
        assert_eq!(restored.role, "host");

        let room = state.room(&code).unwrap();
        let session = room.session().lock().await;
        assert_eq!(*session.machine.phase(), SessionPhase::Running);
        assert!(session.host_grace_deadline.is_none());
        assert!(session.active.as_ref().unwrap().deadline_at > now_ms());
    }

    #[tokio::test]
    async fn roster_shrink_is_checked_after_a_mid_round_drop() {
        let (state, code, _, _, player_id) = lobby_with_player().await;
        {
            let room = state.room(&code).unwrap();
            let mut session = room.session().lock().await;
            // Give team B a seat so the plan is legal, then run a B turn.
            let mut other = session.participants[1].clone();
            other.id = Uuid::new_v4();
            other.name = "solo-b".into();
            other.team = TeamId::B;
            session.participants.push(other);
        }
        player_disconnected(&state, &code, player_id).await;

        let room = state.room(&code).unwrap();
        let session = room.session().lock().await;
        // Lobby phase: the seat is simply gone.
        assert!(session.participant(player_id).is_none());
    }
}
