//! Background sweeper. One ticking task enforces every time-based rule:
//! round deadlines, review-window advances, the generation watchdog, grace
//! windows for dropped seats, and retention of finished sessions.

use std::{sync::Arc, time::Duration};

use tracing::{debug, info};

use crate::{
    generator,
    services::{
        round_service::{self, ResolveTrigger},
        session_service, snapshot_service,
    },
    state::{
        SessionRoom, SharedState,
        session::{SessionFormat, now_ms},
        state_machine::SessionPhase,
    },
};

/// Sweep cadence.
const TICK: Duration = Duration::from_secs(1);
/// How long a finished session stays queryable before the room is pruned.
const FINISHED_RETENTION_MS: u64 = 600_000;

/// Spawn the sweeper task for the lifetime of the process.
pub fn spawn(state: SharedState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sweep(&state).await;
        }
    })
}

/// Run one pass over every room. Prunable rooms are collected first and
/// removed after the iteration so the registry is never mutated mid-walk.
pub(crate) async fn sweep(state: &SharedState) {
    let rooms: Vec<(String, Arc<SessionRoom>)> = state
        .sessions()
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().clone()))
        .collect();

    let mut prunable = Vec::new();
    for (code, room) in rooms {
        if sweep_room(state, &room).await {
            prunable.push(code);
        }
    }
    for code in prunable {
        state.remove_room(&code);
        info!(%code, "finished session pruned");
    }
}

/// Apply every due deadline to one room. Returns true when the room has
/// outlived its retention window and should be removed.
async fn sweep_room(state: &SharedState, room: &SessionRoom) -> bool {
    let mut session = room.session().lock().await;
    let now = now_ms();
    let mut changed = false;

    if let SessionPhase::Finished(_) = session.machine.phase() {
        return session
            .finished_at
            .is_some_and(|at| at + FINISHED_RETENTION_MS <= now);
    }

    // Expired seat holds release their roster entry for good; the stats
    // stay on record via the departed list.
    let expired: Vec<_> = session
        .seat_holds
        .iter()
        .filter(|hold| hold.deadline_at <= now)
        .map(|hold| hold.participant.id)
        .collect();
    for id in expired {
        session.seat_holds.retain(|hold| hold.participant.id != id);
        if let Some(position) = session.participants.iter().position(|p| p.id == id) {
            let seat = session.participants.remove(position);
            session.push_timeline(format!("{} did not return; seat released", seat.name));
            session.departed.push(seat);
            round_service::on_roster_shrunk(&mut session);
        }
        changed = true;
    }

    // A host that never returned ends the match for everyone.
    if session.host_grace_deadline.is_some_and(|at| at <= now) {
        session.host_grace_deadline = None;
        session_service::close_session(state, room, &mut session, "host did not return");
        return false;
    }

    match session.machine.phase().clone() {
        SessionPhase::Preparing => {
            if session.preparing_deadline.is_some_and(|at| at <= now) {
                debug!(code = %session.code, "generation watchdog fired");
                let topic = session.topic.clone();
                let outcome = generator::offline_outcome(
                    &topic,
                    session.question_count,
                    session.format() == SessionFormat::Teams,
                );
                let expected = session.generation_id;
                round_service::apply_generation(&mut session, expected, outcome);
                changed = true;
            }
        }
        SessionPhase::Running => {
            if session
                .active
                .as_ref()
                .is_some_and(|active| active.deadline_at <= now)
            {
                round_service::resolve_active_round(&mut session, ResolveTrigger::Deadline);
            } else if session.advance_at.is_some_and(|at| at <= now) {
                round_service::advance_round(state, &mut session);
            }
            // Running rooms get a tick broadcast either way so clients can
            // track the countdown without local clocks.
            changed = true;
        }
        _ => {}
    }

    if changed {
        snapshot_service::broadcast(room, &session);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::dto::session::{CreateSessionRequest, HostActionRequest, JoinSessionRequest};
    use crate::state::AppState;
    use crate::state::session::SeatHold;
    use crate::state::state_machine::FinishReason;

    struct NullSink;

    impl crate::dao::sink::SummarySink for NullSink {
        fn store(
            &self,
            _summary: crate::dao::models::MatchSummary,
        ) -> futures::future::BoxFuture<'static, crate::dao::sink::SinkResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    async fn seeded(state: &SharedState) -> (String, uuid::Uuid) {
        let created = session_service::create_session(
            state,
            CreateSessionRequest {
                topic: "polar expeditions".into(),
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
        for name in ["alice", "bob"] {
            session_service::join_session(
                state,
                &created.code,
                JoinSessionRequest {
                    name: name.into(),
                    password: None,
                },
            )
            .await
            .unwrap();
        }
        (created.code, created.host_id)
    }

    #[tokio::test]
    async fn generation_watchdog_falls_back_to_the_synthesizer() {
        let state = AppState::new(AppConfig::default());
        let (code, host_id) = seeded(&state).await;
        round_service::start_match(&state, &code, HostActionRequest { host_id })
            .await
            .unwrap();
        {
            let room = state.room(&code).unwrap();
            let mut session = room.session().lock().await;
            // The spawned synthetic generation may already have landed; force
            // the watchdog path either way.
            if *session.machine.phase() == SessionPhase::Preparing {
                session.preparing_deadline = Some(now_ms() - 1);
            }
        }

        sweep(&state).await;

        let room = state.room(&code).unwrap();
        let session = room.session().lock().await;
        assert_eq!(*session.machine.phase(), SessionPhase::Running);
        assert!(!session.question_sets.team_a.is_empty());
        assert!(session.active.is_some());
    }

    #[tokio::test]
    async fn expired_seat_hold_moves_the_player_to_departed() {
        let state = AppState::new(AppConfig::default());
        let (code, _) = seeded(&state).await;
        let player_id = {
            let room = state.room(&code).unwrap();
            let mut session = room.session().lock().await;
            let player = session
                .participants
                .iter()
                .find(|p| p.name == "alice")
                .unwrap()
                .clone();
            session.participant_mut(player.id).unwrap().connected = false;
            session.seat_holds.push(SeatHold {
                credential: player.credential.clone(),
                participant: player.clone(),
                deadline_at: now_ms() - 1,
            });
            player.id
        };

        sweep(&state).await;

        let room = state.room(&code).unwrap();
        let session = room.session().lock().await;
        assert!(session.participant(player_id).is_none());
        assert!(session.departed.iter().any(|p| p.id == player_id));
        assert!(session.seat_holds.is_empty());
    }

    #[tokio::test]
    async fn expired_host_grace_closes_the_session() {
        let state =
            AppState::with_sink(AppConfig::default(), std::sync::Arc::new(NullSink));
        let (code, _) = seeded(&state).await;
        {
            let room = state.room(&code).unwrap();
            let mut session = room.session().lock().await;
            session.host_mut().unwrap().connected = false;
            session.host_grace_deadline = Some(now_ms() - 1);
        }

        sweep(&state).await;

        let room = state.room(&code).unwrap();
        let session = room.session().lock().await;
        assert_eq!(
            *session.machine.phase(),
            SessionPhase::Finished(FinishReason::ManualStop)
        );
    }

    #[tokio::test]
    async fn finished_rooms_are_pruned_after_retention() {
        let state = AppState::new(AppConfig::default());
        let (code, _) = seeded(&state).await;
        {
            let room = state.room(&code).unwrap();
            let mut session = room.session().lock().await;
            session
                .machine
                .apply(crate::state::state_machine::SessionEvent::StartRequested)
                .unwrap();
            session
                .machine
                .apply(crate::state::state_machine::SessionEvent::Finish(
                    FinishReason::ManualStop,
                ))
                .unwrap();
            session.finished_at = Some(now_ms() - FINISHED_RETENTION_MS - 1);
        }

        sweep(&state).await;
        assert!(state.room(&code).is_none());
    }

    #[tokio::test]
    async fn due_round_deadline_resolves_as_timeout() {
        let state = AppState::new(AppConfig::default());
        let (code, host_id) = seeded(&state).await;
        round_service::start_match(&state, &code, HostActionRequest { host_id })
            .await
            .unwrap();
        {
            let room = state.room(&code).unwrap();
            let mut session = room.session().lock().await;
            if *session.machine.phase() == SessionPhase::Preparing {
                session.preparing_deadline = Some(now_ms() - 1);
            }
        }
        sweep(&state).await;
        {
            let room = state.room(&code).unwrap();
            let mut session = room.session().lock().await;
            session.active.as_mut().unwrap().deadline_at = now_ms() - 1;
        }

        sweep(&state).await;

        let room = state.room(&code).unwrap();
        let session = room.session().lock().await;
        assert!(session.active.is_none());
        assert_eq!(session.history.len(), 1);
        assert!(session.advance_at.is_some());
    }
}
