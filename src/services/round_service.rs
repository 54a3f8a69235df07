//! Round scheduling: match start, vote intake, resolution, the review
//! window, and the host's pause/resume/skip controls. Every mutation here
//! happens under the session lock; deadline enforcement lives in the sweeper.

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dto::session::{HostActionRequest, VoteRequest},
    error::ServiceError,
    generator::{self, GenerationOutcome, GenerationRequest},
    services::{
        consensus::{self, TallyDecision},
        export_service, scoring,
        scoring::ScoreInput,
        session_service::{require_host, require_room},
        snapshot_service,
    },
    state::{
        SharedState,
        session::{
            ActiveRound, ContentPack, GameplayMode, HistoryEntry, OutcomeKind, QuestionStat, Role,
            RoundTurn, Session, SessionFormat, TeamId, Vote, VoteChoice, now_ms,
        },
        state_machine::{FinishReason, PauseReason, SessionEvent, SessionPhase},
    },
};

/// What prompted a round resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResolveTrigger {
    /// Every eligible voter submitted.
    Completed,
    /// The deadline elapsed (or the electorate emptied out).
    Deadline,
    /// The host skipped the round.
    Skip,
}

/// Start the match: validate the roster, enter the preparing phase, and kick
/// off question generation in the background.
pub async fn start_match(
    state: &SharedState,
    code: &str,
    payload: HostActionRequest,
) -> Result<(), ServiceError> {
    let room = require_room(state, code)?;
    let mut session = room.session().lock().await;
    require_host(&session, payload.host_id)?;
    roster_ready(&session)?;

    session.machine.apply(SessionEvent::StartRequested)?;
    session.generation_id += 1;
    session.preparing_deadline = Some(now_ms() + state.config().generation_timeout.as_millis() as u64);
    let announce = format!("generating questions about \"{}\"", session.topic);
    session.push_timeline(announce);
    info!(code, topic = %session.topic, "match start requested");

    let request = GenerationRequest {
        topic: session.topic.clone(),
        count: session.question_count,
        tone: session.tone.clone(),
        ai_mode: session.ai_mode,
        two_teams: session.format() == SessionFormat::Teams,
    };
    let expected = session.generation_id;
    snapshot_service::broadcast(&room, &session);
    drop(session);

    let state = state.clone();
    let code = code.to_string();
    tokio::spawn(async move {
        let outcome = generator::generate(&state, request).await;
        let Some(room) = state.room(&code) else {
            return;
        };
        let mut session = room.session().lock().await;
        if apply_generation(&mut session, expected, outcome) {
            snapshot_service::broadcast(&room, &session);
        }
    });

    Ok(())
}

/// Install freshly generated question sets and start the first round.
///
/// Returns false when the result is stale (a newer generation was kicked
/// off) or the session has moved out of the preparing phase.
pub(crate) fn apply_generation(
    session: &mut Session,
    expected_generation: u64,
    outcome: GenerationOutcome,
) -> bool {
    if session.generation_id != expected_generation
        || *session.machine.phase() != SessionPhase::Preparing
    {
        debug!(code = %session.code, "dropping stale generation result");
        return false;
    }

    session.question_sets = outcome.sets;
    session.provider_label = Some(outcome.provider_label.clone());
    session.preparing_deadline = None;
    session.build_round_plan();
    if session.machine.apply(SessionEvent::QuestionsReady).is_err() {
        return false;
    }
    session.push_timeline(format!("questions ready via {}", outcome.provider_label));
    start_round(session);
    true
}

/// Go live with the round the plan currently points at.
pub(crate) fn start_round(session: &mut Session) {
    let now = now_ms();
    session.advance_at = None;
    session.paused_remaining_ms = None;
    session.active = Some(ActiveRound {
        started_at: now,
        deadline_at: now + session.round_duration_ms,
        duration_ms: session.round_duration_ms,
        votes: Default::default(),
    });
}

/// Accept one vote for the current round. Votes are immutable; consensus is
/// checked after every team submission.
pub async fn submit_vote(
    state: &SharedState,
    code: &str,
    payload: VoteRequest,
) -> Result<(), ServiceError> {
    let room = require_room(state, code)?;
    let mut session = room.session().lock().await;

    if *session.machine.phase() != SessionPhase::Running {
        return Err(ServiceError::InvalidState("no round is running".into()));
    }
    let Some(slot) = session.current_slot() else {
        return Err(ServiceError::InvalidState("no round is running".into()));
    };
    if session.active.is_none() {
        return Err(ServiceError::InvalidState(
            "round is in its review window".into(),
        ));
    }

    let choice = match (payload.option_index, payload.pass) {
        (Some(_), true) => {
            return Err(ServiceError::InvalidInput(
                "choose an option or pass, not both".into(),
            ));
        }
        (Some(index), false) if index < 4 => VoteChoice::Option(index),
        (Some(_), false) => {
            return Err(ServiceError::InvalidInput("option index out of range".into()));
        }
        (None, true) => VoteChoice::Pass,
        (None, false) => {
            return Err(ServiceError::InvalidInput("empty vote".into()));
        }
    };
    if choice == VoteChoice::Pass && !session.mode.profile().allow_pass {
        return Err(ServiceError::InvalidInput(
            "passing is disabled in this mode".into(),
        ));
    }

    let voter = session
        .participant(payload.participant_id)
        .ok_or_else(|| ServiceError::NotFound("participant not found".into()))?;
    if voter.role != Role::Player {
        return Err(ServiceError::InvalidInput("the host does not vote".into()));
    }
    if !voter.connected || voter.stats.disqualified {
        return Err(ServiceError::InvalidState("seat is not eligible".into()));
    }
    match slot.turn {
        RoundTurn::Team(team) if voter.team != team => {
            return Err(ServiceError::InvalidState("not this team's turn".into()));
        }
        RoundTurn::Player(id) if payload.participant_id != id => {
            return Err(ServiceError::InvalidState("not this player's turn".into()));
        }
        _ => {}
    }

    let now = now_ms();
    {
        let active = session.active.as_mut().ok_or_else(|| {
            ServiceError::InvalidState("no round is running".into())
        })?;
        if active.deadline_at <= now {
            return Err(ServiceError::InvalidState("round deadline has passed".into()));
        }
        if active.votes.contains_key(&payload.participant_id) {
            return Err(ServiceError::InvalidInput("vote already submitted".into()));
        }
        active.votes.insert(
            payload.participant_id,
            Vote {
                choice,
                submitted_at: now,
            },
        );
    }

    match slot.turn {
        RoundTurn::Team(team) => {
            let eligible = session.eligible_voters(team);
            let all_voted = session
                .active
                .as_ref()
                .is_some_and(|active| eligible.iter().all(|id| active.votes.contains_key(id)));
            if all_voted {
                resolve_active_round(&mut session, ResolveTrigger::Completed);
            }
        }
        // A free-for-all turn has a single voter; their submission decides it.
        RoundTurn::Player(_) => resolve_active_round(&mut session, ResolveTrigger::Completed),
    }

    snapshot_service::broadcast(&room, &session);
    Ok(())
}

/// Resolve the active round: tally, score, record history, and open the
/// review window. Idempotent; a second call finds no active round.
pub(crate) fn resolve_active_round(session: &mut Session, trigger: ResolveTrigger) {
    let Some(active) = session.active.take() else {
        return;
    };
    let Some(slot) = session.current_slot() else {
        return;
    };
    let Some(question) = session.question_for_slot(slot).cloned() else {
        return;
    };
    let now = now_ms();

    let (outcome, chosen, passed) = match trigger {
        ResolveTrigger::Skip => (OutcomeKind::Skip, None, false),
        _ => match slot.turn {
            RoundTurn::Team(_) => match consensus::decide(&active.votes) {
                TallyDecision::Timeout => (OutcomeKind::Timeout, None, false),
                TallyDecision::Pass => (OutcomeKind::Answer, None, true),
                TallyDecision::Option(index) => (OutcomeKind::Answer, Some(index), false),
            },
            RoundTurn::Player(id) => match active.votes.get(&id) {
                None => (OutcomeKind::Timeout, None, false),
                Some(vote) => match vote.choice {
                    VoteChoice::Pass => (OutcomeKind::Answer, None, true),
                    VoteChoice::Option(index) => (OutcomeKind::Answer, Some(index), false),
                },
            },
        },
    };
    let correct = chosen == Some(question.correct_index);

    // Speed bonuses key off when the deciding submission arrived; forced
    // resolutions score as if the clock had run out.
    let remaining_ms = if trigger == ResolveTrigger::Completed {
        let last_vote = active
            .votes
            .values()
            .map(|vote| vote.submitted_at)
            .max()
            .unwrap_or(now);
        active.deadline_at.saturating_sub(last_vote)
    } else {
        0
    };

    let streak = match slot.turn {
        RoundTurn::Player(id) => session
            .participant(id)
            .map(|p| p.stats.streak + 1)
            .unwrap_or(1),
        RoundTurn::Team(_) => 1,
    };
    let points = if correct {
        scoring::points_for_correct(ScoreInput {
            mode: session.mode,
            expert_pack: session.has_pack(ContentPack::Expert),
            speed_enabled: session.speed_bonus_enabled(),
            difficulty: question.difficulty,
            remaining_ms,
            duration_ms: active.duration_ms,
            streak,
        })
    } else {
        0
    };

    apply_round_stats(session, slot.turn, &active, &question, outcome, correct, points);

    if correct
        && let RoundTurn::Team(team) = slot.turn
    {
        session.team_scores[team.index()] += points;
    }

    let id = match slot.turn {
        RoundTurn::Team(team) => format!("round-{}-team-{}", session.current_round, team.label()),
        RoundTurn::Player(player) => format!("round-{}-player-{}", session.current_round, player),
    };
    let entry = HistoryEntry {
        id: id.clone(),
        round_index: session.current_round,
        turn: slot.turn,
        question_id: question.id,
        prompt: question.prompt.clone(),
        correct_index: question.correct_index,
        outcome,
        chosen,
        passed,
        correct,
        points,
        resolved_at: now,
    };
    match session.history.iter().position(|existing| existing.id == id) {
        Some(position) => session.history[position] = entry,
        None => session.history.push(entry),
    }

    let stat = session.question_stats.entry(question.id).or_insert(QuestionStat::default());
    if correct {
        stat.correct += 1;
    } else if matches!(outcome, OutcomeKind::Timeout | OutcomeKind::Skip) {
        stat.timeouts += 1;
    } else {
        stat.wrong += 1;
    }

    session.push_timeline(match outcome {
        OutcomeKind::Skip => format!("round {} skipped by the host", session.current_round + 1),
        OutcomeKind::Timeout => format!("round {} timed out", session.current_round + 1),
        OutcomeKind::Answer if passed => {
            format!("round {} passed", session.current_round + 1)
        }
        OutcomeKind::Answer if correct => format!(
            "round {} answered correctly for {points} points",
            session.current_round + 1
        ),
        OutcomeKind::Answer => format!("round {} answered wrong", session.current_round + 1),
    });

    let delay = scoring::review_delay_ms(
        question.prompt.chars().count(),
        question.explanation.chars().count(),
        outcome,
        correct,
        passed,
    );
    session.advance_at = Some(now + delay);
}

fn apply_round_stats(
    session: &mut Session,
    turn: RoundTurn,
    active: &ActiveRound,
    question: &crate::state::session::Question,
    outcome: OutcomeKind,
    round_correct: bool,
    points: u32,
) {
    let correct_index = question.correct_index;

    match turn {
        RoundTurn::Team(team) => {
            let eligible = session.eligible_voters(team);
            for (voter_id, vote) in &active.votes {
                let Some(participant) = session.participant_mut(*voter_id) else {
                    continue;
                };
                participant.stats.answered += 1;
                match vote.choice {
                    VoteChoice::Option(index) if index == correct_index => {
                        participant.stats.correct += 1;
                        participant.stats.streak += 1;
                        if round_correct {
                            participant.stats.points += points;
                        }
                    }
                    VoteChoice::Option(_) => {
                        participant.stats.wrong += 1;
                        participant.stats.streak = 0;
                    }
                    VoteChoice::Pass => {
                        participant.stats.passes += 1;
                        participant.stats.streak = 0;
                    }
                }
            }
            for voter_id in eligible {
                if !active.votes.contains_key(&voter_id)
                    && let Some(participant) = session.participant_mut(voter_id)
                {
                    participant.stats.timeouts += 1;
                    participant.stats.streak = 0;
                }
            }
        }
        RoundTurn::Player(id) => {
            let Some(participant) = session.participant_mut(id) else {
                return;
            };
            match outcome {
                OutcomeKind::Timeout | OutcomeKind::Skip => {
                    participant.stats.timeouts += 1;
                    participant.stats.streak = 0;
                }
                OutcomeKind::Answer => {
                    participant.stats.answered += 1;
                    match active.votes.get(&id).map(|vote| vote.choice) {
                        Some(VoteChoice::Option(index)) if index == correct_index => {
                            participant.stats.correct += 1;
                            participant.stats.streak += 1;
                            participant.stats.points += points;
                        }
                        Some(VoteChoice::Option(_)) => {
                            participant.stats.wrong += 1;
                            participant.stats.streak = 0;
                        }
                        _ => {
                            participant.stats.passes += 1;
                            participant.stats.streak = 0;
                        }
                    }
                }
            }
        }
    }
}

/// Advance past the resolved round: start the next one, park the session
/// when its question is missing, or finish the match.
pub(crate) fn advance_round(state: &SharedState, session: &mut Session) {
    session.advance_at = None;
    session.current_round += 1;

    if session.current_round >= session.plan.len() {
        finish_session(state, session, FinishReason::PlanCompleted);
        return;
    }

    let playable = session
        .current_slot()
        .and_then(|slot| session.question_for_slot(slot))
        .is_some();
    if playable {
        start_round(session);
    } else {
        // No material for this slot; hold the match for the host.
        if session
            .machine
            .apply(SessionEvent::Pause(PauseReason::MissingQuestion))
            .is_ok()
        {
            session.paused_remaining_ms = Some(session.round_duration_ms);
            session.push_timeline(format!(
                "round {} parked: question unavailable",
                session.current_round + 1
            ));
        }
    }
}

/// Terminate the match and export its summary.
pub(crate) fn finish_session(state: &SharedState, session: &mut Session, reason: FinishReason) {
    if session.machine.apply(SessionEvent::Finish(reason)).is_err() {
        return;
    }
    session.finished_at = Some(now_ms());
    session.active = None;
    session.advance_at = None;
    session.preparing_deadline = None;
    session.push_timeline(match reason {
        FinishReason::PlanCompleted => "match finished".to_string(),
        FinishReason::ManualStop => "match stopped by the host".to_string(),
    });
    info!(code = %session.code, reason = reason.label(), "session finished");
    export_service::spawn_store(state, export_service::build_summary(session));
}

/// Host control: suspend the running round, preserving the remaining clock.
pub async fn pause(
    state: &SharedState,
    code: &str,
    payload: HostActionRequest,
) -> Result<(), ServiceError> {
    let room = require_room(state, code)?;
    let mut session = room.session().lock().await;
    require_host(&session, payload.host_id)?;

    session
        .machine
        .apply(SessionEvent::Pause(PauseReason::HostRequest))?;
    let now = now_ms();
    session.paused_remaining_ms = Some(match (&session.active, session.advance_at) {
        (Some(active), _) => active.remaining_ms(now),
        (None, Some(at)) => at.saturating_sub(now),
        (None, None) => session.round_duration_ms,
    });
    session.advance_at = None;
    session.push_timeline("match paused by the host");
    snapshot_service::broadcast(&room, &session);
    Ok(())
}

/// Host control: resume a paused session, restoring the preserved clock.
/// Resuming a round parked for a missing question skips past it.
pub async fn resume(
    state: &SharedState,
    code: &str,
    payload: HostActionRequest,
) -> Result<(), ServiceError> {
    let room = require_room(state, code)?;
    let mut session = room.session().lock().await;
    require_host(&session, payload.host_id)?;

    let reason = match session.machine.phase() {
        SessionPhase::Paused(reason) => *reason,
        _ => return Err(ServiceError::InvalidState("session is not paused".into())),
    };
    session.machine.apply(SessionEvent::Resume)?;
    session.host_grace_deadline = None;
    let remaining = session.paused_remaining_ms.take();
    let now = now_ms();

    match reason {
        PauseReason::MissingQuestion => {
            advance_round(state, &mut session);
            session.push_timeline("parked round skipped");
        }
        PauseReason::HostRequest | PauseReason::HostDisconnected => {
            if let Some(active) = session.active.as_mut() {
                active.deadline_at = now + remaining.unwrap_or(active.duration_ms);
            } else if session.current_round < session.plan.len() {
                session.advance_at = Some(now + remaining.unwrap_or(0));
            }
            session.push_timeline("match resumed");
        }
    }
    snapshot_service::broadcast(&room, &session);
    Ok(())
}

/// Host control: skip the current round (or cut the review window short).
pub async fn skip(
    state: &SharedState,
    code: &str,
    payload: HostActionRequest,
) -> Result<(), ServiceError> {
    let room = require_room(state, code)?;
    let mut session = room.session().lock().await;
    require_host(&session, payload.host_id)?;

    if *session.machine.phase() != SessionPhase::Running {
        return Err(ServiceError::InvalidState("no round to skip".into()));
    }
    if session.active.is_some() {
        resolve_active_round(&mut session, ResolveTrigger::Skip);
    } else if session.advance_at.is_some() {
        advance_round(state, &mut session);
    } else {
        return Err(ServiceError::InvalidState("no round to skip".into()));
    }
    snapshot_service::broadcast(&room, &session);
    Ok(())
}

/// Re-check the current round after the electorate shrank (disconnect,
/// departure, or disqualification).
pub(crate) fn on_roster_shrunk(session: &mut Session) {
    if *session.machine.phase() != SessionPhase::Running || session.active.is_none() {
        return;
    }
    let Some(slot) = session.current_slot() else {
        return;
    };

    match slot.turn {
        RoundTurn::Team(team) => {
            let eligible = session.eligible_voters(team);
            let votes_cast = session
                .active
                .as_ref()
                .map(|active| active.votes.len())
                .unwrap_or(0);
            if eligible.is_empty() {
                // Whatever was cast before the seats emptied decides it.
                resolve_active_round(session, ResolveTrigger::Deadline);
            } else if votes_cast > 0
                && eligible.iter().all(|id| {
                    session
                        .active
                        .as_ref()
                        .is_some_and(|active| active.votes.contains_key(id))
                })
            {
                resolve_active_round(session, ResolveTrigger::Completed);
            }
        }
        RoundTurn::Player(id) => {
            let gone = session
                .participant(id)
                .map(|p| !p.connected || p.stats.disqualified)
                .unwrap_or(true);
            if gone {
                resolve_active_round(session, ResolveTrigger::Deadline);
            }
        }
    }
}

fn roster_ready(session: &Session) -> Result<(), ServiceError> {
    let size_a = session.team_size(TeamId::A);
    let size_b = session.team_size(TeamId::B);
    match session.format() {
        SessionFormat::Teams if session.mode == GameplayMode::Duel => {
            if size_a != 1 || size_b != 1 {
                return Err(ServiceError::InvalidInput(
                    "a duel needs exactly one player per side".into(),
                ));
            }
        }
        SessionFormat::Teams => {
            if size_a == 0 || size_b == 0 {
                return Err(ServiceError::InvalidInput(
                    "both teams need at least one player".into(),
                ));
            }
        }
        SessionFormat::FreeForAll => {
            if size_a + size_b == 0 {
                return Err(ServiceError::InvalidInput(
                    "at least one player is required".into(),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::{
        Difficulty, Participant, ParticipantStats, Question, QuestionSets, generate_credential,
    };

    struct NullSink;

    impl crate::dao::sink::SummarySink for NullSink {
        fn store(
            &self,
            _summary: crate::dao::models::MatchSummary,
        ) -> futures::future::BoxFuture<'static, crate::dao::sink::SinkResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn question(prompt: &str, correct: usize) -> Question {
        Question {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_index: correct,
            explanation: "short explanation".into(),
            difficulty: Difficulty::Medium,
            image_url: None,
        }
    }

    fn player(name: &str, team: TeamId) -> Participant {
        Participant {
            id: Uuid::new_v4(),
            name: name.into(),
            role: Role::Player,
            team,
            credential: generate_credential(24),
            connected: true,
            team_locked: false,
            joined_at: now_ms(),
            stats: ParticipantStats::default(),
        }
    }

    fn running_team_session() -> Session {
        let mut s = Session::new(
            "ABC234".into(),
            "space probes".into(),
            GameplayMode::TeamBattle,
            Vec::new(),
            None,
            crate::generator::providers::AiMode::Synthetic,
            None,
            5,
            30,
        );
        s.participants.push(player("a1", TeamId::A));
        s.participants.push(player("a2", TeamId::A));
        s.participants.push(player("b1", TeamId::B));
        s.question_sets = QuestionSets {
            team_a: (0..5).map(|i| question(&format!("qa{i}"), 0)).collect(),
            team_b: (0..5).map(|i| question(&format!("qb{i}"), 0)).collect(),
        };
        s.machine.apply(SessionEvent::StartRequested).unwrap();
        s.build_round_plan();
        s.machine.apply(SessionEvent::QuestionsReady).unwrap();
        start_round(&mut s);
        s
    }

    fn vote(session: &mut Session, voter: Uuid, choice: VoteChoice, at: u64) {
        session
            .active
            .as_mut()
            .unwrap()
            .votes
            .insert(voter, Vote { choice, submitted_at: at });
    }

    #[test]
    fn correct_consensus_scores_the_team_and_opens_review() {
        let mut s = running_team_session();
        let voters = s.eligible_voters(TeamId::A);
        let deadline = s.active.as_ref().unwrap().deadline_at;
        for voter in &voters {
            vote(&mut s, *voter, VoteChoice::Option(0), deadline - 25_000);
        }

        resolve_active_round(&mut s, ResolveTrigger::Completed);

        assert!(s.active.is_none());
        assert!(s.advance_at.is_some());
        assert!(s.team_scores[0] >= 1);
        assert_eq!(s.history.len(), 1);
        assert_eq!(s.history[0].id, "round-0-team-A");
        assert!(s.history[0].correct);
        let voter = s.participant(voters[0]).unwrap();
        assert_eq!(voter.stats.correct, 1);
        assert_eq!(voter.stats.streak, 1);
    }

    #[test]
    fn resolution_is_idempotent() {
        let mut s = running_team_session();
        resolve_active_round(&mut s, ResolveTrigger::Deadline);
        let history_len = s.history.len();
        resolve_active_round(&mut s, ResolveTrigger::Deadline);
        assert_eq!(s.history.len(), history_len);
    }

    #[test]
    fn deadline_without_votes_is_a_timeout() {
        let mut s = running_team_session();
        let voters = s.eligible_voters(TeamId::A);
        resolve_active_round(&mut s, ResolveTrigger::Deadline);

        assert_eq!(s.history[0].outcome, OutcomeKind::Timeout);
        assert_eq!(s.team_scores, [0, 0]);
        let voter = s.participant(voters[0]).unwrap();
        assert_eq!(voter.stats.timeouts, 1);
    }

    #[test]
    fn deadline_with_partial_votes_tallies_them() {
        let mut s = running_team_session();
        let voters = s.eligible_voters(TeamId::A);
        let deadline = s.active.as_ref().unwrap().deadline_at;
        vote(&mut s, voters[0], VoteChoice::Option(0), deadline - 1_000);

        resolve_active_round(&mut s, ResolveTrigger::Deadline);

        assert_eq!(s.history[0].outcome, OutcomeKind::Answer);
        assert!(s.history[0].correct);
        // Forced resolutions never earn the speed bonus.
        assert_eq!(s.history[0].points, 1);
    }

    #[test]
    fn skip_awards_nothing_and_shortens_review() {
        let mut s = running_team_session();
        resolve_active_round(&mut s, ResolveTrigger::Skip);

        assert_eq!(s.history[0].outcome, OutcomeKind::Skip);
        assert_eq!(s.history[0].points, 0);
        let delay = s.advance_at.unwrap() - now_ms();
        assert!(delay <= 4_200);
    }

    #[tokio::test]
    async fn advancing_past_the_plan_finishes_the_match() {
        let config = crate::config::AppConfig::default();
        let state = crate::state::AppState::with_sink(config, std::sync::Arc::new(NullSink));
        let mut s = running_team_session();
        s.current_round = s.plan.len() - 1;
        resolve_active_round(&mut s, ResolveTrigger::Deadline);

        advance_round(&state, &mut s);
        assert!(matches!(
            s.machine.phase(),
            SessionPhase::Finished(FinishReason::PlanCompleted)
        ));
        assert!(s.finished_at.is_some());
    }

    #[test]
    fn missing_question_parks_the_session() {
        let config = crate::config::AppConfig::default();
        let state = crate::state::AppState::new(config);
        let mut s = running_team_session();
        s.question_sets.team_b.clear();
        resolve_active_round(&mut s, ResolveTrigger::Deadline);

        // Round 1 is team B's turn and its set is empty.
        advance_round(&state, &mut s);
        assert_eq!(
            *s.machine.phase(),
            SessionPhase::Paused(PauseReason::MissingQuestion)
        );
    }

    #[test]
    fn roster_shrink_resolves_a_waiting_team_round() {
        let mut s = running_team_session();
        let voters = s.eligible_voters(TeamId::A);
        let deadline = s.active.as_ref().unwrap().deadline_at;
        vote(&mut s, voters[0], VoteChoice::Option(0), deadline - 5_000);

        // The other team A player drops; the cast vote now covers everyone.
        s.participant_mut(voters[1]).unwrap().connected = false;
        on_roster_shrunk(&mut s);

        assert!(s.active.is_none());
        assert!(s.history[0].correct);
    }
}
