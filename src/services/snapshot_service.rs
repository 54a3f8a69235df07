//! Builds the public projection of a session and pushes it onto the room's
//! SSE channel.

use uuid::Uuid;

use crate::{
    dto::{
        snapshot::{
            ActiveRoundView, ParticipantView, QuestionView, RoundResultView, SessionSnapshot,
            TeamScoreView, TimelineView, TurnView, VoteView,
        },
        sse::ServerEvent,
    },
    services::consensus,
    state::{
        SessionRoom,
        session::{
            HistoryEntry, RoundTurn, Session, SessionFormat, TeamId, VoteChoice, now_ms,
        },
        state_machine::SessionPhase,
    },
};

/// Timeline rows kept in a snapshot; the full log lives in the export.
const TIMELINE_TAIL: usize = 30;

/// Build the snapshot of a session. `viewer` personalizes the result with
/// that participant's own vote; broadcasts pass `None`.
pub fn snapshot(session: &Session, viewer: Option<Uuid>) -> SessionSnapshot {
    let phase = session.machine.phase();
    let (pause_reason, finish_reason) = match phase {
        SessionPhase::Paused(reason) => (Some(reason.label().to_string()), None),
        SessionPhase::Finished(reason) => (None, Some(reason.label().to_string())),
        _ => (None, None),
    };

    let team_scores = match session.format() {
        SessionFormat::Teams => vec![
            TeamScoreView {
                team: TeamId::A.label().into(),
                score: session.team_scores[TeamId::A.index()],
            },
            TeamScoreView {
                team: TeamId::B.label().into(),
                score: session.team_scores[TeamId::B.index()],
            },
        ],
        SessionFormat::FreeForAll => Vec::new(),
    };

    let participants = session
        .participants
        .iter()
        .map(|participant| ParticipantView {
            id: participant.id,
            name: participant.name.clone(),
            role: participant.role.label().into(),
            team: participant.team.label().into(),
            connected: participant.connected,
            disqualified: participant.stats.disqualified,
            points: participant.stats.points,
            streak: participant.stats.streak,
        })
        .collect();

    let round = active_round_view(session);
    let my_vote = viewer.and_then(|id| vote_view(session, id));

    let last_result = session
        .history
        .last()
        .filter(|_| session.active.is_none())
        .map(|entry| result_view(session, entry));

    let timeline = session
        .timeline
        .iter()
        .rev()
        .take(TIMELINE_TAIL)
        .rev()
        .map(|entry| TimelineView {
            at: entry.at,
            message: entry.message.clone(),
        })
        .collect();

    SessionSnapshot {
        code: session.code.clone(),
        topic: session.topic.clone(),
        mode: session.mode.as_str().into(),
        packs: session.packs.iter().map(|pack| pack.as_str().into()).collect(),
        phase: phase.label().into(),
        pause_reason,
        finish_reason,
        question_count: session.question_count,
        round_duration_ms: session.round_duration_ms,
        provider_label: session.provider_label.clone(),
        team_scores,
        participants,
        round,
        last_result,
        timeline,
        my_vote,
    }
}

/// Serialize and push the viewer-generic snapshot onto the room's channel.
pub fn broadcast(room: &SessionRoom, session: &Session) {
    if let Ok(event) = ServerEvent::json(Some("state".to_string()), &snapshot(session, None)) {
        room.hub().broadcast(event);
    }
}

fn active_round_view(session: &Session) -> Option<ActiveRoundView> {
    let active = session.active.as_ref()?;
    let slot = session.current_slot()?;
    let question = session.question_for_slot(slot)?;

    let electorate = match slot.turn {
        RoundTurn::Team(team) => session.eligible_voters(team).len(),
        RoundTurn::Player(_) => 1,
    };
    let (tallies, passes) = consensus::tally_counts(&active.votes);

    Some(ActiveRoundView {
        index: session.current_round,
        total: session.plan.len(),
        turn: turn_view(session, slot.turn),
        question: QuestionView {
            prompt: question.prompt.clone(),
            options: question.options.clone(),
            difficulty: question.difficulty.as_str().into(),
            image_url: question.image_url.clone(),
        },
        remaining_ms: session
            .paused_remaining_ms
            .unwrap_or_else(|| active.remaining_ms(now_ms())),
        tallies: tallies.to_vec(),
        passes,
        votes_cast: active.votes.len(),
        electorate,
    })
}

fn turn_view(session: &Session, turn: RoundTurn) -> TurnView {
    match turn {
        RoundTurn::Team(team) => TurnView {
            kind: "team".into(),
            team: Some(team.label().into()),
            player_id: None,
            player_name: None,
        },
        RoundTurn::Player(id) => TurnView {
            kind: "player".into(),
            team: None,
            player_id: Some(id),
            player_name: session
                .participant(id)
                .map(|participant| participant.name.clone()),
        },
    }
}

fn result_view(session: &Session, entry: &HistoryEntry) -> RoundResultView {
    let explanation = session
        .question_sets
        .iter_all()
        .find(|question| question.id == entry.question_id)
        .map(|question| question.explanation.clone())
        .unwrap_or_default();

    RoundResultView {
        id: entry.id.clone(),
        index: entry.round_index,
        turn: turn_view(session, entry.turn),
        prompt: entry.prompt.clone(),
        correct_index: entry.correct_index,
        chosen: entry.chosen,
        passed: entry.passed,
        correct: entry.correct,
        outcome: entry.outcome.as_str().into(),
        points: entry.points,
        explanation,
    }
}

fn vote_view(session: &Session, viewer: Uuid) -> Option<VoteView> {
    let active = session.active.as_ref()?;
    let vote = active.votes.get(&viewer)?;
    Some(match vote.choice {
        VoteChoice::Option(index) => VoteView {
            option_index: Some(index),
            pass: false,
        },
        VoteChoice::Pass => VoteView {
            option_index: None,
            pass: true,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::round_service,
        state::{
            session::{
                Difficulty, GameplayMode, Participant, ParticipantStats, Question, QuestionSets,
                Role, Vote, generate_credential,
            },
            state_machine::SessionEvent,
        },
    };

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
        round_service::start_round(&mut s);
        s
    }

    #[test]
    fn active_round_view_carries_the_vote_tally() {
        let mut s = running_team_session();
        let voters = s.eligible_voters(TeamId::A);
        let deadline = s.active.as_ref().unwrap().deadline_at;
        let votes = &mut s.active.as_mut().unwrap().votes;
        votes.insert(
            voters[0],
            Vote {
                choice: VoteChoice::Option(2),
                submitted_at: deadline - 20_000,
            },
        );
        votes.insert(
            voters[1],
            Vote {
                choice: VoteChoice::Pass,
                submitted_at: deadline - 19_000,
            },
        );

        let view = snapshot(&s, None).round.expect("round is live");
        assert_eq!(view.tallies, vec![0, 0, 1, 0]);
        assert_eq!(view.passes, 1);
        assert_eq!(view.votes_cast, 2);
        assert_eq!(view.electorate, 2);
    }

    #[test]
    fn broadcast_snapshot_never_carries_a_personal_vote() {
        let mut s = running_team_session();
        let voters = s.eligible_voters(TeamId::A);
        s.active.as_mut().unwrap().votes.insert(
            voters[0],
            Vote {
                choice: VoteChoice::Option(1),
                submitted_at: now_ms(),
            },
        );

        assert!(snapshot(&s, None).my_vote.is_none());
        let personal = snapshot(&s, Some(voters[0])).my_vote.expect("own vote");
        assert_eq!(personal.option_index, Some(1));
    }
}
