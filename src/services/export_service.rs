//! Builds the durable match summary and hands it to the configured sink.

use std::time::SystemTime;

use tracing::warn;

use crate::{
    dao::models::{
        HardQuestionEntity, MatchSummary, ParticipantSummaryEntity, RoundRecordEntity,
        TeamScoreEntity, TimelineEntity,
    },
    dto::{format_epoch_ms, format_system_time},
    state::{
        SharedState,
        session::{Participant, RoundTurn, Session, SessionFormat, TeamId},
    },
};

/// Hardest-question rows kept in the summary.
const HARDEST_LIMIT: usize = 3;

/// Project a finished session into its durable summary.
pub fn build_summary(session: &Session) -> MatchSummary {
    let finished_at = session
        .finished_at
        .map(format_epoch_ms)
        .unwrap_or_else(|| format_system_time(SystemTime::now()));

    let team_scores = match session.format() {
        SessionFormat::Teams => vec![
            TeamScoreEntity {
                team: TeamId::A.label().into(),
                points: session.team_scores[TeamId::A.index()],
            },
            TeamScoreEntity {
                team: TeamId::B.label().into(),
                points: session.team_scores[TeamId::B.index()],
            },
        ],
        SessionFormat::FreeForAll => Vec::new(),
    };

    let mut participants: Vec<ParticipantSummaryEntity> = session
        .participants
        .iter()
        .chain(session.departed.iter())
        .map(participant_entity)
        .collect();
    participants.sort_by(|a, b| b.points.cmp(&a.points));

    let rounds = session
        .history
        .iter()
        .map(|entry| RoundRecordEntity {
            id: entry.id.clone(),
            round_index: entry.round_index,
            turn: match entry.turn {
                RoundTurn::Team(team) => format!("team-{}", team.label()),
                RoundTurn::Player(id) => session
                    .participant(id)
                    .map(|p| p.name.clone())
                    .or_else(|| {
                        session
                            .departed
                            .iter()
                            .find(|p| p.id == id)
                            .map(|p| p.name.clone())
                    })
                    .unwrap_or_else(|| id.to_string()),
            },
            prompt: entry.prompt.clone(),
            correct_index: entry.correct_index,
            outcome: entry.outcome.as_str().into(),
            chosen: entry.chosen,
            passed: entry.passed,
            correct: entry.correct,
            points: entry.points,
        })
        .collect();

    let mut missed: Vec<HardQuestionEntity> = session
        .question_stats
        .iter()
        .filter(|(_, stat)| stat.wrong + stat.timeouts > 0)
        .filter_map(|(question_id, stat)| {
            session
                .question_sets
                .iter_all()
                .find(|question| question.id == *question_id)
                .map(|question| HardQuestionEntity {
                    prompt: question.prompt.clone(),
                    wrong: stat.wrong,
                    timeouts: stat.timeouts,
                })
        })
        .collect();
    missed.sort_by(|a, b| (b.wrong + b.timeouts).cmp(&(a.wrong + a.timeouts)));
    missed.truncate(HARDEST_LIMIT);

    let timeline = session
        .timeline
        .iter()
        .map(|entry| TimelineEntity {
            at: entry.at,
            message: entry.message.clone(),
        })
        .collect();

    MatchSummary {
        code: session.code.clone(),
        topic: session.topic.clone(),
        mode: session.mode.as_str().into(),
        packs: session.packs.iter().map(|pack| pack.as_str().into()).collect(),
        provider_label: session.provider_label.clone(),
        finished_at,
        team_scores,
        participants,
        rounds,
        hardest_questions: missed,
        timeline,
    }
}

fn participant_entity(participant: &Participant) -> ParticipantSummaryEntity {
    ParticipantSummaryEntity {
        name: participant.name.clone(),
        team: participant.team.label().into(),
        role: participant.role.label().into(),
        answered: participant.stats.answered,
        correct: participant.stats.correct,
        wrong: participant.stats.wrong,
        timeouts: participant.stats.timeouts,
        passes: participant.stats.passes,
        points: participant.stats.points,
        disqualified: participant.stats.disqualified,
    }
}

/// Store a summary in the background, at most once per session. The marker is
/// released on failure so a later attempt can retry.
pub fn spawn_store(state: &SharedState, summary: MatchSummary) {
    if state
        .exports_in_flight()
        .insert(summary.code.clone(), ())
        .is_some()
    {
        return;
    }

    let state = state.clone();
    tokio::spawn(async move {
        let code = summary.code.clone();
        if let Err(err) = state.sink().store(summary).await {
            warn!(%code, error = %err, "summary export failed");
            state.exports_in_flight().remove(&code);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::{
        GameplayMode, HistoryEntry, OutcomeKind, ParticipantStats, QuestionStat, Role,
        generate_credential, now_ms,
    };
    use uuid::Uuid;

    fn finished_session() -> Session {
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
        s.finished_at = Some(now_ms());
        s.team_scores = [7, 4];
        s.participants.push(Participant {
            id: Uuid::new_v4(),
            name: "quiet".into(),
            role: Role::Player,
            team: TeamId::A,
            credential: generate_credential(24),
            connected: true,
            team_locked: false,
            joined_at: 1,
            stats: ParticipantStats {
                points: 2,
                ..ParticipantStats::default()
            },
        });
        s.departed.push(Participant {
            id: Uuid::new_v4(),
            name: "gone".into(),
            role: Role::Player,
            team: TeamId::B,
            credential: generate_credential(24),
            connected: false,
            team_locked: false,
            joined_at: 2,
            stats: ParticipantStats {
                points: 5,
                ..ParticipantStats::default()
            },
        });
        s.history.push(HistoryEntry {
            id: "round-0-team-A".into(),
            round_index: 0,
            turn: RoundTurn::Team(TeamId::A),
            question_id: Uuid::new_v4(),
            prompt: "Which probe reached Neptune first?".into(),
            correct_index: 0,
            outcome: OutcomeKind::Answer,
            chosen: Some(0),
            passed: false,
            correct: true,
            points: 2,
            resolved_at: now_ms(),
        });
        s
    }

    #[test]
    fn summary_includes_departed_players_ranked_by_points() {
        let summary = build_summary(&finished_session());
        assert_eq!(summary.participants.len(), 2);
        assert_eq!(summary.participants[0].name, "gone");
        assert_eq!(summary.participants[0].points, 5);
        assert_eq!(summary.rounds.len(), 1);
        assert_eq!(summary.team_scores[0].points, 7);
    }

    #[test]
    fn hardest_questions_are_ranked_and_capped() {
        let mut session = finished_session();
        for (index, misses) in [(0u32, 4u32), (1, 1), (2, 3), (3, 2)] {
            let question = crate::state::session::Question {
                id: Uuid::new_v4(),
                prompt: format!("question {index}"),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_index: 0,
                explanation: String::new(),
                difficulty: crate::state::session::Difficulty::Medium,
                image_url: None,
            };
            session.question_stats.insert(
                question.id,
                QuestionStat {
                    correct: 0,
                    wrong: misses,
                    timeouts: 0,
                },
            );
            session.question_sets.team_a.push(question);
        }

        let summary = build_summary(&session);
        assert_eq!(summary.hardest_questions.len(), HARDEST_LIMIT);
        assert_eq!(summary.hardest_questions[0].prompt, "question 0");
        assert_eq!(summary.hardest_questions[1].prompt, "question 2");
    }
}
