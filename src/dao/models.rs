use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Durable representation of a finished match handed to the summary sink.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MatchSummary {
    /// Join code the match ran under.
    pub code: String,
    /// Topic the questions were generated from.
    pub topic: String,
    /// Gameplay mode identifier.
    pub mode: String,
    /// Selected content packs.
    pub packs: Vec<String>,
    /// Label of the backend that produced the question sets.
    pub provider_label: Option<String>,
    /// RFC3339 completion timestamp.
    pub finished_at: String,
    /// Final team totals.
    pub team_scores: Vec<TeamScoreEntity>,
    /// Per-participant final statistics.
    pub participants: Vec<ParticipantSummaryEntity>,
    /// Every resolved round in order.
    pub rounds: Vec<RoundRecordEntity>,
    /// Questions ranked by how often they were missed.
    pub hardest_questions: Vec<HardQuestionEntity>,
    /// Human-readable match log.
    pub timeline: Vec<TimelineEntity>,
}

/// Final score for one side.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TeamScoreEntity {
    /// Side label (`A`/`B`).
    pub team: String,
    /// Accumulated points.
    pub points: u32,
}

/// Final statistics for one participant.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ParticipantSummaryEntity {
    /// Display name.
    pub name: String,
    /// Side label.
    pub team: String,
    /// `host` or `player`.
    pub role: String,
    /// Rounds with a submission.
    pub answered: u32,
    /// Correct own choices.
    pub correct: u32,
    /// Wrong own choices.
    pub wrong: u32,
    /// Rounds lost to the deadline.
    pub timeouts: u32,
    /// Explicit passes.
    pub passes: u32,
    /// Accumulated points.
    pub points: u32,
    /// Whether the host removed this participant.
    pub disqualified: bool,
}

/// One resolved round as recorded in history.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoundRecordEntity {
    /// Stable history id.
    pub id: String,
    /// Index in the round plan.
    pub round_index: usize,
    /// Whose turn it was (`team-A` or a participant name).
    pub turn: String,
    /// Prompt text.
    pub prompt: String,
    /// Correct option index.
    pub correct_index: usize,
    /// `answer`, `timeout`, or `skip`.
    pub outcome: String,
    /// Winning or submitted option, if any.
    pub chosen: Option<usize>,
    /// Whether the decision was an explicit pass.
    pub passed: bool,
    /// Whether the chosen option was correct.
    pub correct: bool,
    /// Points the round awarded.
    pub points: u32,
}

/// A question and how often it was missed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HardQuestionEntity {
    /// Prompt text.
    pub prompt: String,
    /// Wrong outcomes.
    pub wrong: u32,
    /// Timeout outcomes.
    pub timeouts: u32,
}

/// One timeline message.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TimelineEntity {
    /// Epoch milliseconds.
    pub at: u64,
    /// Message text.
    pub message: String,
}
