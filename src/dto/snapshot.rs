//! Public projection of a running session, shared by the REST snapshot
//! endpoint and the per-room SSE stream.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Full state view of a session at one instant.
///
/// The broadcast variant is viewer-generic: it carries vote tallies but never
/// individual choices. `my_vote` is only populated on the REST endpoint when
/// the caller identifies itself.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionSnapshot {
    /// Join code.
    pub code: String,
    /// Session topic.
    pub topic: String,
    /// Gameplay mode identifier.
    pub mode: String,
    /// Selected content-pack identifiers.
    pub packs: Vec<String>,
    /// Lifecycle phase label.
    pub phase: String,
    /// Why the session is paused, when it is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause_reason: Option<String>,
    /// Why the session finished, once it has.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Questions per team set.
    pub question_count: usize,
    /// Effective per-round duration in milliseconds.
    pub round_duration_ms: u64,
    /// Label of the backend that produced the question sets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_label: Option<String>,
    /// Team score totals.
    pub team_scores: Vec<TeamScoreView>,
    /// Current roster, including disconnected seats still within grace.
    pub participants: Vec<ParticipantView>,
    /// The running round, while one is live.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<ActiveRoundView>,
    /// The most recently resolved round, shown during the review window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<RoundResultView>,
    /// Human-readable match log.
    pub timeline: Vec<TimelineView>,
    /// The caller's own vote in the current round, REST-only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_vote: Option<VoteView>,
}

/// Score total for one side.
#[derive(Debug, Serialize, ToSchema)]
pub struct TeamScoreView {
    /// Side label.
    pub team: String,
    /// Accumulated points.
    pub score: u32,
}

/// Roster row in a snapshot.
#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantView {
    /// Participant id.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// `host` or `player`.
    pub role: String,
    /// Side label.
    pub team: String,
    /// Whether a transport is currently attached.
    pub connected: bool,
    /// Whether the host removed this participant mid-match.
    pub disqualified: bool,
    /// Individual points.
    pub points: u32,
    /// Current consecutive-correct streak.
    pub streak: u32,
}

/// The live round as viewers see it.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActiveRoundView {
    /// Zero-based index into the round plan.
    pub index: usize,
    /// Total rounds in the plan.
    pub total: usize,
    /// Whose turn it is.
    pub turn: TurnView,
    /// The question being asked. The correct index is never exposed here.
    pub question: QuestionView,
    /// Milliseconds left on the round clock.
    pub remaining_ms: u64,
    /// Votes cast so far per option, without individual choices.
    pub tallies: Vec<u32>,
    /// Explicit passes cast so far.
    pub passes: u32,
    /// Votes submitted so far, without individual choices.
    pub votes_cast: usize,
    /// Number of participants eligible to vote this round.
    pub electorate: usize,
}

/// Turn owner in a snapshot.
#[derive(Debug, Serialize, ToSchema)]
pub struct TurnView {
    /// `team` or `player`.
    pub kind: String,
    /// Side label for team turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    /// Player id for free-for-all turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_id: Option<Uuid>,
    /// Player display name for free-for-all turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
}

/// A question as shown while its round is live.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuestionView {
    /// Prompt text.
    pub prompt: String,
    /// The four options.
    pub options: Vec<String>,
    /// Difficulty tag.
    pub difficulty: String,
    /// Optional illustrative image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// A resolved round as shown during the review window and in history.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoundResultView {
    /// Stable history id.
    pub id: String,
    /// Zero-based round index.
    pub index: usize,
    /// Whose turn it was.
    pub turn: TurnView,
    /// Prompt text.
    pub prompt: String,
    /// The correct option index, revealed after resolution.
    pub correct_index: usize,
    /// Winning or submitted option, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chosen: Option<usize>,
    /// Whether the decision was an explicit pass.
    pub passed: bool,
    /// Whether the chosen option was correct.
    pub correct: bool,
    /// `answer`, `timeout`, or `skip`.
    pub outcome: String,
    /// Points awarded.
    pub points: u32,
    /// Explanation revealed with the result.
    pub explanation: String,
}

/// One timeline row.
#[derive(Debug, Serialize, ToSchema)]
pub struct TimelineView {
    /// Epoch milliseconds.
    pub at: u64,
    /// Message text.
    pub message: String,
}

/// The caller's own vote in the current round.
#[derive(Debug, Serialize, ToSchema)]
pub struct VoteView {
    /// Chosen option, absent for a pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_index: Option<usize>,
    /// Whether the vote was an explicit pass.
    pub pass: bool,
}
