//! Request and response payloads for the session REST surface.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::dto::validation::{
    validate_ai_mode_tag, validate_mode_tag, validate_pack_tags, validate_team_tag,
};

/// Payload used to open a new session lobby.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateSessionRequest {
    /// Free-text topic questions are generated from.
    #[validate(length(min = 2, max = 120))]
    pub topic: String,
    /// Display name for the host seat.
    #[validate(length(min = 1, max = 40))]
    pub host_name: String,
    /// Gameplay mode identifier; defaults to `team_battle`.
    #[serde(default = "default_mode")]
    #[validate(custom(function = validate_mode_tag))]
    pub mode: String,
    /// Content-pack identifiers.
    #[serde(default)]
    #[validate(custom(function = validate_pack_tags))]
    pub packs: Vec<String>,
    /// Optional join password.
    #[serde(default)]
    #[validate(length(min = 1, max = 64))]
    pub password: Option<String>,
    /// Questions per team set; clamped into the supported range.
    #[serde(default)]
    pub question_count: Option<usize>,
    /// Base round duration in seconds; clamped into the supported range.
    #[serde(default)]
    pub round_seconds: Option<u64>,
    /// Generation backend policy; defaults to `auto`.
    #[serde(default = "default_ai_mode")]
    #[validate(custom(function = validate_ai_mode_tag))]
    pub ai_mode: String,
    /// Optional tone hint forwarded to generation backends.
    #[serde(default)]
    #[validate(length(min = 1, max = 60))]
    pub tone: Option<String>,
}

fn default_mode() -> String {
    "team_battle".into()
}

fn default_ai_mode() -> String {
    "auto".into()
}

/// Credentials returned once a session has been created.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateSessionResponse {
    /// Join code other participants use.
    pub code: String,
    /// The host seat's participant id.
    pub host_id: Uuid,
    /// Opaque credential that reclaims the host seat after a disconnect.
    pub host_credential: String,
}

/// Payload used to join an existing session.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinSessionRequest {
    /// Display name; must be unique within the session.
    #[validate(length(min = 1, max = 40))]
    pub name: String,
    /// Password, required when the session was created with one.
    #[serde(default)]
    pub password: Option<String>,
}

/// Seat assignment returned on a successful join.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinSessionResponse {
    /// The new participant's id.
    pub participant_id: Uuid,
    /// Opaque credential that reclaims the seat after a disconnect.
    pub credential: String,
    /// Assigned side label.
    pub team: String,
}

/// Payload used to reclaim a seat after a disconnect.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct RejoinRequest {
    /// The credential issued at create or join time.
    #[validate(length(min = 16, max = 64))]
    pub credential: String,
}

/// Restored seat returned on a successful rejoin.
#[derive(Debug, Serialize, ToSchema)]
pub struct RejoinResponse {
    /// The reclaimed participant id.
    pub participant_id: Uuid,
    /// `host` or `player`.
    pub role: String,
    /// Side label the seat belongs to.
    pub team: String,
}

/// Payload naming the acting participant for leave requests.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LeaveRequest {
    /// The departing participant.
    pub participant_id: Uuid,
}

/// A vote or answer submission for the current round.
#[derive(Debug, Deserialize, ToSchema)]
pub struct VoteRequest {
    /// The voting participant.
    pub participant_id: Uuid,
    /// Chosen option index, absent when passing.
    #[serde(default)]
    pub option_index: Option<usize>,
    /// Explicit pass.
    #[serde(default)]
    pub pass: bool,
}

/// Host-only control payload.
#[derive(Debug, Deserialize, ToSchema)]
pub struct HostActionRequest {
    /// The host seat's participant id.
    pub host_id: Uuid,
}

/// Host-only removal payload.
#[derive(Debug, Deserialize, ToSchema)]
pub struct KickRequest {
    /// The host seat's participant id.
    pub host_id: Uuid,
    /// The participant being removed.
    pub target_id: Uuid,
}

/// Lobby team-switch payload.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SwitchTeamRequest {
    /// The switching participant.
    pub participant_id: Uuid,
    /// Target side label.
    #[validate(custom(function = validate_team_tag))]
    pub team: String,
}

/// One row of the public session directory.
#[derive(Debug, Serialize, ToSchema)]
pub struct DirectoryEntry {
    /// Join code.
    pub code: String,
    /// Session topic.
    pub topic: String,
    /// Gameplay mode identifier.
    pub mode: String,
    /// Lifecycle phase label.
    pub phase: String,
    /// Number of joined players (excluding the host).
    pub players: usize,
    /// Whether a password is required to join.
    pub locked: bool,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// Directory filter query parameters.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct DirectoryQuery {
    /// Restrict to a lifecycle phase label.
    #[serde(default)]
    pub phase: Option<String>,
    /// Restrict to a gameplay mode identifier.
    #[serde(default)]
    pub mode: Option<String>,
}

/// Snapshot personalization query parameters.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SnapshotQuery {
    /// When present, the snapshot includes this participant's own vote.
    #[serde(default)]
    pub participant_id: Option<Uuid>,
}
