use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use rand::Rng;
use uuid::Uuid;

use crate::generator::providers::AiMode;
use crate::state::state_machine::SessionMachine;

/// Alphabet used for join codes; visually ambiguous characters are excluded.
const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
/// Alphabet used for rejoin credentials.
const CREDENTIAL_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
/// Length of a join code.
pub const JOIN_CODE_LENGTH: usize = 6;
/// Length of the host rejoin credential.
pub const HOST_CREDENTIAL_LENGTH: usize = 32;
/// Length of a player rejoin credential.
pub const PLAYER_CREDENTIAL_LENGTH: usize = 24;
/// Allowed per-round duration bounds, in seconds.
pub const ROUND_SECONDS_RANGE: (u64, u64) = (10, 60);
/// Allowed question counts per team set.
pub const QUESTION_COUNT_RANGE: (usize, usize) = (5, 7);
/// Blitz never shortens a round below this.
const BLITZ_FLOOR_MS: u64 = 8_000;

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Deadlines are stored as epoch timestamps so snapshots can expose the
/// remaining time without access to a monotonic anchor.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a fresh join code.
pub fn generate_join_code() -> String {
    random_token(JOIN_CODE_ALPHABET, JOIN_CODE_LENGTH)
}

/// Generate an opaque rejoin credential of the given length.
pub fn generate_credential(length: usize) -> String {
    random_token(CREDENTIAL_ALPHABET, length)
}

fn random_token(alphabet: &[u8], length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
        .collect()
}

/// Whether a match is played as two cooperating sides or individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFormat {
    /// Two-sided cooperative-vote mode.
    Teams,
    /// Every participant answers individually.
    FreeForAll,
}

/// One of the two sides in team format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeamId {
    /// First side; also the implicit bucket in free-for-all.
    A,
    /// Second side.
    B,
}

impl TeamId {
    /// Stable index used for score arrays.
    pub fn index(self) -> usize {
        match self {
            TeamId::A => 0,
            TeamId::B => 1,
        }
    }

    /// The opposite side.
    pub fn other(self) -> TeamId {
        match self {
            TeamId::A => TeamId::B,
            TeamId::B => TeamId::A,
        }
    }

    /// Short label used in snapshots and history ids.
    pub fn label(self) -> &'static str {
        match self {
            TeamId::A => "A",
            TeamId::B => "B",
        }
    }
}

/// Gameplay-mode profile selected at session creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameplayMode {
    /// Classic two-team match.
    TeamBattle,
    /// Free-for-all, each player on their own.
    SoloArena,
    /// Head-to-head with exactly one player per side.
    Duel,
    /// Fast team mode: shorter timer, forced speed bonus, no passing.
    TurboStorm,
    /// Fast free-for-all with streak bonuses.
    ComboRush,
}

/// Static rules attached to a gameplay mode.
#[derive(Debug, Clone, Copy)]
pub struct ModeProfile {
    /// Team or free-for-all play.
    pub format: SessionFormat,
    /// Multiplier applied to the configured round duration.
    pub timer_factor: f64,
    /// Whether the speed bonus is always on in this mode.
    pub force_speed_bonus: bool,
    /// Whether "pass" is an accepted vote.
    pub allow_pass: bool,
    /// Flat extra points per correct answer.
    pub bonus_correct: u32,
    /// Whether consecutive correct answers earn streak points.
    pub streak_bonus: bool,
}

impl GameplayMode {
    /// Rules for this mode.
    pub fn profile(self) -> ModeProfile {
        match self {
            GameplayMode::TeamBattle => ModeProfile {
                format: SessionFormat::Teams,
                timer_factor: 1.0,
                force_speed_bonus: false,
                allow_pass: true,
                bonus_correct: 0,
                streak_bonus: false,
            },
            GameplayMode::SoloArena => ModeProfile {
                format: SessionFormat::FreeForAll,
                timer_factor: 1.0,
                force_speed_bonus: false,
                allow_pass: true,
                bonus_correct: 0,
                streak_bonus: false,
            },
            GameplayMode::Duel => ModeProfile {
                format: SessionFormat::Teams,
                timer_factor: 1.0,
                force_speed_bonus: false,
                allow_pass: true,
                bonus_correct: 0,
                streak_bonus: false,
            },
            GameplayMode::TurboStorm => ModeProfile {
                format: SessionFormat::Teams,
                timer_factor: 0.65,
                force_speed_bonus: true,
                allow_pass: false,
                bonus_correct: 1,
                streak_bonus: false,
            },
            GameplayMode::ComboRush => ModeProfile {
                format: SessionFormat::FreeForAll,
                timer_factor: 0.9,
                force_speed_bonus: true,
                allow_pass: true,
                bonus_correct: 0,
                streak_bonus: true,
            },
        }
    }

    /// Wire identifier for this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            GameplayMode::TeamBattle => "team_battle",
            GameplayMode::SoloArena => "solo_arena",
            GameplayMode::Duel => "duel_1v1",
            GameplayMode::TurboStorm => "turbo_storm",
            GameplayMode::ComboRush => "combo_rush",
        }
    }

    /// Parse a wire identifier.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "team_battle" => Some(GameplayMode::TeamBattle),
            "solo_arena" => Some(GameplayMode::SoloArena),
            "duel_1v1" => Some(GameplayMode::Duel),
            "turbo_storm" => Some(GameplayMode::TurboStorm),
            "combo_rush" => Some(GameplayMode::ComboRush),
            _ => None,
        }
    }
}

/// Optional content-pack modifiers selected at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentPack {
    /// Shortens the timer to 65%, floored at 8 seconds.
    Blitz,
    /// Awards an extra point for hard questions.
    Expert,
    /// Enables the speed bonus in modes that do not force it.
    Speed,
}

impl ContentPack {
    /// Wire identifier for this pack.
    pub fn as_str(self) -> &'static str {
        match self {
            ContentPack::Blitz => "blitz",
            ContentPack::Expert => "expert",
            ContentPack::Speed => "speed",
        }
    }

    /// Parse a wire identifier.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "blitz" => Some(ContentPack::Blitz),
            "expert" => Some(ContentPack::Expert),
            "speed" => Some(ContentPack::Speed),
            _ => None,
        }
    }
}

/// Difficulty tag attached to a generated question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    /// Broad-knowledge question.
    Easy,
    /// Default tier.
    Medium,
    /// Expert tier; eligible for the expert bonus.
    Hard,
}

impl Difficulty {
    /// Wire identifier for this difficulty.
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

/// A generated multiple-choice question. Immutable after generation.
#[derive(Debug, Clone)]
pub struct Question {
    /// Stable identifier.
    pub id: Uuid,
    /// Prompt text shown to participants.
    pub prompt: String,
    /// Exactly four distinct options.
    pub options: Vec<String>,
    /// Index of the correct option.
    pub correct_index: usize,
    /// Short explanation revealed after resolution.
    pub explanation: String,
    /// Difficulty tag.
    pub difficulty: Difficulty,
    /// Optional illustrative image URL filled in by enrichment.
    pub image_url: Option<String>,
}

/// Role a participant holds in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Session owner; drives the match controls.
    Host,
    /// Regular player.
    Player,
}

impl Role {
    /// Wire label for snapshots.
    pub fn label(self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::Player => "player",
        }
    }
}

/// Per-participant running statistics.
#[derive(Debug, Clone, Default)]
pub struct ParticipantStats {
    /// Rounds in which this participant submitted any vote or answer.
    pub answered: u32,
    /// Correct outcomes credited to this participant's own choice.
    pub correct: u32,
    /// Wrong outcomes from this participant's own choice.
    pub wrong: u32,
    /// Rounds lost to the deadline without a submission.
    pub timeouts: u32,
    /// Explicit passes.
    pub passes: u32,
    /// Accumulated points.
    pub points: u32,
    /// Current consecutive-correct streak.
    pub streak: u32,
    /// Set when the host removed this participant mid-match.
    pub disqualified: bool,
}

/// A joined participant.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Stable identity for the session's lifetime.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Host or player.
    pub role: Role,
    /// Side assignment; `A` in free-for-all.
    pub team: TeamId,
    /// Opaque credential that reclaims this seat after a disconnect.
    pub credential: String,
    /// Whether a transport is currently attached.
    pub connected: bool,
    /// Set once the participant manually switched sides.
    pub team_locked: bool,
    /// Join timestamp, also the free-for-all turn order key.
    pub joined_at: u64,
    /// Running statistics.
    pub stats: ParticipantStats,
}

/// A single vote in a team round: an option or an explicit pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteChoice {
    /// Option index 0..=3.
    Option(usize),
    /// Explicit pass.
    Pass,
}

/// One recorded vote with its submission time.
#[derive(Debug, Clone, Copy)]
pub struct Vote {
    /// The submitted choice.
    pub choice: VoteChoice,
    /// Submission timestamp, the tie-break key.
    pub submitted_at: u64,
}

/// Whose turn a round slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundTurn {
    /// A whole side votes together.
    Team(TeamId),
    /// One participant answers alone.
    Player(Uuid),
}

/// One position in the session's round plan.
#[derive(Debug, Clone, Copy)]
pub struct RoundSlot {
    /// Whose turn it is.
    pub turn: RoundTurn,
    /// Index into the turn owner's question set.
    pub question_index: usize,
}

/// Live state for the currently running round.
#[derive(Debug, Clone)]
pub struct ActiveRound {
    /// When the round went live.
    pub started_at: u64,
    /// Epoch deadline for submissions.
    pub deadline_at: u64,
    /// Full round duration, kept for speed-bonus ratios.
    pub duration_ms: u64,
    /// Vote ledger keyed by participant, in submission order.
    pub votes: IndexMap<Uuid, Vote>,
}

impl ActiveRound {
    /// Milliseconds left on the clock at `now`, zero once elapsed.
    pub fn remaining_ms(&self, now: u64) -> u64 {
        self.deadline_at.saturating_sub(now)
    }
}

/// How a round came to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// A deciding answer or vote tally.
    Answer,
    /// Deadline elapsed without a decision.
    Timeout,
    /// Host skipped the round.
    Skip,
}

impl OutcomeKind {
    /// Wire identifier for this outcome.
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::Answer => "answer",
            OutcomeKind::Timeout => "timeout",
            OutcomeKind::Skip => "skip",
        }
    }
}

/// Immutable record of one resolved round.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Stable id, `round-{n}-team-{side}` or `round-{n}-player-{uuid}`.
    pub id: String,
    /// Index into the round plan.
    pub round_index: usize,
    /// Whose turn it was.
    pub turn: RoundTurn,
    /// The question asked.
    pub question_id: Uuid,
    /// Prompt text copied for the summary.
    pub prompt: String,
    /// Correct option index.
    pub correct_index: usize,
    /// How the round resolved.
    pub outcome: OutcomeKind,
    /// Winning or submitted option, if any.
    pub chosen: Option<usize>,
    /// Whether the decision was an explicit pass.
    pub passed: bool,
    /// Whether the chosen option was correct.
    pub correct: bool,
    /// Points awarded by this round.
    pub points: u32,
    /// Resolution timestamp.
    pub resolved_at: u64,
}

/// Aggregate outcome counters per question, for the summary's hardest-question list.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuestionStat {
    /// Rounds answered correctly.
    pub correct: u32,
    /// Rounds answered wrong (including passes).
    pub wrong: u32,
    /// Rounds lost to the deadline.
    pub timeouts: u32,
}

/// Human-readable event appended as the match progresses.
#[derive(Debug, Clone)]
pub struct TimelineEntry {
    /// Event timestamp.
    pub at: u64,
    /// Message text.
    pub message: String,
}

/// Snapshot of a disconnected player's seat, held until the grace deadline.
#[derive(Debug, Clone)]
pub struct SeatHold {
    /// Credential that reclaims the seat.
    pub credential: String,
    /// The seat exactly as it was at disconnect time.
    pub participant: Participant,
    /// Epoch deadline after which the seat is released.
    pub deadline_at: u64,
}

/// Question sets per side. Free-for-all uses only side `A`.
#[derive(Debug, Clone, Default)]
pub struct QuestionSets {
    /// Side A's questions.
    pub team_a: Vec<Question>,
    /// Side B's questions; empty in free-for-all.
    pub team_b: Vec<Question>,
}

impl QuestionSets {
    /// The set a given side draws from.
    pub fn for_team(&self, team: TeamId) -> &[Question] {
        match team {
            TeamId::A => &self.team_a,
            TeamId::B => &self.team_b,
        }
    }

    /// Iterate all questions across both sides.
    pub fn iter_all(&self) -> impl Iterator<Item = &Question> {
        self.team_a.iter().chain(self.team_b.iter())
    }
}

/// One running match. Owned by its room's mutex; every mutation happens
/// under that single-writer lock.
#[derive(Debug)]
pub struct Session {
    /// Join code.
    pub code: String,
    /// Display topic the questions are generated from.
    pub topic: String,
    /// Selected gameplay mode.
    pub mode: GameplayMode,
    /// Selected content packs.
    pub packs: Vec<ContentPack>,
    /// Optional join password.
    pub password: Option<String>,
    /// Backend selection policy for question generation.
    pub ai_mode: AiMode,
    /// Optional tone hint forwarded to generation backends.
    pub tone: Option<String>,
    /// Questions per team set.
    pub question_count: usize,
    /// Effective per-round duration after mode and pack multipliers.
    pub round_duration_ms: u64,
    /// Lifecycle machine.
    pub machine: SessionMachine,
    /// Creation timestamp.
    pub created_at: u64,
    /// Set once the session reaches the finished phase.
    pub finished_at: Option<u64>,
    /// Joined participants in join order.
    pub participants: Vec<Participant>,
    /// Generated question material.
    pub question_sets: QuestionSets,
    /// Label of the backend that produced the sets.
    pub provider_label: Option<String>,
    /// Ordered round plan, fixed at start.
    pub plan: Vec<RoundSlot>,
    /// Index of the current round in the plan.
    pub current_round: usize,
    /// Live state while a round is running.
    pub active: Option<ActiveRound>,
    /// Remaining time captured at pause.
    pub paused_remaining_ms: Option<u64>,
    /// Epoch time at which the next round should go live (review delay).
    pub advance_at: Option<u64>,
    /// Epoch deadline for the disconnected host to reclaim the session.
    pub host_grace_deadline: Option<u64>,
    /// Watchdog deadline for in-flight question generation.
    pub preparing_deadline: Option<u64>,
    /// Seats held for disconnected players.
    pub seat_holds: Vec<SeatHold>,
    /// Players whose seats were released after the grace window; their
    /// statistics still count toward the final summary.
    pub departed: Vec<Participant>,
    /// Team score totals, indexed by [`TeamId::index`]. Never decremented.
    pub team_scores: [u32; 2],
    /// Immutable resolved-round records.
    pub history: Vec<HistoryEntry>,
    /// Human-readable match log.
    pub timeline: Vec<TimelineEntry>,
    /// Aggregate per-question outcome counters.
    pub question_stats: HashMap<Uuid, QuestionStat>,
    /// Incremented for every generation kick-off; stale results are dropped.
    pub generation_id: u64,
}

impl Session {
    /// Build a fresh session in the lobby.
    pub fn new(
        code: String,
        topic: String,
        mode: GameplayMode,
        packs: Vec<ContentPack>,
        password: Option<String>,
        ai_mode: AiMode,
        tone: Option<String>,
        question_count: usize,
        round_seconds: u64,
    ) -> Self {
        let round_duration_ms = effective_round_duration_ms(round_seconds, mode, &packs);
        Self {
            code,
            topic,
            mode,
            packs,
            password,
            ai_mode,
            tone,
            question_count,
            round_duration_ms,
            machine: SessionMachine::new(),
            created_at: now_ms(),
            finished_at: None,
            participants: Vec::new(),
            question_sets: QuestionSets::default(),
            provider_label: None,
            plan: Vec::new(),
            current_round: 0,
            active: None,
            paused_remaining_ms: None,
            advance_at: None,
            host_grace_deadline: None,
            preparing_deadline: None,
            seat_holds: Vec::new(),
            departed: Vec::new(),
            team_scores: [0, 0],
            history: Vec::new(),
            timeline: Vec::new(),
            question_stats: HashMap::new(),
            generation_id: 0,
        }
    }

    /// The session's play format.
    pub fn format(&self) -> SessionFormat {
        self.mode.profile().format
    }

    /// Whether a content pack is selected.
    pub fn has_pack(&self, pack: ContentPack) -> bool {
        self.packs.contains(&pack)
    }

    /// Whether the speed bonus applies to this session.
    pub fn speed_bonus_enabled(&self) -> bool {
        self.mode.profile().force_speed_bonus || self.has_pack(ContentPack::Speed)
    }

    /// Look up a participant by id.
    pub fn participant(&self, id: Uuid) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    /// Look up a participant mutably by id.
    pub fn participant_mut(&mut self, id: Uuid) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == id)
    }

    /// The host seat, if still present.
    pub fn host(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.role == Role::Host)
    }

    /// Mutable host seat.
    pub fn host_mut(&mut self) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.role == Role::Host)
    }

    /// Number of players (not the host) on a side.
    pub fn team_size(&self, team: TeamId) -> usize {
        self.participants
            .iter()
            .filter(|p| p.role == Role::Player && p.team == team)
            .count()
    }

    /// Connected, non-disqualified players on a side; the round electorate.
    pub fn eligible_voters(&self, team: TeamId) -> Vec<Uuid> {
        self.participants
            .iter()
            .filter(|p| {
                p.role == Role::Player
                    && p.team == team
                    && p.connected
                    && !p.stats.disqualified
            })
            .map(|p| p.id)
            .collect()
    }

    /// Pick the side a new player joins.
    ///
    /// Free-for-all always uses `A`. Duel fills the empty side. Teams join
    /// the smaller side, or a random one when balanced.
    pub fn team_for_new_player(&self) -> TeamId {
        match self.format() {
            SessionFormat::FreeForAll => TeamId::A,
            SessionFormat::Teams => {
                let size_a = self.team_size(TeamId::A);
                let size_b = self.team_size(TeamId::B);
                if self.mode == GameplayMode::Duel {
                    if size_a == 0 {
                        return TeamId::A;
                    }
                    return TeamId::B;
                }
                if size_a < size_b {
                    TeamId::A
                } else if size_b < size_a {
                    TeamId::B
                } else if rand::rng().random_bool(0.5) {
                    TeamId::A
                } else {
                    TeamId::B
                }
            }
        }
    }

    /// Rebalance lobby teams by moving the last-joined unlocked player from
    /// the bigger side when sizes differ by more than one.
    pub fn rebalance_teams(&mut self) {
        if self.format() != SessionFormat::Teams || self.mode == GameplayMode::Duel {
            return;
        }
        loop {
            let size_a = self.team_size(TeamId::A);
            let size_b = self.team_size(TeamId::B);
            let (from, to) = if size_a > size_b + 1 {
                (TeamId::A, TeamId::B)
            } else if size_b > size_a + 1 {
                (TeamId::B, TeamId::A)
            } else {
                return;
            };

            let mover = self
                .participants
                .iter_mut()
                .filter(|p| p.role == Role::Player && p.team == from && !p.team_locked)
                .max_by_key(|p| p.joined_at);
            match mover {
                Some(participant) => participant.team = to,
                // Everyone on the bigger side locked their seat; leave as is.
                None => return,
            }
        }
    }

    /// The slot for the current round, if the plan has not been exhausted.
    pub fn current_slot(&self) -> Option<RoundSlot> {
        self.plan.get(self.current_round).copied()
    }

    /// The question a slot refers to.
    pub fn question_for_slot(&self, slot: RoundSlot) -> Option<&Question> {
        let set = match slot.turn {
            RoundTurn::Team(team) => self.question_sets.for_team(team),
            RoundTurn::Player(_) => &self.question_sets.team_a,
        };
        set.get(slot.question_index)
    }

    /// Append a timeline message.
    pub fn push_timeline(&mut self, message: impl Into<String>) {
        self.timeline.push(TimelineEntry {
            at: now_ms(),
            message: message.into(),
        });
    }

    /// Build the ordered round plan from the current roster.
    ///
    /// Teams alternate A/B per question index; free-for-all gives every
    /// participant a turn per question, ordered by join time.
    pub fn build_round_plan(&mut self) {
        let mut plan = Vec::new();
        match self.format() {
            SessionFormat::Teams => {
                for question_index in 0..self.question_count {
                    plan.push(RoundSlot {
                        turn: RoundTurn::Team(TeamId::A),
                        question_index,
                    });
                    plan.push(RoundSlot {
                        turn: RoundTurn::Team(TeamId::B),
                        question_index,
                    });
                }
            }
            SessionFormat::FreeForAll => {
                let mut players: Vec<&Participant> = self
                    .participants
                    .iter()
                    .filter(|p| p.role == Role::Player)
                    .collect();
                players.sort_by_key(|p| p.joined_at);
                for question_index in 0..self.question_count {
                    for player in &players {
                        plan.push(RoundSlot {
                            turn: RoundTurn::Player(player.id),
                            question_index,
                        });
                    }
                }
            }
        }
        self.plan = plan;
        self.current_round = 0;
    }
}

/// Compute the effective round duration from the configured seconds, the
/// mode's timer factor, and the blitz pack.
pub fn effective_round_duration_ms(round_seconds: u64, mode: GameplayMode, packs: &[ContentPack]) -> u64 {
    let clamped = round_seconds.clamp(ROUND_SECONDS_RANGE.0, ROUND_SECONDS_RANGE.1);
    let mut duration = (clamped as f64) * 1000.0 * mode.profile().timer_factor;
    if packs.contains(&ContentPack::Blitz) {
        duration = (duration * 0.65).max(BLITZ_FLOOR_MS as f64);
    }
    duration.round() as u64
}
