use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Quiz Clash.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::session_stream,
        crate::routes::session::create_session,
        crate::routes::session::directory,
        crate::routes::session::session_snapshot,
        crate::routes::session::join_session,
        crate::routes::session::rejoin_session,
        crate::routes::session::leave_session,
        crate::routes::session::switch_team,
        crate::routes::session::submit_vote,
        crate::routes::session::start_match,
        crate::routes::session::pause_match,
        crate::routes::session::resume_match,
        crate::routes::session::skip_round,
        crate::routes::session::close_session,
        crate::routes::session::kick_participant,
        crate::routes::session::export_summary,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::CreateSessionResponse,
            crate::dto::session::JoinSessionRequest,
            crate::dto::session::JoinSessionResponse,
            crate::dto::session::RejoinRequest,
            crate::dto::session::RejoinResponse,
            crate::dto::session::LeaveRequest,
            crate::dto::session::VoteRequest,
            crate::dto::session::HostActionRequest,
            crate::dto::session::KickRequest,
            crate::dto::session::SwitchTeamRequest,
            crate::dto::session::DirectoryEntry,
            crate::dto::snapshot::SessionSnapshot,
            crate::dto::snapshot::TeamScoreView,
            crate::dto::snapshot::ParticipantView,
            crate::dto::snapshot::ActiveRoundView,
            crate::dto::snapshot::TurnView,
            crate::dto::snapshot::QuestionView,
            crate::dto::snapshot::RoundResultView,
            crate::dto::snapshot::TimelineView,
            crate::dto::snapshot::VoteView,
            crate::dto::sse::SessionClosedEvent,
            crate::dao::models::MatchSummary,
            crate::dao::models::TeamScoreEntity,
            crate::dao::models::ParticipantSummaryEntity,
            crate::dao::models::RoundRecordEntity,
            crate::dao::models::HardQuestionEntity,
            crate::dao::models::TimelineEntity,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Session lifecycle and host controls"),
        (name = "rounds", description = "Round voting and match flow"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;
