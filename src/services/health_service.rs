use crate::{dto::health::HealthResponse, state::SharedState};

/// Respond with the process health and the current registry size.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    HealthResponse::ok(state.sessions().len())
}
