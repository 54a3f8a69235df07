//! Application-level configuration loading for timers, grace windows, and
//! generation backends.

use std::{env, time::Duration};

use tracing::{info, warn};

/// Grace window granted to a disconnected host before the session closes.
const DEFAULT_HOST_GRACE_MS: u64 = 90_000;
/// Grace window granted to a disconnected player during an active match.
const DEFAULT_PLAYER_GRACE_MS: u64 = 60_000;
/// Watchdog for the initial question generation kicked off at match start.
const DEFAULT_GENERATION_TIMEOUT_MS: u64 = 35_000;
/// Watchdog for supplemental generation used to cover set shortfalls.
const DEFAULT_FALLBACK_GENERATION_TIMEOUT_MS: u64 = 18_000;
/// How long a failing provider is excluded from selection.
const DEFAULT_PROVIDER_COOLDOWN_MS: u64 = 600_000;
/// Per-call budget for a provider HTTP request.
const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 6_000;
/// Wall-clock budget for the whole image enrichment pass.
const DEFAULT_IMAGE_BUDGET_MS: u64 = 9_000;
/// Per-candidate budget inside the image enrichment pass.
const DEFAULT_IMAGE_FETCH_TIMEOUT_MS: u64 = 2_800;
/// Lifetime of a cached fact context per topic.
const DEFAULT_CONTEXT_TTL_MS: u64 = 1_200_000;
/// Directory where finished-match summaries are exported.
const DEFAULT_EXPORT_DIR: &str = "exports";

/// Credentials for the external question-generation backends. A missing key
/// simply removes that backend from the rotation.
#[derive(Debug, Clone, Default)]
pub struct ProviderKeys {
    /// OpenAI-compatible chat completions key.
    pub openai: Option<String>,
    /// Gemini generateContent key.
    pub gemini: Option<String>,
    /// Groq chat completions key.
    pub groq: Option<String>,
    /// Yandex GPT key, paired with the folder identifier.
    pub yandex: Option<String>,
    /// Yandex cloud folder the completions are billed to.
    pub yandex_folder: Option<String>,
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Host reconnect grace window.
    pub host_grace: Duration,
    /// Player reconnect grace window.
    pub player_grace: Duration,
    /// Budget for the match-start question generation.
    pub generation_timeout: Duration,
    /// Budget for shortfall supplement generation.
    pub fallback_generation_timeout: Duration,
    /// Cooldown applied to a failing provider.
    pub provider_cooldown: Duration,
    /// Per-call provider timeout.
    pub provider_timeout: Duration,
    /// Global image enrichment budget.
    pub image_budget: Duration,
    /// Per-image fetch timeout.
    pub image_fetch_timeout: Duration,
    /// Fact context cache lifetime.
    pub context_ttl: Duration,
    /// Export directory for finished-match summaries.
    pub export_dir: String,
    /// Backend credentials.
    pub provider_keys: ProviderKeys,
}

impl AppConfig {
    /// Load the configuration from the environment, falling back to built-in
    /// defaults and clamping out-of-range values.
    pub fn load() -> Self {
        let provider_keys = ProviderKeys {
            openai: non_empty_env("OPENAI_API_KEY"),
            gemini: non_empty_env("GEMINI_API_KEY"),
            groq: non_empty_env("GROQ_API_KEY"),
            yandex: non_empty_env("YANDEX_API_KEY"),
            yandex_folder: non_empty_env("YANDEX_FOLDER_ID"),
        };

        let configured = [
            provider_keys.openai.is_some(),
            provider_keys.gemini.is_some(),
            provider_keys.groq.is_some(),
            provider_keys.yandex.is_some(),
        ]
        .iter()
        .filter(|ready| **ready)
        .count();
        if configured == 0 {
            info!("no generation backends configured; offline synthesizer only");
        } else {
            info!(backends = configured, "generation backends configured");
        }

        Self {
            host_grace: env_duration_ms("HOST_RECONNECT_GRACE_MS", DEFAULT_HOST_GRACE_MS, 5_000),
            player_grace: env_duration_ms(
                "PLAYER_RECONNECT_GRACE_MS",
                DEFAULT_PLAYER_GRACE_MS,
                5_000,
            ),
            generation_timeout: env_duration_ms(
                "START_GENERATION_TIMEOUT_MS",
                DEFAULT_GENERATION_TIMEOUT_MS,
                5_000,
            ),
            fallback_generation_timeout: env_duration_ms(
                "FALLBACK_GENERATION_TIMEOUT_MS",
                DEFAULT_FALLBACK_GENERATION_TIMEOUT_MS,
                3_000,
            ),
            provider_cooldown: env_duration_ms(
                "PROVIDER_COOLDOWN_MS",
                DEFAULT_PROVIDER_COOLDOWN_MS,
                10_000,
            ),
            provider_timeout: env_duration_ms(
                "AI_REQUEST_TIMEOUT_MS",
                DEFAULT_PROVIDER_TIMEOUT_MS,
                1_000,
            ),
            image_budget: env_duration_ms("IMAGE_BUDGET_MS", DEFAULT_IMAGE_BUDGET_MS, 1_000),
            image_fetch_timeout: env_duration_ms(
                "IMAGE_FETCH_TIMEOUT_MS",
                DEFAULT_IMAGE_FETCH_TIMEOUT_MS,
                500,
            ),
            context_ttl: env_duration_ms("CONTEXT_CACHE_TTL_MS", DEFAULT_CONTEXT_TTL_MS, 60_000),
            export_dir: non_empty_env("EXPORT_DIR").unwrap_or_else(|| DEFAULT_EXPORT_DIR.into()),
            provider_keys,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host_grace: Duration::from_millis(DEFAULT_HOST_GRACE_MS),
            player_grace: Duration::from_millis(DEFAULT_PLAYER_GRACE_MS),
            generation_timeout: Duration::from_millis(DEFAULT_GENERATION_TIMEOUT_MS),
            fallback_generation_timeout: Duration::from_millis(
                DEFAULT_FALLBACK_GENERATION_TIMEOUT_MS,
            ),
            provider_cooldown: Duration::from_millis(DEFAULT_PROVIDER_COOLDOWN_MS),
            provider_timeout: Duration::from_millis(DEFAULT_PROVIDER_TIMEOUT_MS),
            image_budget: Duration::from_millis(DEFAULT_IMAGE_BUDGET_MS),
            image_fetch_timeout: Duration::from_millis(DEFAULT_IMAGE_FETCH_TIMEOUT_MS),
            context_ttl: Duration::from_millis(DEFAULT_CONTEXT_TTL_MS),
            export_dir: DEFAULT_EXPORT_DIR.into(),
            provider_keys: ProviderKeys::default(),
        }
    }
}

/// Read a millisecond duration from the environment, enforcing a floor so a
/// typo cannot produce a zero-length timer.
fn env_duration_ms(name: &str, default_ms: u64, floor_ms: u64) -> Duration {
    let value = match env::var(name) {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(parsed) => parsed.max(floor_ms),
            Err(_) => {
                warn!(var = name, value = %raw, "unparseable duration; using default");
                default_ms
            }
        },
        Err(_) => default_ms,
    };
    Duration::from_millis(value)
}

/// Read an environment variable, treating empty values as absent.
fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_clamped_sane() {
        let config = AppConfig::default();
        assert!(config.host_grace > config.player_grace);
        assert!(config.provider_timeout < config.generation_timeout);
        assert!(config.image_fetch_timeout < config.image_budget);
    }
}
