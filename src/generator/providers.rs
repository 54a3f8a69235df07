//! External generation backends: ordered selection per AI mode, per-call
//! timeouts, cooldown bookkeeping, and the reviewer pass.

use std::time::Duration;

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

use crate::{
    config::ProviderKeys,
    generator::{context::Fact, validate::Draft},
    state::session::Difficulty,
};

/// Requested backend selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiMode {
    /// Every configured backend in the default priority order.
    Auto,
    /// Only the free-tier backends.
    Free,
    /// OpenAI only.
    OpenAiOnly,
    /// Yandex only.
    YandexOnly,
    /// All ready backends fanned out concurrently.
    Hybrid,
    /// Offline synthesizer only.
    Synthetic,
}

impl AiMode {
    /// Wire identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            AiMode::Auto => "auto",
            AiMode::Free => "free",
            AiMode::OpenAiOnly => "openai",
            AiMode::YandexOnly => "yandex",
            AiMode::Hybrid => "hybrid",
            AiMode::Synthetic => "synthetic",
        }
    }

    /// Parse a wire identifier.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(AiMode::Auto),
            "free" => Some(AiMode::Free),
            "openai" => Some(AiMode::OpenAiOnly),
            "yandex" => Some(AiMode::YandexOnly),
            "hybrid" => Some(AiMode::Hybrid),
            "synthetic" => Some(AiMode::Synthetic),
            _ => None,
        }
    }
}

/// The closed set of supported generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// OpenAI chat completions.
    OpenAi,
    /// Google Gemini generateContent.
    Gemini,
    /// Groq chat completions.
    Groq,
    /// Yandex GPT completion.
    Yandex,
}

impl Provider {
    /// Human-readable label used in snapshots and summaries.
    pub fn label(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Gemini => "gemini",
            Provider::Groq => "groq",
            Provider::Yandex => "yandex",
        }
    }

    /// Whether a credential for this backend is configured.
    pub fn is_configured(self, keys: &ProviderKeys) -> bool {
        match self {
            Provider::OpenAi => keys.openai.is_some(),
            Provider::Gemini => keys.gemini.is_some(),
            Provider::Groq => keys.groq.is_some(),
            Provider::Yandex => keys.yandex.is_some() && keys.yandex_folder.is_some(),
        }
    }

    /// Slow backends get a larger floor on the per-call budget.
    pub fn effective_timeout(self, base: Duration) -> Duration {
        match self {
            Provider::Yandex => base.max(Duration::from_secs(12)),
            _ => base,
        }
    }
}

/// The configured backends for a mode, in priority order.
pub fn provider_order(mode: AiMode, keys: &ProviderKeys) -> Vec<Provider> {
    let preferred: &[Provider] = match mode {
        AiMode::Auto | AiMode::Hybrid => &[
            Provider::OpenAi,
            Provider::Gemini,
            Provider::Groq,
            Provider::Yandex,
        ],
        AiMode::Free => &[Provider::Gemini, Provider::Groq],
        AiMode::OpenAiOnly => &[Provider::OpenAi],
        AiMode::YandexOnly => &[Provider::Yandex],
        AiMode::Synthetic => &[],
    };

    preferred
        .iter()
        .copied()
        .filter(|provider| provider.is_configured(keys))
        .collect()
}

/// Shared cooldown table: a failing backend is excluded from selection until
/// its entry expires. Read-mostly; one write per failure.
#[derive(Default)]
pub struct CooldownTable {
    until: DashMap<Provider, u64>,
}

impl CooldownTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a backend may be selected at `now`.
    pub fn is_ready(&self, provider: Provider, now: u64) -> bool {
        match self.until.get(&provider) {
            Some(entry) => *entry <= now,
            None => true,
        }
    }

    /// Exclude a backend for the cooldown period.
    pub fn trip(&self, provider: Provider, now: u64, cooldown: Duration) {
        let until = now + cooldown.as_millis() as u64;
        debug!(provider = provider.label(), until, "backend placed on cooldown");
        self.until.insert(provider, until);
    }

    /// Filter an ordered list down to the backends ready at `now`.
    pub fn ready(&self, order: &[Provider], now: u64) -> Vec<Provider> {
        order
            .iter()
            .copied()
            .filter(|provider| self.is_ready(*provider, now))
            .collect()
    }
}

/// Structured result of one backend call.
#[derive(Debug, Error)]
pub enum ProviderCallError {
    /// The call exceeded its per-call budget.
    #[error("provider call timed out")]
    Timeout,
    /// HTTP 429.
    #[error("provider rate limited")]
    RateLimited,
    /// HTTP 401/403.
    #[error("provider rejected the credential")]
    Unauthorized,
    /// Any other non-success status.
    #[error("provider returned status {0}")]
    Http(u16),
    /// Transport-level failure.
    #[error("provider transport error: {0}")]
    Transport(String),
    /// The response body did not contain a parseable question array.
    #[error("provider payload unusable: {0}")]
    BadPayload(String),
}

impl ProviderCallError {
    /// Whether this failure should place the backend on cooldown.
    ///
    /// Timeouts and malformed payloads are transient and do not; quota,
    /// credential, and transport failures do.
    pub fn trips_cooldown(&self) -> bool {
        !matches!(
            self,
            ProviderCallError::Timeout | ProviderCallError::BadPayload(_)
        )
    }
}

/// Pick a reviewer backend: the first ready one that is not the author.
pub fn pick_reviewer(
    order: &[Provider],
    author: Provider,
    cooldowns: &CooldownTable,
    now: u64,
) -> Option<Provider> {
    order
        .iter()
        .copied()
        .find(|candidate| *candidate != author && cooldowns.is_ready(*candidate, now))
}

/// Call one backend and parse its draft list, bounded by the per-call budget.
pub async fn request_drafts(
    http: &reqwest::Client,
    keys: &ProviderKeys,
    provider: Provider,
    prompt: &str,
    base_timeout: Duration,
) -> Result<Vec<Draft>, ProviderCallError> {
    let budget = provider.effective_timeout(base_timeout);
    let call = raw_completion(http, keys, provider, prompt);
    let text = match timeout(budget, call).await {
        Ok(result) => result?,
        Err(_) => return Err(ProviderCallError::Timeout),
    };
    parse_drafts(&text)
}

async fn raw_completion(
    http: &reqwest::Client,
    keys: &ProviderKeys,
    provider: Provider,
    prompt: &str,
) -> Result<String, ProviderCallError> {
    match provider {
        Provider::OpenAi => {
            chat_completion(
                http,
                "https://api.openai.com/v1/chat/completions",
                keys.openai.as_deref().unwrap_or_default(),
                "gpt-4o-mini",
                prompt,
            )
            .await
        }
        Provider::Groq => {
            chat_completion(
                http,
                "https://api.groq.com/openai/v1/chat/completions",
                keys.groq.as_deref().unwrap_or_default(),
                "llama-3.3-70b-versatile",
                prompt,
            )
            .await
        }
        Provider::Gemini => gemini_completion(http, keys, prompt).await,
        Provider::Yandex => yandex_completion(http, keys, prompt).await,
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

async fn chat_completion(
    http: &reqwest::Client,
    url: &str,
    key: &str,
    model: &str,
    prompt: &str,
) -> Result<String, ProviderCallError> {
    let response = http
        .post(url)
        .bearer_auth(key)
        .json(&json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.7,
        }))
        .send()
        .await
        .map_err(|err| ProviderCallError::Transport(err.to_string()))?;

    let response = classify_status(response)?;
    let payload: ChatResponse = response
        .json()
        .await
        .map_err(|err| ProviderCallError::BadPayload(err.to_string()))?;
    payload
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| ProviderCallError::BadPayload("empty choices".into()))
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

async fn gemini_completion(
    http: &reqwest::Client,
    keys: &ProviderKeys,
    prompt: &str,
) -> Result<String, ProviderCallError> {
    let key = keys.gemini.as_deref().unwrap_or_default();
    let url = format!(
        "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent?key={key}"
    );
    let response = http
        .post(&url)
        .json(&json!({
            "contents": [{"parts": [{"text": prompt}]}],
        }))
        .send()
        .await
        .map_err(|err| ProviderCallError::Transport(err.to_string()))?;

    let response = classify_status(response)?;
    let payload: GeminiResponse = response
        .json()
        .await
        .map_err(|err| ProviderCallError::BadPayload(err.to_string()))?;
    payload
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content.parts.into_iter().next())
        .map(|part| part.text)
        .ok_or_else(|| ProviderCallError::BadPayload("empty candidates".into()))
}

#[derive(Deserialize)]
struct YandexResponse {
    result: YandexResult,
}

#[derive(Deserialize)]
struct YandexResult {
    alternatives: Vec<YandexAlternative>,
}

#[derive(Deserialize)]
struct YandexAlternative {
    message: YandexMessage,
}

#[derive(Deserialize)]
struct YandexMessage {
    text: String,
}

async fn yandex_completion(
    http: &reqwest::Client,
    keys: &ProviderKeys,
    prompt: &str,
) -> Result<String, ProviderCallError> {
    let key = keys.yandex.as_deref().unwrap_or_default();
    let folder = keys.yandex_folder.as_deref().unwrap_or_default();
    let response = http
        .post("https://llm.api.cloud.yandex.net/foundationModels/v1/completion")
        .header("Authorization", format!("Api-Key {key}"))
        .json(&json!({
            "modelUri": format!("gpt://{folder}/yandexgpt-lite"),
            "completionOptions": {"temperature": 0.6, "maxTokens": "2000"},
            "messages": [{"role": "user", "text": prompt}],
        }))
        .send()
        .await
        .map_err(|err| ProviderCallError::Transport(err.to_string()))?;

    let response = classify_status(response)?;
    let payload: YandexResponse = response
        .json()
        .await
        .map_err(|err| ProviderCallError::BadPayload(err.to_string()))?;
    payload
        .result
        .alternatives
        .into_iter()
        .next()
        .map(|alternative| alternative.message.text)
        .ok_or_else(|| ProviderCallError::BadPayload("empty alternatives".into()))
}

fn classify_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderCallError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status.as_u16() {
        429 => Err(ProviderCallError::RateLimited),
        401 | 403 => Err(ProviderCallError::Unauthorized),
        code => Err(ProviderCallError::Http(code)),
    }
}

#[derive(Deserialize)]
struct RawQuestion {
    #[serde(alias = "prompt")]
    question: String,
    options: Vec<String>,
    #[serde(alias = "correct_index", default)]
    #[serde(rename = "correctIndex")]
    correct_index: usize,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    difficulty: String,
}

/// Extract the question array from a completion body, tolerating code fences
/// and surrounding prose.
pub fn parse_drafts(text: &str) -> Result<Vec<Draft>, ProviderCallError> {
    let start = text
        .find('[')
        .ok_or_else(|| ProviderCallError::BadPayload("no array found".into()))?;
    let end = text
        .rfind(']')
        .filter(|end| *end > start)
        .ok_or_else(|| ProviderCallError::BadPayload("unterminated array".into()))?;

    let raw: Vec<RawQuestion> = serde_json::from_str(&text[start..=end])
        .map_err(|err| ProviderCallError::BadPayload(err.to_string()))?;

    Ok(raw
        .into_iter()
        .map(|question| Draft {
            prompt: question.question,
            options: question.options,
            correct_index: question.correct_index,
            explanation: question.explanation,
            difficulty: match question.difficulty.as_str() {
                "easy" => Difficulty::Easy,
                "hard" => Difficulty::Hard,
                _ => Difficulty::Medium,
            },
        })
        .collect())
}

/// Build the generation prompt handed to a backend.
pub fn generation_prompt(theme: &str, count: usize, tone: Option<&str>, facts: &[Fact]) -> String {
    let mut prompt = format!(
        "Create {count} multiple-choice quiz questions about \"{theme}\". \
Respond with only a JSON array; each element has fields \"question\", \
\"options\" (exactly 4 distinct strings), \"correctIndex\" (0-3), \
\"explanation\", and \"difficulty\" (easy|medium|hard)."
    );
    if let Some(tone) = tone {
        prompt.push_str(&format!(" Use a {tone} tone."));
    }
    if !facts.is_empty() {
        prompt.push_str("\nGround every question in these facts:\n");
        for fact in facts.iter().take(12) {
            prompt.push_str(&format!("- {}\n", fact.sentence));
        }
    }
    prompt
}

/// Build the reviewer prompt that polishes a draft pool.
pub fn review_prompt(theme: &str, drafts: &[Draft]) -> String {
    let serialized: Vec<serde_json::Value> = drafts
        .iter()
        .map(|draft| {
            json!({
                "question": draft.prompt,
                "options": draft.options,
                "correctIndex": draft.correct_index,
                "explanation": draft.explanation,
            })
        })
        .collect();

    format!(
        "Review these quiz questions about \"{theme}\". Tighten wording, fix \
factual slips, and keep every item a JSON object with \"question\", \
\"options\" (4 distinct), \"correctIndex\", \"explanation\", \"difficulty\". \
Respond with only the corrected JSON array.\n{}",
        serde_json::to_string(&serialized).unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys_with(openai: bool, gemini: bool) -> ProviderKeys {
        ProviderKeys {
            openai: openai.then(|| "sk-test".into()),
            gemini: gemini.then(|| "g-test".into()),
            groq: None,
            yandex: None,
            yandex_folder: None,
        }
    }

    #[test]
    fn order_filters_unconfigured_backends() {
        let keys = keys_with(true, true);
        assert_eq!(
            provider_order(AiMode::Auto, &keys),
            vec![Provider::OpenAi, Provider::Gemini]
        );
        assert_eq!(provider_order(AiMode::Free, &keys), vec![Provider::Gemini]);
        assert!(provider_order(AiMode::Synthetic, &keys).is_empty());
        assert!(provider_order(AiMode::YandexOnly, &keys).is_empty());
    }

    #[test]
    fn cooldown_excludes_and_recovers() {
        let table = CooldownTable::new();
        assert!(table.is_ready(Provider::OpenAi, 1_000));

        table.trip(Provider::OpenAi, 1_000, Duration::from_millis(500));
        assert!(!table.is_ready(Provider::OpenAi, 1_200));
        assert!(table.is_ready(Provider::OpenAi, 1_500));
    }

    #[test]
    fn reviewer_is_a_different_ready_backend() {
        let table = CooldownTable::new();
        let order = vec![Provider::OpenAi, Provider::Gemini, Provider::Groq];
        assert_eq!(
            pick_reviewer(&order, Provider::OpenAi, &table, 0),
            Some(Provider::Gemini)
        );

        table.trip(Provider::Gemini, 0, Duration::from_secs(600));
        assert_eq!(
            pick_reviewer(&order, Provider::OpenAi, &table, 1),
            Some(Provider::Groq)
        );
    }

    #[test]
    fn parse_tolerates_code_fences_and_prose() {
        let body = "Here you go:\n```json\n[{\"question\": \"Which probe reached Neptune first in history?\", \"options\": [\"Voyager 2\", \"Voyager 1\", \"Pioneer 10\", \"Cassini\"], \"correctIndex\": 0, \"explanation\": \"Voyager 2 flew past Neptune in 1989.\", \"difficulty\": \"hard\"}]\n```";
        let drafts = parse_drafts(body).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].correct_index, 0);
        assert_eq!(drafts[0].difficulty, Difficulty::Hard);
    }

    #[test]
    fn parse_rejects_bodies_without_an_array() {
        assert!(matches!(
            parse_drafts("no questions here"),
            Err(ProviderCallError::BadPayload(_))
        ));
    }

    #[test]
    fn timeouts_do_not_trip_cooldown() {
        assert!(!ProviderCallError::Timeout.trips_cooldown());
        assert!(!ProviderCallError::BadPayload("x".into()).trips_cooldown());
        assert!(ProviderCallError::RateLimited.trips_cooldown());
        assert!(ProviderCallError::Unauthorized.trips_cooldown());
    }
}
