//! Optional illustrative-image enrichment. Runs after question sets are
//! final, under a global wall-clock budget; any failure or timeout leaves a
//! question without an image and never blocks match start.

use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use dashmap::DashMap;
use serde::Deserialize;
use tokio::{
    sync::Semaphore,
    time::{Instant, timeout, timeout_at},
};
use tracing::debug;

use crate::state::session::{Question, QuestionSets};

/// Concurrent lookups allowed inside the enrichment pass.
const WORKERS: usize = 3;
/// Thumbnail width requested from the image source.
const THUMB_WIDTH: u32 = 640;

/// Content policy derived from the question text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImagePolicy {
    /// Whether flags, emblems, and vector art are acceptable.
    pub allow_symbols: bool,
    /// Whether natural-subject imagery should be preferred.
    pub prefer_nature: bool,
}

/// Derive the image policy from a question's combined text.
pub fn policy_for(text: &str) -> ImagePolicy {
    let lower = text.to_lowercase();
    let allow_symbols = ["flag", "emblem", "coat of arms", "symbol", "logo"]
        .iter()
        .any(|marker| lower.contains(marker));
    let prefer_nature = ["animal", "bird", "plant", "forest", "wildlife", "nature", "river"]
        .iter()
        .any(|marker| lower.contains(marker));
    ImagePolicy {
        allow_symbols,
        prefer_nature,
    }
}

/// Pick the lookup query for a question: the correct option when it is a
/// substantial phrase, the prompt's leading words otherwise.
pub fn pick_query(question: &Question) -> String {
    let correct = question
        .options
        .get(question.correct_index)
        .map(String::as_str)
        .unwrap_or("");
    if correct.chars().count() >= 4 && !correct.chars().all(|c| c.is_ascii_digit()) {
        return correct.to_string();
    }
    question
        .prompt
        .split_whitespace()
        .take(6)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a candidate URL satisfies the policy.
pub fn candidate_acceptable(url: &str, policy: ImagePolicy) -> bool {
    let lower = url.to_lowercase();
    if !policy.allow_symbols && (lower.ends_with(".svg") || lower.contains("flag")) {
        return false;
    }
    true
}

/// Enrich both team sets in place. Lookups still in flight when the global
/// budget expires are cancelled; whatever resolved by then is kept.
pub async fn enrich_sets(
    http: &reqwest::Client,
    cache: &DashMap<String, String>,
    sets: &mut QuestionSets,
    budget: Duration,
    per_fetch: Duration,
) {
    let fetch = |query: String| {
        let http = http.clone();
        async move { lookup_image(&http, &query).await }
    };
    enrich_sets_with(cache, sets, budget, per_fetch, fetch).await;
}

/// The enrichment pass over an injectable fetcher. Each lookup races both
/// its own timeout and the shared budget deadline, so a slow fetch can only
/// lose its own slot.
async fn enrich_sets_with<F, Fut>(
    cache: &DashMap<String, String>,
    sets: &mut QuestionSets,
    budget: Duration,
    per_fetch: Duration,
    fetch: F,
) where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Option<String>>,
{
    let mut queries: Vec<(usize, String, ImagePolicy)> = Vec::new();
    for (index, question) in sets.team_a.iter().chain(sets.team_b.iter()).enumerate() {
        let policy = policy_for(&format!("{} {}", question.prompt, question.explanation));
        queries.push((index, pick_query(question), policy));
    }

    let deadline = Instant::now() + budget;
    let semaphore = Arc::new(Semaphore::new(WORKERS));
    let fetch = &fetch;
    let lookups = queries.into_iter().map(|(index, query, policy)| {
        let semaphore = semaphore.clone();
        let cached = cache.get(&query).map(|entry| entry.clone());
        async move {
            if let Some(url) = cached {
                return (index, Some(url));
            }
            let Ok(_permit) = semaphore.acquire().await else {
                return (index, None);
            };
            let url = match timeout_at(deadline, timeout(per_fetch, fetch(query))).await {
                Ok(Ok(Some(url))) if candidate_acceptable(&url, policy) => Some(url),
                _ => None,
            };
            (index, url)
        }
    });

    let resolved: HashMap<usize, String> = futures::future::join_all(lookups)
        .await
        .into_iter()
        .filter_map(|(index, url)| url.map(|url| (index, url)))
        .collect();
    debug!(resolved = resolved.len(), "image enrichment finished");

    let team_a_len = sets.team_a.len();
    for (index, url) in resolved {
        let slot = if index < team_a_len {
            sets.team_a.get_mut(index)
        } else {
            sets.team_b.get_mut(index - team_a_len)
        };
        if let Some(question) = slot {
            cache.insert(pick_query(question), url.clone());
            question.image_url = Some(url);
        }
    }
}

#[derive(Deserialize)]
struct ImageSearchResponse {
    query: Option<ImageSearchQuery>,
}

#[derive(Deserialize)]
struct ImageSearchQuery {
    pages: HashMap<String, ImagePage>,
}

#[derive(Deserialize)]
struct ImagePage {
    thumbnail: Option<Thumbnail>,
}

#[derive(Deserialize)]
struct Thumbnail {
    source: String,
}

async fn lookup_image(http: &reqwest::Client, query: &str) -> Option<String> {
    let response: ImageSearchResponse = http
        .get("https://en.wikipedia.org/w/api.php")
        .query(&[
            ("action", "query"),
            ("generator", "search"),
            ("gsrsearch", query),
            ("gsrlimit", "3"),
            ("prop", "pageimages"),
            ("piprop", "thumbnail"),
            ("pithumbsize", &THUMB_WIDTH.to_string()),
            ("format", "json"),
        ])
        .send()
        .await
        .ok()?
        .json()
        .await
        .ok()?;

    response
        .query?
        .pages
        .into_values()
        .filter_map(|page| page.thumbnail.map(|thumbnail| thumbnail.source))
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::Difficulty;
    use uuid::Uuid;

    fn question(prompt: &str, correct: &str) -> Question {
        Question {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            options: vec![
                correct.into(),
                "other one".into(),
                "other two".into(),
                "other three".into(),
            ],
            correct_index: 0,
            explanation: String::new(),
            difficulty: Difficulty::Medium,
            image_url: None,
        }
    }

    #[test]
    fn policy_detects_symbols_and_nature() {
        assert!(policy_for("Which flag shows a red maple leaf?").allow_symbols);
        assert!(policy_for("Which bird migrates the farthest?").prefer_nature);
        let plain = policy_for("Which probe visited Neptune?");
        assert!(!plain.allow_symbols && !plain.prefer_nature);
    }

    #[test]
    fn query_prefers_the_correct_option() {
        let q = question("Which probe reached Neptune first?", "Voyager 2");
        assert_eq!(pick_query(&q), "Voyager 2");

        let numeric = question("Which year did the flyby happen in history?", "1989");
        assert_eq!(pick_query(&numeric), "Which year did the flyby happen");
    }

    #[test]
    fn svg_and_flags_need_the_symbol_policy() {
        let strict = ImagePolicy::default();
        assert!(!candidate_acceptable("https://x/flag_of_mars.png", strict));
        assert!(!candidate_acceptable("https://x/logo.svg", strict));
        assert!(candidate_acceptable("https://x/probe.jpg", strict));

        let permissive = ImagePolicy {
            allow_symbols: true,
            prefer_nature: false,
        };
        assert!(candidate_acceptable("https://x/flag_of_mars.png", permissive));
    }

    #[tokio::test(start_paused = true)]
    async fn budget_expiry_keeps_lookups_that_already_resolved() {
        let cache = DashMap::new();
        let mut sets = QuestionSets {
            team_a: vec![question("Which probe reached Neptune first in history?", "Voyager 2")],
            team_b: vec![question("Which orbiter studied Saturn the longest?", "Cassini")],
        };
        let fetch = |query: String| async move {
            if query.contains("Voyager") {
                Some("https://x/fast.jpg".to_string())
            } else {
                tokio::time::sleep(Duration::from_secs(120)).await;
                Some("https://x/slow.jpg".to_string())
            }
        };

        enrich_sets_with(
            &cache,
            &mut sets,
            Duration::from_secs(9),
            Duration::from_secs(300),
            fetch,
        )
        .await;

        assert_eq!(sets.team_a[0].image_url.as_deref(), Some("https://x/fast.jpg"));
        assert!(sets.team_b[0].image_url.is_none());
    }
}
