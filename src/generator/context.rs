//! Fact context gathering: open-encyclopedia search and extracts turned into
//! a ranked list of short factual sentences, cached per topic.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use dashmap::DashMap;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::state::session::now_ms;

/// Upper bound on cached topics; the oldest entry is evicted beyond this.
const MAX_CACHE_ENTRIES: usize = 120;
/// Upper bound on facts kept per topic.
const MAX_FACTS: usize = 160;
/// Search hits fetched per query.
const SEARCH_LIMIT: usize = 4;
/// Search queries issued per language, at most.
const MAX_QUERIES: usize = 6;
/// Languages tried in order; the second is only consulted when the first
/// yields too little material.
const LANGS: [&str; 2] = ["en", "ru"];
/// Enough facts to stop consulting further languages.
const SUFFICIENT_FACTS: usize = 24;

/// One ranked factual sentence extracted from a source page.
#[derive(Debug, Clone)]
pub struct Fact {
    /// Title of the page the sentence came from.
    pub title: String,
    /// The sentence itself.
    pub sentence: String,
    /// Ranking score; higher means more relevant and simpler.
    pub score: f32,
}

/// The gathered, ranked fact list for one topic.
#[derive(Debug, Default)]
pub struct TopicContext {
    /// Ranked facts, best first.
    pub facts: Vec<Fact>,
    /// Gathering timestamp, for TTL checks.
    pub gathered_at: u64,
}

impl TopicContext {
    /// Lowercased concatenation of all fact text, used for support checks.
    pub fn facts_lower(&self) -> String {
        self.facts
            .iter()
            .map(|fact| format!("{} {}", fact.title, fact.sentence))
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

/// TTL cache of topic contexts keyed by the lowercased topic.
#[derive(Default)]
pub struct ContextCache {
    entries: DashMap<String, Arc<TopicContext>>,
}

impl ContextCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a still-fresh entry.
    pub fn get(&self, topic: &str, ttl: Duration) -> Option<Arc<TopicContext>> {
        let key = topic.trim().to_lowercase();
        let entry = self.entries.get(&key)?;
        let age = now_ms().saturating_sub(entry.gathered_at);
        if age > ttl.as_millis() as u64 {
            drop(entry);
            self.entries.remove(&key);
            return None;
        }
        Some(entry.clone())
    }

    /// Insert an entry, evicting the oldest when the cache is full.
    pub fn insert(&self, topic: &str, context: Arc<TopicContext>) {
        if self.entries.len() >= MAX_CACHE_ENTRIES {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().gathered_at)
                .map(|entry| entry.key().clone());
            if let Some(key) = oldest {
                self.entries.remove(&key);
            }
        }
        self.entries
            .insert(topic.trim().to_lowercase(), context);
    }
}

/// Gather the fact context for a topic, consulting the cache first.
///
/// Network failures degrade to an empty (but cached) context; generation
/// falls through to open-knowledge prompts and the synthesizer's filler tier.
pub async fn gather(
    http: &reqwest::Client,
    cache: &ContextCache,
    topic: &str,
    ttl: Duration,
) -> Arc<TopicContext> {
    if let Some(hit) = cache.get(topic, ttl) {
        return hit;
    }

    let keywords = super::validate::theme_keywords(topic);
    let queries = build_search_queries(topic);
    let mut facts: Vec<Fact> = Vec::new();
    let mut fetched: HashSet<String> = HashSet::new();

    'languages: for lang in LANGS {
        for query in &queries {
            let titles = match search_titles(http, lang, query).await {
                Ok(titles) => titles,
                Err(err) => {
                    warn!(lang, query = query.as_str(), error = %err, "encyclopedia search failed");
                    continue;
                }
            };

            for title in titles {
                // Broad queries overlap heavily; fetch each page once.
                if !fetched.insert(format!("{lang}:{}", title.to_lowercase())) {
                    continue;
                }
                match fetch_extract(http, lang, &title).await {
                    Ok(extract) => {
                        collect_facts(&mut facts, &title, &extract, topic, &keywords);
                    }
                    Err(err) => {
                        debug!(lang, title, error = %err, "extract fetch failed");
                    }
                }
                if facts.len() >= SUFFICIENT_FACTS {
                    break 'languages;
                }
            }
        }
    }

    facts.sort_by(|a, b| b.score.total_cmp(&a.score));
    facts.truncate(MAX_FACTS);
    debug!(topic, count = facts.len(), "gathered fact context");

    let context = Arc::new(TopicContext {
        facts,
        gathered_at: now_ms(),
    });
    cache.insert(topic, context.clone());
    context
}

/// Fan a topic out into search queries: the raw theme first, then for
/// multi-word themes the quoted theme and keyword compounds, deduplicated
/// and capped at [`MAX_QUERIES`].
pub fn build_search_queries(topic: &str) -> Vec<String> {
    let trimmed = topic.trim();
    let mut queries = vec![trimmed.to_string()];

    let keywords = super::validate::theme_keywords(trimmed);
    if keywords.len() > 1 {
        queries.push(format!("\"{trimmed}\""));
        queries.push(keywords.join(" "));
        for pair in keywords.windows(2) {
            queries.push(pair.join(" "));
        }
        for keyword in &keywords {
            queries.push(keyword.clone());
        }
    }

    let mut seen = HashSet::new();
    queries.retain(|query| seen.insert(query.to_lowercase()));
    queries.truncate(MAX_QUERIES);
    queries
}

#[derive(Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Deserialize)]
struct SearchQuery {
    search: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Deserialize)]
struct ExtractResponse {
    query: Option<ExtractQuery>,
}

#[derive(Deserialize)]
struct ExtractQuery {
    pages: HashMap<String, ExtractPage>,
}

#[derive(Deserialize)]
struct ExtractPage {
    #[serde(default)]
    extract: String,
}

async fn search_titles(
    http: &reqwest::Client,
    lang: &str,
    query: &str,
) -> Result<Vec<String>, reqwest::Error> {
    let url = format!("https://{lang}.wikipedia.org/w/api.php");
    let response: SearchResponse = http
        .get(&url)
        .query(&[
            ("action", "query"),
            ("list", "search"),
            ("srsearch", query),
            ("srlimit", &SEARCH_LIMIT.to_string()),
            ("format", "json"),
        ])
        .send()
        .await?
        .json()
        .await?;

    Ok(response
        .query
        .map(|query| query.search.into_iter().map(|hit| hit.title).collect())
        .unwrap_or_default())
}

async fn fetch_extract(
    http: &reqwest::Client,
    lang: &str,
    title: &str,
) -> Result<String, reqwest::Error> {
    let url = format!("https://{lang}.wikipedia.org/w/api.php");
    let response: ExtractResponse = http
        .get(&url)
        .query(&[
            ("action", "query"),
            ("prop", "extracts"),
            ("explaintext", "1"),
            ("exintro", "0"),
            ("titles", title),
            ("format", "json"),
        ])
        .send()
        .await?
        .json()
        .await?;

    Ok(response
        .query
        .map(|query| {
            query
                .pages
                .into_values()
                .map(|page| page.extract)
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default())
}

fn collect_facts(
    facts: &mut Vec<Fact>,
    title: &str,
    extract: &str,
    topic: &str,
    keywords: &[String],
) {
    let topic_lower = topic.to_lowercase();
    let title_lower = title.to_lowercase();

    for sentence in split_sentences(extract) {
        if !is_sentence_clean(&sentence) {
            continue;
        }
        let score = fact_score(&sentence, &topic_lower, &title_lower, keywords);
        facts.push(Fact {
            title: title.to_string(),
            sentence,
            score,
        });
    }
}

/// Split plain text into sentences on terminal punctuation.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if matches!(c, '\n' | '\r') {
            if !current.trim().is_empty() {
                sentences.push(current.trim().to_string());
            }
            current.clear();
            continue;
        }
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Readability filter: length bounds, letter ratio, script consistency, and
/// boilerplate rejection.
pub fn is_sentence_clean(sentence: &str) -> bool {
    let char_count = sentence.chars().count();
    if !(45..=210).contains(&char_count) {
        return false;
    }

    let word_count = sentence.split_whitespace().count();
    if !(8..=38).contains(&word_count) {
        return false;
    }

    let letters = sentence.chars().filter(|c| c.is_alphabetic()).count();
    if (letters as f32) / (char_count as f32) < 0.46 {
        return false;
    }

    // A word mixing Latin and Cyrillic scripts is OCR noise or markup residue.
    for word in sentence.split_whitespace() {
        let has_latin = word.chars().any(|c| c.is_ascii_alphabetic());
        let has_cyrillic = word.chars().any(|c| ('\u{0400}'..='\u{04FF}').contains(&c));
        if has_latin && has_cyrillic {
            return false;
        }
    }

    const BOILERPLATE: &[&str] = &[
        "may refer to",
        "disambiguation",
        "citation needed",
        "this article",
        "see also",
        "external links",
        "isbn",
        "==",
    ];
    let lower = sentence.to_lowercase();
    if BOILERPLATE.iter().any(|marker| lower.contains(marker)) {
        return false;
    }

    true
}

fn fact_score(sentence: &str, topic_lower: &str, title_lower: &str, keywords: &[String]) -> f32 {
    let lower = sentence.to_lowercase();
    let relevance = keywords
        .iter()
        .filter(|keyword| lower.contains(keyword.as_str()))
        .count() as f32;
    let title_match = if title_lower.contains(topic_lower) || topic_lower.contains(title_lower) {
        1.0
    } else {
        0.0
    };
    // Shorter sentences make better question material.
    let simplicity = 1.0 - (sentence.chars().count() as f32 / 210.0);

    relevance * 2.0 + title_match + simplicity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_sentences_handles_terminal_punctuation_and_newlines() {
        let text = "Voyager 2 launched in 1977. It reached Neptune in 1989!\nA bare line";
        let sentences = split_sentences(text);
        assert_eq!(sentences.len(), 3);
        assert_eq!(sentences[0], "Voyager 2 launched in 1977.");
        assert_eq!(sentences[2], "A bare line");
    }

    #[test]
    fn clean_filter_rejects_boilerplate_and_extremes() {
        assert!(is_sentence_clean(
            "Voyager 2 made its closest approach to the planet Neptune on 25 August 1989."
        ));
        assert!(!is_sentence_clean("Too short."));
        assert!(!is_sentence_clean(
            "This article is about the space probe and it may refer to several different launches over many years."
        ));
        let digits = "1234567890 ".repeat(8);
        assert!(!is_sentence_clean(digits.trim()));
    }

    #[test]
    fn mixed_script_words_are_rejected() {
        assert!(!is_sentence_clean(
            "The probe Вoyager travelled far beyond the orbit of Neptune during its long mission years."
        ));
    }

    #[test]
    fn cache_honours_ttl_and_capacity() {
        let cache = ContextCache::new();
        let context = Arc::new(TopicContext {
            facts: Vec::new(),
            gathered_at: now_ms(),
        });
        cache.insert("Space Probes", context);
        assert!(cache.get("space probes", Duration::from_secs(60)).is_some());
        assert!(cache.get("space probes", Duration::from_millis(0)).is_none());
        // The zero-TTL miss also evicted the stale entry.
        assert!(cache.get("space probes", Duration::from_secs(60)).is_none());
    }

    #[test]
    fn multi_word_topics_fan_out_into_a_capped_query_list() {
        let queries = build_search_queries("deep space probes");
        assert_eq!(queries[0], "deep space probes");
        assert!(queries.contains(&"\"deep space probes\"".to_string()));
        assert!(queries.contains(&"space probes".to_string()));
        assert_eq!(queries.len(), MAX_QUERIES);

        let mut seen = HashSet::new();
        assert!(queries.iter().all(|query| seen.insert(query.to_lowercase())));
    }

    #[test]
    fn single_word_topics_issue_one_query() {
        assert_eq!(build_search_queries(" Neptune "), vec!["Neptune".to_string()]);
    }

    #[test]
    fn relevant_sentences_outrank_generic_ones() {
        let keywords = crate::generator::validate::theme_keywords("neptune probes");
        let relevant = fact_score(
            "Voyager 2 is the only probe to have visited Neptune up close.",
            "neptune probes",
            "voyager 2",
            &keywords,
        );
        let generic = fact_score(
            "The agency was founded following a long political debate.",
            "neptune probes",
            "nasa",
            &keywords,
        );
        assert!(relevant > generic);
    }
}
