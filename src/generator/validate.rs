//! Candidate validation, normalization, and quality scoring.
//!
//! Every candidate coming out of a backend or the synthesizer passes through
//! [`evaluate`] before it can reach a question set. The numeric thresholds
//! are tunable heuristics, not invariants.

use crate::state::session::Difficulty;

/// Minimum prompt length after trimming.
pub const MIN_PROMPT_LEN: usize = 16;
/// Maximum prompt length.
pub const MAX_PROMPT_LEN: usize = 240;
/// Maximum length of a single option.
pub const MAX_OPTION_LEN: usize = 180;
/// Maximum explanation length; longer text is truncated, not rejected.
pub const MAX_EXPLANATION_LEN: usize = 320;
/// Number of options every question must carry.
pub const OPTION_COUNT: usize = 4;

/// Acceptance threshold for backend candidates that match the theme.
pub const ACCEPT_SCORE: i32 = 58;
/// Stricter threshold for candidates with no theme-relevance hits.
pub const OFF_THEME_ACCEPT_SCORE: i32 = 70;
/// Relaxed threshold for synthesizer output.
pub const LOCAL_ACCEPT_SCORE: i32 = 50;

/// An unvalidated question candidate.
#[derive(Debug, Clone)]
pub struct Draft {
    /// Prompt text.
    pub prompt: String,
    /// Candidate options.
    pub options: Vec<String>,
    /// Index of the correct option.
    pub correct_index: usize,
    /// Explanation text.
    pub explanation: String,
    /// Difficulty tag.
    pub difficulty: Difficulty,
}

/// A draft that survived validation, with its quality score.
#[derive(Debug, Clone)]
pub struct ScoredDraft {
    /// The normalized draft.
    pub draft: Draft,
    /// Quality score; higher is better.
    pub score: i32,
}

/// Collapse a prompt to its comparable form: lowercase alphanumerics only.
/// Two questions with equal keys are considered semantic duplicates.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Lowercased theme keywords of three or more characters.
pub fn theme_keywords(theme: &str) -> Vec<String> {
    theme
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= 3)
        .map(|word| word.to_lowercase())
        .collect()
}

/// Enforce structural bounds and return the trimmed draft, or reject it.
pub fn normalize_draft(draft: Draft) -> Option<Draft> {
    let prompt = draft.prompt.trim().to_string();
    if prompt.chars().count() < MIN_PROMPT_LEN || prompt.chars().count() > MAX_PROMPT_LEN {
        return None;
    }

    let options: Vec<String> = draft
        .options
        .iter()
        .map(|option| option.trim().to_string())
        .filter(|option| !option.is_empty() && option.chars().count() <= MAX_OPTION_LEN)
        .collect();
    if options.len() != OPTION_COUNT {
        return None;
    }

    // Options must be pairwise distinct under normalization.
    for (index, option) in options.iter().enumerate() {
        let key = normalize_prompt(option);
        if key.is_empty() {
            return None;
        }
        if options
            .iter()
            .skip(index + 1)
            .any(|other| normalize_prompt(other) == key)
        {
            return None;
        }
    }

    if draft.correct_index >= OPTION_COUNT {
        return None;
    }

    let mut explanation = draft.explanation.trim().to_string();
    if explanation.chars().count() > MAX_EXPLANATION_LEN {
        explanation = explanation.chars().take(MAX_EXPLANATION_LEN).collect();
    }

    Some(Draft {
        prompt,
        options,
        correct_index: draft.correct_index,
        explanation,
        difficulty: draft.difficulty,
    })
}

/// Stock fillers and placeholder shapes that mark a lazy option set.
pub fn has_generic_options(options: &[String]) -> bool {
    const STOCK: &[&str] = &[
        "yes",
        "no",
        "true",
        "false",
        "unknown",
        "other",
        "thing",
        "place",
        "person",
        "object",
        "all of the above",
        "none of the above",
        "all answers are correct",
    ];

    options.iter().any(|option| {
        let lower = option.trim().to_lowercase();
        if STOCK.contains(&lower.as_str()) {
            return true;
        }
        // Placeholder shapes like "option a" / "variant 2".
        let mut words = lower.split_whitespace();
        match (words.next(), words.next(), words.next()) {
            (Some(head), Some(tail), None) => {
                matches!(head, "option" | "variant" | "answer" | "choice")
                    && tail.chars().count() <= 2
            }
            _ => false,
        }
    })
}

/// Tokens worth matching against the fact context: lowercase words of four or
/// more characters plus 2-4 digit numbers.
fn support_tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| {
            let len = token.chars().count();
            if token.chars().all(|c| c.is_ascii_digit()) {
                (2..=4).contains(&len)
            } else {
                len >= 4
            }
        })
        .map(|token| token.to_lowercase())
        .collect()
}

/// True when the correct option or explanation shares at least one support
/// token with the gathered facts.
pub fn is_fact_supported(draft: &Draft, facts_lower: &str) -> bool {
    let correct = draft
        .options
        .get(draft.correct_index)
        .map(String::as_str)
        .unwrap_or("");
    let mut tokens = support_tokens(correct);
    tokens.extend(support_tokens(&draft.explanation));
    tokens.into_iter().any(|token| facts_lower.contains(&token))
}

/// Count theme keywords appearing anywhere in the draft's text.
pub fn relevance_hits(draft: &Draft, keywords: &[String]) -> usize {
    let haystack = format!(
        "{} {} {}",
        draft.prompt,
        draft.options.join(" "),
        draft.explanation
    )
    .to_lowercase();
    keywords
        .iter()
        .filter(|keyword| haystack.contains(keyword.as_str()))
        .count()
}

/// Score a normalized draft. Starts at 100, penalizes structural weaknesses,
/// and credits theme relevance.
pub fn quality_score(draft: &Draft, keywords: &[String]) -> i32 {
    let mut score = 100i32;

    let prompt_len = draft.prompt.chars().count();
    if prompt_len < 24 {
        score -= 15;
    }
    if prompt_len > 200 {
        score -= 10;
    }

    if has_generic_options(&draft.options) {
        score -= 25;
    }

    let lengths: Vec<usize> = draft
        .options
        .iter()
        .map(|option| option.chars().count())
        .collect();
    let spread = lengths.iter().max().unwrap_or(&0) - lengths.iter().min().unwrap_or(&0);
    if spread > 65 {
        score -= 12;
    }

    if draft.explanation.chars().count() < 24 {
        score -= 8;
    }

    let hits = relevance_hits(draft, keywords) as i32;
    score += (hits * 2).min(14);

    score
}

/// Validate, score, and filter one candidate.
///
/// `facts_lower` is the lowercased concatenation of the gathered fact text;
/// when present, unsupported candidates are rejected outright. `local`
/// relaxes the acceptance threshold for synthesizer output.
pub fn evaluate(
    draft: Draft,
    keywords: &[String],
    facts_lower: Option<&str>,
    local: bool,
) -> Option<ScoredDraft> {
    let draft = normalize_draft(draft)?;

    if let Some(facts) = facts_lower
        && !facts.is_empty()
        && !is_fact_supported(&draft, facts)
    {
        return None;
    }

    let score = quality_score(&draft, keywords);
    let threshold = if local {
        LOCAL_ACCEPT_SCORE
    } else if relevance_hits(&draft, keywords) == 0 {
        OFF_THEME_ACCEPT_SCORE
    } else {
        ACCEPT_SCORE
    };

    if score < threshold {
        return None;
    }

    Some(ScoredDraft { draft, score })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(prompt: &str, options: [&str; 4], correct: usize, explanation: &str) -> Draft {
        Draft {
            prompt: prompt.into(),
            options: options.iter().map(|s| s.to_string()).collect(),
            correct_index: correct,
            explanation: explanation.into(),
            difficulty: Difficulty::Medium,
        }
    }

    #[test]
    fn normalize_rejects_short_prompts_and_duplicate_options() {
        let short = draft("Too short?", ["a1", "b2", "c3", "d4"], 0, "");
        assert!(normalize_draft(short).is_none());

        let dupes = draft(
            "Which probe reached Neptune first in history?",
            ["Voyager 2", "voyager 2", "Pioneer 10", "Cassini"],
            0,
            "",
        );
        assert!(normalize_draft(dupes).is_none());
    }

    #[test]
    fn normalize_truncates_long_explanations() {
        let long_explanation = "x".repeat(400);
        let candidate = draft(
            "Which probe reached Neptune first in history?",
            ["Voyager 2", "Voyager 1", "Pioneer 10", "Cassini"],
            0,
            &long_explanation,
        );
        let normalized = normalize_draft(candidate).unwrap();
        assert_eq!(normalized.explanation.chars().count(), MAX_EXPLANATION_LEN);
    }

    #[test]
    fn normalized_prompt_ignores_case_and_punctuation() {
        assert_eq!(
            normalize_prompt("Which probe reached Neptune?"),
            normalize_prompt("which PROBE reached, neptune")
        );
    }

    #[test]
    fn generic_options_are_flagged() {
        assert!(has_generic_options(&[
            "Voyager 2".into(),
            "None of the above".into(),
            "Pioneer 10".into(),
            "Cassini".into(),
        ]));
        assert!(has_generic_options(&[
            "Option A".into(),
            "Voyager 2".into(),
            "Pioneer 10".into(),
            "Cassini".into(),
        ]));
        assert!(!has_generic_options(&[
            "Voyager 2".into(),
            "Voyager 1".into(),
            "Pioneer 10".into(),
            "Cassini".into(),
        ]));
    }

    #[test]
    fn fact_support_matches_tokens_and_numbers() {
        let candidate = draft(
            "Which year did Voyager 2 pass Neptune on its tour?",
            ["1989", "1977", "1993", "1981"],
            0,
            "The flyby happened in 1989.",
        );
        assert!(is_fact_supported(
            &candidate,
            "voyager 2 made its closest approach to neptune in 1989"
        ));
        assert!(!is_fact_supported(&candidate, "unrelated text about rivers"));
    }

    #[test]
    fn evaluate_enforces_stricter_threshold_off_theme() {
        let keywords = theme_keywords("space probes");
        let on_theme = draft(
            "Which space probe visited Neptune during its mission?",
            ["Voyager 2", "Voyager 1", "Pioneer 10", "Cassini"],
            0,
            "Voyager 2 is the only probe to have visited Neptune.",
        );
        assert!(evaluate(on_theme, &keywords, None, false).is_some());

        // No keyword hits, a stock filler option, and a weak explanation:
        // scores 67, over the themed bar but below the off-theme one.
        let off_theme = draft(
            "Which river is the longest one in the world?",
            ["Nile", "Amazon", "Yangtze", "None of the above"],
            0,
            "short",
        );
        assert!(evaluate(off_theme.clone(), &keywords, None, false).is_none());
        assert!(evaluate(off_theme, &keywords, None, true).is_some());
    }
}
