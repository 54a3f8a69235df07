//! Question generation pipeline: fact context, backend orchestration,
//! validation, offline synthesis, cross-team harmonization, and image
//! enrichment.

/// Fact context gathering and caching.
pub mod context;
/// Illustrative-image enrichment.
pub mod images;
/// External backend orchestration.
pub mod providers;
/// Offline fact-driven synthesizer.
pub mod synthesizer;
/// Candidate validation and quality scoring.
pub mod validate;

use std::{collections::HashSet, time::Duration};

use tracing::{info, warn};
use uuid::Uuid;

use crate::state::{
    SharedState,
    session::{Question, QuestionSets, now_ms},
};
use context::Fact;
use providers::{AiMode, Provider, ProviderCallError};
use validate::{Draft, ScoredDraft, normalize_prompt};

/// The supplemental gather never waits longer than this, whatever the
/// configured fallback budget says.
const SUPPLEMENT_GATHER_CAP: Duration = Duration::from_secs(14);

fn supplement_gather_budget(configured: Duration) -> Duration {
    configured.min(SUPPLEMENT_GATHER_CAP)
}

/// Everything the pipeline needs to produce question sets for one match.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Free-text topic.
    pub topic: String,
    /// Questions per team set.
    pub count: usize,
    /// Optional tone hint forwarded to backends.
    pub tone: Option<String>,
    /// Backend selection policy.
    pub ai_mode: AiMode,
    /// Whether a second, disjoint set is needed for team B.
    pub two_teams: bool,
}

/// The finished per-team question sets with their provenance label.
#[derive(Debug)]
pub struct GenerationOutcome {
    /// Which backends (or the synthesizer) produced the material.
    pub provider_label: String,
    /// Finalized sets, deduplicated across teams.
    pub sets: QuestionSets,
}

/// Run the full pipeline. Infallible: every failure tier falls through to
/// the synthesizer, whose filler tier always meets the requested count.
pub async fn generate(state: &SharedState, request: GenerationRequest) -> GenerationOutcome {
    let config = state.config();
    let keywords = validate::theme_keywords(&request.topic);

    let (facts, facts_lower) = if request.ai_mode == AiMode::Synthetic {
        (Vec::new(), String::new())
    } else {
        let gathered = context::gather(
            state.http(),
            state.context_cache(),
            &request.topic,
            config.context_ttl,
        )
        .await;
        (gathered.facts.clone(), gathered.facts_lower())
    };

    let order = providers::provider_order(request.ai_mode, &config.provider_keys);
    let need_total = request.count * if request.two_teams { 2 } else { 1 };

    let mut pool: Vec<ScoredDraft> = Vec::new();
    let mut used_backends: Vec<Provider> = Vec::new();

    let prompt = providers::generation_prompt(
        &request.topic,
        need_total.max(request.count),
        request.tone.as_deref(),
        &facts,
    );

    if request.ai_mode == AiMode::Hybrid {
        let ready = state.cooldowns().ready(&order, now_ms());
        let calls = ready.iter().map(|provider| {
            let prompt = prompt.clone();
            async move {
                let result = providers::request_drafts(
                    state.http(),
                    &config.provider_keys,
                    *provider,
                    &prompt,
                    config.provider_timeout,
                )
                .await;
                (*provider, result)
            }
        });
        for (provider, result) in futures::future::join_all(calls).await {
            absorb_backend_result(
                state,
                provider,
                result,
                &keywords,
                &facts_lower,
                &mut pool,
                &mut used_backends,
            );
        }
    } else {
        for provider in &order {
            if !state.cooldowns().is_ready(*provider, now_ms()) {
                continue;
            }
            let result = providers::request_drafts(
                state.http(),
                &config.provider_keys,
                *provider,
                &prompt,
                config.provider_timeout,
            )
            .await;
            absorb_backend_result(
                state,
                *provider,
                result,
                &keywords,
                &facts_lower,
                &mut pool,
                &mut used_backends,
            );
            if pool.len() >= need_total + 2 {
                break;
            }
        }
    }

    // Reviewer pass: a different ready backend polishes the draft pool; the
    // reviewed items join the pool rather than replacing it.
    if let Some(author) = used_backends.first().copied()
        && let Some(reviewer) =
            providers::pick_reviewer(&order, author, state.cooldowns(), now_ms())
        && !pool.is_empty()
    {
        let drafts: Vec<Draft> = pool.iter().map(|scored| scored.draft.clone()).collect();
        let review = providers::review_prompt(&request.topic, &drafts);
        let result = providers::request_drafts(
            state.http(),
            &config.provider_keys,
            reviewer,
            &review,
            config.provider_timeout,
        )
        .await;
        absorb_backend_result(
            state,
            reviewer,
            result,
            &keywords,
            &facts_lower,
            &mut pool,
            &mut used_backends,
        );
    }

    // Supplemental pass: when the backends leave the pool short, the
    // synthesizer fills the gap, and it needs fact material. Gathering for
    // it runs under the fallback budget; on expiry the filler tier still
    // meets the count.
    let facts = if pool.len() < need_total && facts.is_empty() {
        match tokio::time::timeout(
            supplement_gather_budget(config.fallback_generation_timeout),
            context::gather(
                state.http(),
                state.context_cache(),
                &request.topic,
                config.context_ttl,
            ),
        )
        .await
        {
            Ok(gathered) => gathered.facts.clone(),
            Err(_) => {
                warn!(topic = %request.topic, "supplemental fact gathering timed out");
                facts
            }
        }
    } else {
        facts
    };

    let (team_a, team_b) = assemble_sets(
        pool,
        &request.topic,
        &facts,
        request.count,
        request.two_teams,
    );

    let provider_label = if used_backends.is_empty() {
        "synthesizer".to_string()
    } else {
        used_backends
            .iter()
            .map(|provider| provider.label())
            .collect::<Vec<_>>()
            .join("+")
    };
    info!(
        topic = %request.topic,
        label = %provider_label,
        team_a = team_a.len(),
        team_b = team_b.len(),
        "question sets assembled"
    );

    let mut sets = QuestionSets {
        team_a: drafts_to_questions(team_a),
        team_b: drafts_to_questions(team_b),
    };

    images::enrich_sets(
        state.http(),
        state.image_cache(),
        &mut sets,
        config.image_budget,
        config.image_fetch_timeout,
    )
    .await;

    GenerationOutcome {
        provider_label,
        sets,
    }
}

/// Build sets from the offline synthesizer alone, with no network involved.
/// Used when the generation watchdog fires before a backend result lands.
pub fn offline_outcome(theme: &str, count: usize, two_teams: bool) -> GenerationOutcome {
    let (team_a, team_b) = assemble_sets(Vec::new(), theme, &[], count, two_teams);
    GenerationOutcome {
        provider_label: "synthesizer".to_string(),
        sets: QuestionSets {
            team_a: drafts_to_questions(team_a),
            team_b: drafts_to_questions(team_b),
        },
    }
}

fn absorb_backend_result(
    state: &SharedState,
    provider: Provider,
    result: Result<Vec<Draft>, ProviderCallError>,
    keywords: &[String],
    facts_lower: &str,
    pool: &mut Vec<ScoredDraft>,
    used_backends: &mut Vec<Provider>,
) {
    match result {
        Ok(drafts) => {
            let facts_filter = (!facts_lower.is_empty()).then_some(facts_lower);
            let before = pool.len();
            for draft in drafts {
                if let Some(scored) = validate::evaluate(draft, keywords, facts_filter, false) {
                    pool.push(scored);
                }
            }
            if pool.len() > before && !used_backends.contains(&provider) {
                used_backends.push(provider);
            }
        }
        Err(err) => {
            if err.trips_cooldown() {
                state.cooldowns().trip(
                    provider,
                    now_ms(),
                    state.config().provider_cooldown,
                );
            }
            warn!(provider = provider.label(), error = %err, "backend attempt failed");
        }
    }
}

/// Rank the pool and carve the per-team sets, deduplicated by normalized
/// prompt across both teams. Shortfalls fall through to the synthesizer and
/// finally to variant-tagged copies, so both sets always reach `count`.
pub fn assemble_sets(
    mut pool: Vec<ScoredDraft>,
    theme: &str,
    facts: &[Fact],
    count: usize,
    two_teams: bool,
) -> (Vec<Draft>, Vec<Draft>) {
    pool.sort_by(|a, b| b.score.cmp(&a.score));
    let keywords = validate::theme_keywords(theme);
    let mut used_keys: HashSet<String> = HashSet::new();

    let mut take_from_pool = |pool: &mut Vec<ScoredDraft>, used: &mut HashSet<String>, need: usize| {
        let mut taken = Vec::new();
        let mut rest = Vec::new();
        for scored in pool.drain(..) {
            let key = normalize_prompt(&scored.draft.prompt);
            if taken.len() < need && !used.contains(&key) {
                used.insert(key);
                taken.push(scored.draft);
            } else {
                rest.push(scored);
            }
        }
        *pool = rest;
        taken
    };

    let mut team_a = take_from_pool(&mut pool, &mut used_keys, count);
    top_up(&mut team_a, &mut used_keys, theme, facts, count, 0, &keywords);

    if !two_teams {
        return (team_a, Vec::new());
    }

    let mut team_b = take_from_pool(&mut pool, &mut used_keys, count);
    // Team B synthesizes from a rotated fact pool so both sides draw on
    // different material before the filler tier kicks in.
    let rotation = facts.len() / 3;
    let rotated: Vec<Fact> = facts
        .iter()
        .cycle()
        .skip(rotation)
        .take(facts.len())
        .cloned()
        .collect();
    top_up(
        &mut team_b,
        &mut used_keys,
        theme,
        &rotated,
        count,
        count * 2,
        &keywords,
    );

    // Final resort: paraphrase team A's items as tagged variants.
    let mut variant = 1;
    let mut source = 0;
    while team_b.len() < count && source < team_a.len() {
        let original = &team_a[source];
        source += 1;
        let draft = Draft {
            prompt: format!("{} (variant B{variant})", original.prompt),
            options: original.options.clone(),
            correct_index: original.correct_index,
            explanation: original.explanation.clone(),
            difficulty: original.difficulty,
        };
        variant += 1;
        let key = normalize_prompt(&draft.prompt);
        if used_keys.insert(key) {
            team_b.push(draft);
        }
    }

    (team_a, team_b)
}

/// Fill a set up to `count` from the synthesizer, skipping prompts already
/// used by either team.
fn top_up(
    set: &mut Vec<Draft>,
    used_keys: &mut HashSet<String>,
    theme: &str,
    facts: &[Fact],
    count: usize,
    ordinal_offset: usize,
    keywords: &[String],
) {
    if set.len() >= count {
        return;
    }

    let shortfall = count - set.len();
    let candidates = synthesizer::synthesize(theme, facts, shortfall * 2 + 2, ordinal_offset);
    for candidate in candidates {
        if set.len() >= count {
            break;
        }
        let Some(scored) = validate::evaluate(candidate, keywords, None, true) else {
            continue;
        };
        let key = normalize_prompt(&scored.draft.prompt);
        if used_keys.insert(key) {
            set.push(scored.draft);
        }
    }

    // The numbered filler template can always mint a fresh prompt.
    let mut ordinal = ordinal_offset + 100;
    while set.len() < count {
        let filler = synthesizer::filler_draft(theme, ordinal);
        ordinal += 1;
        let key = normalize_prompt(&filler.prompt);
        if used_keys.insert(key) {
            set.push(filler);
        }
    }
}

fn drafts_to_questions(drafts: Vec<Draft>) -> Vec<Question> {
    drafts
        .into_iter()
        .map(|draft| Question {
            id: Uuid::new_v4(),
            prompt: draft.prompt,
            options: draft.options,
            correct_index: draft.correct_index,
            explanation: draft.explanation,
            difficulty: draft.difficulty,
            image_url: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::Difficulty;

    fn scored(prompt: &str, score: i32) -> ScoredDraft {
        ScoredDraft {
            draft: Draft {
                prompt: prompt.into(),
                options: vec![
                    "Voyager 2".into(),
                    "Voyager 1".into(),
                    "Pioneer 10".into(),
                    "Cassini".into(),
                ],
                correct_index: 0,
                explanation: "Voyager 2 flew past Neptune in August 1989.".into(),
                difficulty: Difficulty::Medium,
            },
            score,
        }
    }

    #[test]
    fn supplemental_gather_budget_is_capped() {
        assert_eq!(
            supplement_gather_budget(Duration::from_secs(18)),
            Duration::from_secs(14)
        );
        assert_eq!(
            supplement_gather_budget(Duration::from_secs(5)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn empty_pool_and_zero_facts_still_fill_both_teams() {
        let (team_a, team_b) = assemble_sets(Vec::new(), "space probes", &[], 5, true);
        assert_eq!(team_a.len(), 5);
        assert_eq!(team_b.len(), 5);

        let mut keys = HashSet::new();
        for draft in team_a.iter().chain(team_b.iter()) {
            assert!(keys.insert(normalize_prompt(&draft.prompt)), "duplicate prompt");
        }
    }

    #[test]
    fn higher_scored_candidates_win_team_a_slots() {
        let pool = vec![
            scored("Which probe reached Neptune first in history?", 60),
            scored("Which probe left the heliosphere first overall?", 95),
        ];
        let (team_a, _) = assemble_sets(pool, "space probes", &[], 1, false);
        assert_eq!(
            team_a[0].prompt,
            "Which probe left the heliosphere first overall?"
        );
    }

    #[test]
    fn duplicate_prompts_never_cross_teams() {
        let pool = vec![
            scored("Which probe reached Neptune first in history?", 90),
            scored("Which Probe reached NEPTUNE first, in history?", 85),
            scored("Which probe left the heliosphere first overall?", 80),
        ];
        let (team_a, team_b) = assemble_sets(pool, "space probes", &[], 2, true);

        let mut keys = HashSet::new();
        for draft in team_a.iter().chain(team_b.iter()) {
            assert!(keys.insert(normalize_prompt(&draft.prompt)));
        }
        assert_eq!(team_a.len(), 2);
        assert_eq!(team_b.len(), 2);
    }
}
