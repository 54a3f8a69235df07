//! Offline question synthesizer: a pure, deterministic function from
//! (facts, theme) to question drafts. Always available as the last resort,
//! including a generic filler tier that never fails.

use std::collections::HashSet;

use crate::{
    generator::{
        context::Fact,
        validate::{Draft, normalize_prompt},
    },
    state::session::Difficulty,
};

/// Placeholder inserted where the answer was masked out of a sentence.
pub const MASK: &str = "_____";
/// Years outside this range are ignored as candidate answers.
const YEAR_RANGE: (i32, i32) = (1500, 2099);
/// Maximum words in a capitalized-entity candidate.
const MAX_ENTITY_WORDS: usize = 6;
/// Distractor years farther than this from the answer are not used.
const MAX_YEAR_DISTANCE: i32 = 35;

/// A potential answer extracted from a fact sentence.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// A four-digit year.
    Year(i32),
    /// A run of capitalized words (a name or title).
    Entity(String),
}

impl Term {
    fn text(&self) -> String {
        match self {
            Term::Year(year) => year.to_string(),
            Term::Entity(entity) => entity.clone(),
        }
    }
}

/// Pools of candidate terms across the whole fact list, used for distractors.
#[derive(Debug, Default)]
pub struct TermPools {
    /// All years seen.
    pub years: Vec<i32>,
    /// All entities seen.
    pub entities: Vec<String>,
}

/// Extract candidate answer terms from one sentence.
///
/// Sentence-initial capitalized runs are skipped: initial capitalization
/// carries no signal about being a name.
pub fn extract_terms(sentence: &str) -> Vec<Term> {
    let mut terms = Vec::new();
    let words: Vec<&str> = sentence.split_whitespace().collect();

    for (index, word) in words.iter().enumerate() {
        let bare: String = word.chars().filter(|c| c.is_ascii_digit()).collect();
        if bare.len() == 4 && bare.len() == word.trim_matches(|c: char| !c.is_alphanumeric()).len()
            && let Ok(year) = bare.parse::<i32>()
            && (YEAR_RANGE.0..=YEAR_RANGE.1).contains(&year)
        {
            terms.push(Term::Year(year));
            continue;
        }

        if index == 0 {
            continue;
        }
        if is_capitalized(word) && !is_capitalized(words[index - 1]) {
            let mut run = vec![clean_word(word)];
            let mut cursor = index + 1;
            while cursor < words.len() && run.len() < MAX_ENTITY_WORDS && is_capitalized(words[cursor])
            {
                run.push(clean_word(words[cursor]));
                cursor += 1;
            }
            let entity = run.join(" ");
            if entity.chars().count() >= 3 {
                terms.push(Term::Entity(entity));
            }
        }
    }

    terms
}

fn is_capitalized(word: &str) -> bool {
    word.chars()
        .find(|c| c.is_alphabetic())
        .is_some_and(|c| c.is_uppercase())
}

fn clean_word(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric()).to_string()
}

/// Collect term pools across all facts.
pub fn collect_pools(facts: &[Fact]) -> TermPools {
    let mut pools = TermPools::default();
    let mut seen_entities = HashSet::new();
    for fact in facts {
        for term in extract_terms(&fact.sentence) {
            match term {
                Term::Year(year) => {
                    if !pools.years.contains(&year) {
                        pools.years.push(year);
                    }
                }
                Term::Entity(entity) => {
                    if seen_entities.insert(entity.to_lowercase()) {
                        pools.entities.push(entity);
                    }
                }
            }
        }
    }
    pools
}

/// Three distinct distractor years near the answer: fixed offsets first,
/// then nearby pool entries.
pub fn year_distractors(year: i32, pool: &[i32]) -> Vec<String> {
    let mut candidates: Vec<i32> = vec![year - 1, year + 3, year - 7];
    for other in pool {
        if *other != year && (other - year).abs() <= MAX_YEAR_DISTANCE {
            candidates.push(*other);
        }
    }

    let mut distractors = Vec::new();
    for candidate in candidates {
        if candidate != year
            && (YEAR_RANGE.0..=YEAR_RANGE.1).contains(&candidate)
            && !distractors.contains(&candidate)
        {
            distractors.push(candidate);
        }
        if distractors.len() == 3 {
            break;
        }
    }
    distractors.into_iter().map(|y| y.to_string()).collect()
}

/// Three pool entities closest in length to the answer.
pub fn entity_distractors(entity: &str, pool: &[String]) -> Vec<String> {
    let target_len = entity.chars().count() as i64;
    let entity_lower = entity.to_lowercase();
    let mut candidates: Vec<&String> = pool
        .iter()
        .filter(|other| other.to_lowercase() != entity_lower)
        .collect();
    candidates.sort_by_key(|other| (other.chars().count() as i64 - target_len).abs());
    candidates.into_iter().take(3).cloned().collect()
}

fn shuffle_options(correct: String, mut distractors: Vec<String>, salt: usize) -> (Vec<String>, usize) {
    // Deterministic placement keyed by the salt keeps the synthesizer pure.
    let position = salt % 4;
    distractors.truncate(3);
    let mut options = Vec::with_capacity(4);
    for index in 0..4 {
        if index == position {
            options.push(correct.clone());
        } else if let Some(next) = distractors.pop() {
            options.push(next);
        }
    }
    (options, position)
}

/// Fill-in-the-blank built by masking the first occurrence of a term.
pub fn masked_sentence_draft(fact: &Fact, term: &Term, pools: &TermPools, salt: usize) -> Option<Draft> {
    let answer = term.text();
    let masked = fact.sentence.replacen(&answer, MASK, 1);
    if !masked.contains(MASK) {
        return None;
    }

    let distractors = match term {
        Term::Year(year) => year_distractors(*year, &pools.years),
        Term::Entity(entity) => entity_distractors(entity, &pools.entities),
    };
    if distractors.len() < 3 {
        return None;
    }

    let (options, correct_index) = shuffle_options(answer, distractors, salt);
    Some(Draft {
        prompt: format!("Fill in the blank: {masked}"),
        options,
        correct_index,
        explanation: fact.sentence.clone(),
        difficulty: match term {
            Term::Year(_) => Difficulty::Hard,
            Term::Entity(_) => Difficulty::Medium,
        },
    })
}

/// "Which statement about X is accurate?" with other facts as distractors.
pub fn statement_draft(fact: &Fact, others: &[Fact], salt: usize) -> Option<Draft> {
    if fact.sentence.chars().count() > 170 {
        return None;
    }
    let fact_key = normalize_prompt(&fact.sentence);
    let distractors: Vec<String> = others
        .iter()
        .filter(|other| {
            other.title != fact.title
                && other.sentence.chars().count() <= 170
                && normalize_prompt(&other.sentence) != fact_key
        })
        .map(|other| other.sentence.clone())
        .take(3)
        .collect();
    if distractors.len() < 3 {
        return None;
    }

    let (options, correct_index) = shuffle_options(fact.sentence.clone(), distractors, salt);
    Some(Draft {
        prompt: format!("Which statement about {} is accurate?", fact.title),
        options,
        correct_index,
        explanation: fact.sentence.clone(),
        difficulty: Difficulty::Medium,
    })
}

/// "Which subject does this statement describe?" with page titles as options.
pub fn attribution_draft(fact: &Fact, others: &[Fact], salt: usize) -> Option<Draft> {
    let mut titles: Vec<String> = Vec::new();
    for other in others {
        if other.title.to_lowercase() != fact.title.to_lowercase()
            && !titles
                .iter()
                .any(|seen| seen.to_lowercase() == other.title.to_lowercase())
        {
            titles.push(other.title.clone());
        }
        if titles.len() == 3 {
            break;
        }
    }
    if titles.len() < 3 {
        return None;
    }

    let statement: String = fact.sentence.chars().take(140).collect();
    let (options, correct_index) = shuffle_options(fact.title.clone(), titles, salt);
    Some(Draft {
        prompt: format!("Which subject does this statement describe: \"{statement}\"?"),
        options,
        correct_index,
        explanation: fact.sentence.clone(),
        difficulty: Difficulty::Medium,
    })
}

/// Mask the longest ordinary word of the sentence.
pub fn keyword_gap_draft(fact: &Fact, pools: &TermPools, salt: usize) -> Option<Draft> {
    let words: Vec<&str> = fact.sentence.split_whitespace().collect();
    let keyword = words
        .iter()
        .skip(1)
        .map(|word| clean_word(word))
        .filter(|word| word.chars().count() >= 6 && word.chars().all(|c| c.is_alphabetic()))
        .max_by_key(|word| word.chars().count())?;

    let masked = fact.sentence.replacen(&keyword, MASK, 1);
    if !masked.contains(MASK) {
        return None;
    }

    let keyword_lower = keyword.to_lowercase();
    let mut distractors: Vec<String> = Vec::new();
    for entity in &pools.entities {
        for word in entity.split_whitespace() {
            let candidate = clean_word(word);
            if candidate.chars().count() >= 6
                && candidate.to_lowercase() != keyword_lower
                && !distractors
                    .iter()
                    .any(|seen| seen.to_lowercase() == candidate.to_lowercase())
            {
                distractors.push(candidate);
            }
        }
    }
    if distractors.len() < 3 {
        return None;
    }

    let (options, correct_index) = shuffle_options(keyword, distractors, salt);
    Some(Draft {
        prompt: format!("Which word completes the statement: {masked}"),
        options,
        correct_index,
        explanation: fact.sentence.clone(),
        difficulty: Difficulty::Easy,
    })
}

/// Topic-generic filler that always validates; numbering keeps the prompts
/// distinct so the dedup pass never collapses them.
pub fn filler_draft(theme: &str, ordinal: usize) -> Draft {
    Draft {
        prompt: format!(
            "Which description best matches the topic \"{theme}\"? (question {ordinal})"
        ),
        options: vec![
            "It is the declared topic of this match".into(),
            "It is a randomly drawn unrelated subject".into(),
            "It was excluded from this match by the host".into(),
            "It is the codename of the scoring engine".into(),
        ],
        correct_index: 0,
        explanation: format!("\"{theme}\" is the topic this match was created around."),
        difficulty: Difficulty::Easy,
    }
}

/// Build up to `count` drafts from facts, in builder priority order, then
/// top up with fillers. Deterministic for a fixed input.
///
/// `ordinal_offset` keeps filler numbering distinct across invocations (team
/// B sets, supplemental batches).
pub fn synthesize(theme: &str, facts: &[Fact], count: usize, ordinal_offset: usize) -> Vec<Draft> {
    let pools = collect_pools(facts);
    let mut drafts: Vec<Draft> = Vec::new();
    let mut used_keys: HashSet<String> = HashSet::new();

    let mut push_unique = |drafts: &mut Vec<Draft>, used: &mut HashSet<String>, draft: Draft| {
        let key = normalize_prompt(&draft.prompt);
        if used.insert(key) {
            drafts.push(draft);
            true
        } else {
            false
        }
    };

    for (index, fact) in facts.iter().enumerate() {
        if drafts.len() >= count {
            break;
        }
        let salt = ordinal_offset + index;

        let built = extract_terms(&fact.sentence)
            .first()
            .and_then(|term| masked_sentence_draft(fact, term, &pools, salt))
            .or_else(|| statement_draft(fact, facts, salt))
            .or_else(|| attribution_draft(fact, facts, salt))
            .or_else(|| keyword_gap_draft(fact, &pools, salt));

        if let Some(draft) = built {
            push_unique(&mut drafts, &mut used_keys, draft);
        }
    }

    let mut ordinal = ordinal_offset + 1;
    while drafts.len() < count {
        let filler = filler_draft(theme, ordinal);
        ordinal += 1;
        push_unique(&mut drafts, &mut used_keys, filler);
    }

    drafts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::validate::{self, theme_keywords};

    fn fact(title: &str, sentence: &str) -> Fact {
        Fact {
            title: title.into(),
            sentence: sentence.into(),
            score: 1.0,
        }
    }

    #[test]
    fn extracts_years_and_entities() {
        let terms =
            extract_terms("The probe Voyager Two launched toward the planets in 1977 from Florida.");
        assert!(terms.contains(&Term::Year(1977)));
        assert!(terms.contains(&Term::Entity("Voyager Two".into())));
    }

    #[test]
    fn sentence_initial_capitals_are_not_entities() {
        let terms = extract_terms("Astronomy is the study of celestial objects.");
        assert!(terms.iter().all(|term| !matches!(term, Term::Entity(_))));
    }

    #[test]
    fn year_distractors_are_distinct_and_in_range() {
        let distractors = year_distractors(1989, &[1977, 1986, 2004]);
        assert_eq!(distractors.len(), 3);
        let mut unique = distractors.clone();
        unique.dedup();
        assert_eq!(unique.len(), 3);
        assert!(!distractors.contains(&"1989".to_string()));
    }

    #[test]
    fn masked_draft_replaces_the_answer() {
        let pools = TermPools {
            years: vec![1977, 1986, 2004],
            entities: Vec::new(),
        };
        let source = fact(
            "Voyager 2",
            "The flyby of Neptune by the probe happened during August 1989 as planned.",
        );
        let draft = masked_sentence_draft(&source, &Term::Year(1989), &pools, 0).unwrap();
        assert!(draft.prompt.contains(MASK));
        assert!(!draft.prompt.contains("1989"));
        assert_eq!(draft.options[draft.correct_index], "1989");
    }

    #[test]
    fn statement_draft_needs_three_foreign_sentences() {
        let facts = vec![
            fact("Voyager 2", "The probe flew past Neptune during the late summer of 1989."),
            fact("Pioneer 10", "The craft was first to traverse the asteroid belt successfully."),
            fact("Cassini", "The orbiter studied Saturn and its moons for thirteen years."),
            fact("New Horizons", "The mission returned the first close images of Pluto."),
        ];
        let draft = statement_draft(&facts[0], &facts, 1).unwrap();
        assert_eq!(draft.options.len(), 4);
        assert_eq!(
            draft.options[draft.correct_index],
            facts[0].sentence
        );
    }

    #[test]
    fn zero_facts_still_yields_full_validated_set() {
        let drafts = synthesize("space probes", &[], 5, 0);
        assert_eq!(drafts.len(), 5);

        let keywords = theme_keywords("space probes");
        let mut keys = HashSet::new();
        for draft in drafts {
            let scored = validate::evaluate(draft, &keywords, None, true)
                .expect("filler drafts must pass validation");
            assert!(keys.insert(normalize_prompt(&scored.draft.prompt)));
        }
    }

    #[test]
    fn synthesize_is_deterministic() {
        let facts = vec![fact(
            "Voyager 2",
            "The flyby of Neptune by the probe happened during August 1989 as planned.",
        )];
        let first = synthesize("space probes", &facts, 3, 0);
        let second = synthesize("space probes", &facts, 3, 0);
        let prompts: Vec<&String> = first.iter().map(|d| &d.prompt).collect();
        let prompts_again: Vec<&String> = second.iter().map(|d| &d.prompt).collect();
        assert_eq!(prompts, prompts_again);
    }
}
