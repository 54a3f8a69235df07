//! Vote consensus for team rounds: a pure tally over the round's immutable
//! vote ledger.

use indexmap::IndexMap;
use uuid::Uuid;

use crate::state::session::{Vote, VoteChoice};

/// Number of options per question.
const OPTION_SLOTS: usize = 4;

/// Outcome of tallying a round's votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TallyDecision {
    /// A winning option.
    Option(usize),
    /// The team collectively passed.
    Pass,
    /// Nobody voted before the tally.
    Timeout,
}

/// Tally counts exposed in snapshots: per-option counts plus passes.
pub fn tally_counts(votes: &IndexMap<Uuid, Vote>) -> ([u32; OPTION_SLOTS], u32) {
    let mut counts = [0u32; OPTION_SLOTS];
    let mut passes = 0u32;
    for vote in votes.values() {
        match vote.choice {
            VoteChoice::Option(index) if index < OPTION_SLOTS => counts[index] += 1,
            VoteChoice::Option(_) => {}
            VoteChoice::Pass => passes += 1,
        }
    }
    (counts, passes)
}

/// Decide a team round from its vote ledger.
///
/// An empty ledger is a timeout. A pass wins only when passes strictly
/// outnumber the best option. Tied options resolve to the one whose earliest
/// vote was submitted first.
pub fn decide(votes: &IndexMap<Uuid, Vote>) -> TallyDecision {
    if votes.is_empty() {
        return TallyDecision::Timeout;
    }

    let (counts, passes) = tally_counts(votes);
    let mut earliest = [u64::MAX; OPTION_SLOTS];
    for vote in votes.values() {
        if let VoteChoice::Option(index) = vote.choice
            && index < OPTION_SLOTS
        {
            earliest[index] = earliest[index].min(vote.submitted_at);
        }
    }

    // A non-empty ledger with no option votes is all passes, so the
    // strictly-greater check also covers the unanimous-pass case.
    let best = counts.iter().copied().max().unwrap_or(0);
    if passes > best {
        return TallyDecision::Pass;
    }

    let winner = (0..OPTION_SLOTS)
        .filter(|index| counts[*index] == best)
        .min_by_key(|index| earliest[*index]);
    match winner {
        Some(index) => TallyDecision::Option(index),
        None => TallyDecision::Timeout,
    }
}
