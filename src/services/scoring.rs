//! Scoring rules: points for a correct resolution and the adaptive review
//! delay between rounds. Pure functions; the round service applies them under
//! the session lock.

use crate::state::session::{Difficulty, GameplayMode, OutcomeKind};

/// Base points for any correct resolution.
const BASE_POINTS: u32 = 1;
/// Extra point for a hard question when the expert pack is active.
const EXPERT_BONUS: u32 = 1;
/// Streak bonus cap.
const MAX_STREAK_BONUS: u32 = 3;

/// Base review delay before length adjustments.
const REVIEW_BASE_MS: i64 = 4_200;
/// Extra delay per reading-length step.
const REVIEW_STEP_MS: i64 = 550;
/// Characters per reading-length step.
const REVIEW_STEP_CHARS: usize = 180;
/// Maximum reading-length steps.
const REVIEW_MAX_STEPS: usize = 4;
/// Delay reduction when there is no answer to read out.
const REVIEW_SHORTEN_MS: i64 = 600;
/// Shortened delays never drop below this.
const REVIEW_SHORTEN_FLOOR_MS: i64 = 3_000;
/// Delay extension when the result needs explaining.
const REVIEW_EXTEND_MS: i64 = 400;
/// Hard bounds on the review delay.
const REVIEW_BOUNDS_MS: (i64, i64) = (2_600, 7_000);

/// Inputs for scoring one correct resolution.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInput {
    /// Gameplay mode of the session.
    pub mode: GameplayMode,
    /// Whether the expert pack is active.
    pub expert_pack: bool,
    /// Whether the speed bonus applies in this session.
    pub speed_enabled: bool,
    /// Difficulty of the answered question.
    pub difficulty: Difficulty,
    /// Clock remaining when the deciding submission arrived.
    pub remaining_ms: u64,
    /// Full round duration.
    pub duration_ms: u64,
    /// Consecutive-correct streak including this answer.
    pub streak: u32,
}

/// Speed bonus tier: 2 with at least two thirds of the clock left, 1 with at
/// least one third, 0 otherwise.
pub fn speed_tier(remaining_ms: u64, duration_ms: u64) -> u32 {
    if duration_ms == 0 {
        return 0;
    }
    if remaining_ms * 3 >= duration_ms * 2 {
        2
    } else if remaining_ms * 3 >= duration_ms {
        1
    } else {
        0
    }
}

/// Points awarded for one correct resolution.
pub fn points_for_correct(input: ScoreInput) -> u32 {
    let profile = input.mode.profile();
    let mut points = BASE_POINTS + profile.bonus_correct;

    if input.expert_pack && input.difficulty == Difficulty::Hard {
        points += EXPERT_BONUS;
    }
    if input.speed_enabled {
        points += speed_tier(input.remaining_ms, input.duration_ms);
    }
    if profile.streak_bonus {
        points += MAX_STREAK_BONUS.min(input.streak.saturating_sub(1));
    }

    points
}

/// Review delay before the next round, scaled to how much text there is to
/// read and how the round resolved.
pub fn review_delay_ms(
    prompt_chars: usize,
    explanation_chars: usize,
    outcome: OutcomeKind,
    correct: bool,
    passed: bool,
) -> u64 {
    let steps = REVIEW_MAX_STEPS.min((prompt_chars + explanation_chars) / REVIEW_STEP_CHARS);
    let mut delay = REVIEW_BASE_MS + REVIEW_STEP_MS * steps as i64;

    match outcome {
        OutcomeKind::Timeout | OutcomeKind::Skip => {
            delay = (delay - REVIEW_SHORTEN_MS).max(REVIEW_SHORTEN_FLOOR_MS);
        }
        OutcomeKind::Answer => {
            if passed || !correct {
                delay += REVIEW_EXTEND_MS;
            }
        }
    }

    delay.clamp(REVIEW_BOUNDS_MS.0, REVIEW_BOUNDS_MS.1) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_tiers_split_the_clock_into_thirds() {
        assert_eq!(speed_tier(30_000, 30_000), 2);
        assert_eq!(speed_tier(20_000, 30_000), 2);
        assert_eq!(speed_tier(19_999, 30_000), 1);
        assert_eq!(speed_tier(10_000, 30_000), 1);
        assert_eq!(speed_tier(9_999, 30_000), 0);
        assert_eq!(speed_tier(0, 30_000), 0);
    }

    #[test]
    fn quick_correct_answer_earns_three_points() {
        // 25 of 30 seconds left lands in the top speed tier.
        let points = points_for_correct(ScoreInput {
            mode: GameplayMode::SoloArena,
            expert_pack: false,
            speed_enabled: true,
            difficulty: Difficulty::Medium,
            remaining_ms: 25_000,
            duration_ms: 30_000,
            streak: 1,
        });
        assert_eq!(points, 3);
    }

    #[test]
    fn expert_pack_pays_only_for_hard_questions() {
        let base = ScoreInput {
            mode: GameplayMode::TeamBattle,
            expert_pack: true,
            speed_enabled: false,
            difficulty: Difficulty::Medium,
            remaining_ms: 0,
            duration_ms: 30_000,
            streak: 1,
        };
        assert_eq!(points_for_correct(base), 1);
        assert_eq!(
            points_for_correct(ScoreInput {
                difficulty: Difficulty::Hard,
                ..base
            }),
            2
        );
    }

    #[test]
    fn combo_rush_streak_is_capped() {
        let input = |streak| ScoreInput {
            mode: GameplayMode::ComboRush,
            expert_pack: false,
            speed_enabled: false,
            difficulty: Difficulty::Medium,
            remaining_ms: 0,
            duration_ms: 30_000,
            streak,
        };
        assert_eq!(points_for_correct(input(1)), 1);
        assert_eq!(points_for_correct(input(2)), 2);
        assert_eq!(points_for_correct(input(4)), 4);
        assert_eq!(points_for_correct(input(9)), 4);
    }

    #[test]
    fn turbo_storm_adds_a_flat_point() {
        // Forced speed bonus plus the flat mode bonus.
        let points = points_for_correct(ScoreInput {
            mode: GameplayMode::TurboStorm,
            expert_pack: false,
            speed_enabled: true,
            difficulty: Difficulty::Medium,
            remaining_ms: 15_000,
            duration_ms: 19_500,
            streak: 1,
        });
        assert_eq!(points, 4);
    }

    #[test]
    fn review_delay_scales_with_text_and_outcome() {
        assert_eq!(
            review_delay_ms(40, 40, OutcomeKind::Answer, true, false),
            4_200
        );
        assert_eq!(
            review_delay_ms(200, 200, OutcomeKind::Answer, true, false),
            5_300
        );
        // Wrong answers get extra reading time.
        assert_eq!(
            review_delay_ms(40, 40, OutcomeKind::Answer, false, false),
            4_600
        );
        // Nothing to read out on a timeout.
        assert_eq!(
            review_delay_ms(40, 40, OutcomeKind::Timeout, false, false),
            3_600
        );
        // Reading-length steps cap at four.
        assert_eq!(
            review_delay_ms(600, 320, OutcomeKind::Answer, false, true),
            6_800
        );
    }
}
