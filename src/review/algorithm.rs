//! Card scheduling algorithm
//!
//! Computes the next scheduling state for a card from its current state and
//! the learner's grade. Four grades are used:
//! - Again: forgot, the card lapses and goes to relearning
//! - Hard: recalled with difficulty, stability grows by a fixed 1.2
//! - Good: stability grows by `2.5 - 0.15 * difficulty`
//! - Easy: the Good growth with a further 1.3 bonus
//!
//! The function is total: any stored state, even a corrupted one, yields a
//! valid next state.

use chrono::{DateTime, Duration, Utc};

use super::models::{CardPhase, CardSchedulingState, Grade, DEFAULT_DIFFICULTY, DEFAULT_STABILITY};

/// Difficulty bounds
const MIN_DIFFICULTY: f64 = 0.0;
const MAX_DIFFICULTY: f64 = 10.0;

/// Difficulty change per grade
const LAPSE_DIFFICULTY_STEP: f64 = 0.5;
const RECALL_DIFFICULTY_STEP: f64 = 0.3;

/// Stability never drops below this after a lapse
const MIN_LAPSE_STABILITY: f64 = 0.5;
const LAPSE_STABILITY_FACTOR: f64 = 0.5;

const HARD_FACTOR: f64 = 1.2;
const BASE_GROWTH: f64 = 2.5;
const GROWTH_DIFFICULTY_WEIGHT: f64 = 0.15;
const EASY_BONUS: f64 = 1.3;

/// Smallest stored stability; anything below rounds to zero at two decimals
const MIN_STABILITY: f64 = 0.01;

/// Upper bound on stability, keeps due dates representable (100 years)
const MAX_STABILITY_DAYS: f64 = 36500.0;

/// Shortest interval ever scheduled
const MIN_INTERVAL_DAYS: i64 = 1;

/// Calculate the state that follows a review graded at `now`
pub fn next_state(current: &CardSchedulingState, grade: Grade, now: DateTime<Utc>) -> CardSchedulingState {
    let stability = sanitize_stability(current.stability);
    let difficulty = sanitize_difficulty(current.difficulty);

    // Growth uses the difficulty the card had going into this review
    let growth = BASE_GROWTH - GROWTH_DIFFICULTY_WEIGHT * difficulty;

    let new_difficulty = match grade {
        Grade::Again => difficulty + LAPSE_DIFFICULTY_STEP,
        _ => difficulty - RECALL_DIFFICULTY_STEP,
    }
    .clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);

    let mut next = current.clone();
    let new_stability = match grade {
        Grade::Again => {
            next.lapses = current.lapses.saturating_add(1);
            next.repetitions = 0;
            next.state = CardPhase::Relearning;
            (stability * LAPSE_STABILITY_FACTOR).max(MIN_LAPSE_STABILITY)
        }
        Grade::Hard | Grade::Good | Grade::Easy => {
            next.repetitions = current.repetitions.saturating_add(1);
            next.state = CardPhase::Review;
            match grade {
                Grade::Hard => stability * HARD_FACTOR,
                Grade::Good => stability * growth,
                _ => stability * growth * EASY_BONUS,
            }
        }
    };

    next.stability = round2(new_stability.min(MAX_STABILITY_DAYS)).max(MIN_STABILITY);
    next.difficulty = round2(new_difficulty);
    next.due_at = now + Duration::days(interval_days(next.stability));
    next.last_reviewed_at = Some(now);
    next
}

/// Whole days until the next review for a given stability
pub fn interval_days(stability: f64) -> i64 {
    (stability.round() as i64).max(MIN_INTERVAL_DAYS)
}

/// Intervals in days each grade would give, in Again/Hard/Good/Easy order.
/// Used to show the learner what each button does.
pub fn preview_intervals(state: &CardSchedulingState, now: DateTime<Utc>) -> [i64; 4] {
    Grade::ALL.map(|grade| (next_state(state, grade, now).due_at - now).num_days())
}

/// Format an interval in days to a compact label
pub fn format_interval(days: i64) -> String {
    if days <= 0 {
        "now".to_string()
    } else if days < 7 {
        format!("{}d", days)
    } else if days < 30 {
        format!("{}w", days / 7)
    } else if days < 365 {
        format!("{}mo", days / 30)
    } else {
        format!("{}y", days / 365)
    }
}

fn sanitize_stability(stability: f64) -> f64 {
    if stability.is_finite() && stability > 0.0 {
        stability.min(MAX_STABILITY_DAYS)
    } else {
        DEFAULT_STABILITY
    }
}

fn sanitize_difficulty(difficulty: f64) -> f64 {
    if difficulty.is_finite() {
        difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
    } else {
        DEFAULT_DIFFICULTY
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn new_card_state() -> CardSchedulingState {
        CardSchedulingState::new(Uuid::new_v4(), now())
    }

    #[test]
    fn test_new_card_good() {
        let state = new_card_state();
        let next = next_state(&state, Grade::Good, now());

        assert_eq!(next.stability, 1.75);
        assert_eq!(next.difficulty, 4.7);
        assert_eq!(next.repetitions, 1);
        assert_eq!(next.lapses, 0);
        assert_eq!(next.state, CardPhase::Review);
        assert_eq!(next.due_at, now() + Duration::days(2));
        assert_eq!(next.last_reviewed_at, Some(now()));
    }

    #[test]
    fn test_new_card_again() {
        let state = new_card_state();
        let next = next_state(&state, Grade::Again, now());

        assert_eq!(next.stability, 0.5);
        assert_eq!(next.difficulty, 5.5);
        assert_eq!(next.repetitions, 0);
        assert_eq!(next.lapses, 1);
        assert_eq!(next.state, CardPhase::Relearning);
        assert_eq!(next.due_at, now() + Duration::days(1));
    }

    #[test]
    fn test_hard_grows_by_fixed_factor() {
        let mut state = new_card_state();
        state.stability = 10.0;
        state.state = CardPhase::Review;
        state.repetitions = 3;

        let next = next_state(&state, Grade::Hard, now());
        assert_eq!(next.stability, 12.0);
        assert_eq!(next.repetitions, 4);
        assert_eq!(next.due_at, now() + Duration::days(12));
    }

    #[test]
    fn test_easy_applies_bonus() {
        let mut state = new_card_state();
        state.stability = 2.0;
        state.difficulty = 0.0;
        let next = next_state(&state, Grade::Easy, now());

        // 2.0 * 2.5 * 1.3
        assert_eq!(next.stability, 6.5);
        assert_eq!(next.difficulty, 0.0);
        assert_eq!(next.due_at, now() + Duration::days(7));
    }

    #[test]
    fn test_lapse_halves_stability() {
        let mut state = new_card_state();
        state.stability = 30.0;
        state.repetitions = 6;
        state.lapses = 2;
        state.state = CardPhase::Review;

        let next = next_state(&state, Grade::Again, now());
        assert_eq!(next.stability, 15.0);
        assert_eq!(next.repetitions, 0);
        assert_eq!(next.lapses, 3);
        assert_eq!(next.state, CardPhase::Relearning);
    }

    #[test]
    fn test_relearning_recovers_to_review() {
        let state = next_state(&new_card_state(), Grade::Again, now());
        let next = next_state(&state, Grade::Good, now() + Duration::days(1));

        assert_eq!(next.state, CardPhase::Review);
        assert_eq!(next.repetitions, 1);
        assert_eq!(next.lapses, 1);
    }

    #[test]
    fn test_difficulty_clamped_at_bounds() {
        let mut state = new_card_state();
        state.difficulty = 9.8;
        assert_eq!(next_state(&state, Grade::Again, now()).difficulty, 10.0);

        state.difficulty = 0.1;
        assert_eq!(next_state(&state, Grade::Easy, now()).difficulty, 0.0);
    }

    #[test]
    fn test_corrupted_state_is_sanitized() {
        let mut state = new_card_state();
        state.stability = f64::NAN;
        state.difficulty = f64::INFINITY;

        let next = next_state(&state, Grade::Good, now());
        assert_eq!(next.stability, 1.75);
        assert_eq!(next.difficulty, 4.7);

        state.stability = -4.0;
        state.difficulty = 42.0;
        let next = next_state(&state, Grade::Good, now());
        // difficulty 10 gives a growth of exactly 1.0
        assert_eq!(next.stability, 1.0);
        assert_eq!(next.difficulty, 9.7);
    }

    #[test]
    fn test_tiny_stability_stays_positive() {
        let mut state = new_card_state();
        state.state = CardPhase::Review;
        state.stability = 0.004;

        let next = next_state(&state, Grade::Hard, now());
        assert_eq!(next.stability, MIN_STABILITY);
        assert_eq!(next.due_at, now() + Duration::days(1));

        // The floor survives the next review instead of resetting to the default
        let mut floored = next;
        floored.difficulty = 10.0;
        let next = next_state(&floored, Grade::Good, now());
        assert_eq!(next.stability, MIN_STABILITY);
    }

    #[test]
    fn test_stability_is_capped() {
        let mut state = new_card_state();
        state.stability = 1.0e12;
        state.difficulty = 0.0;

        let next = next_state(&state, Grade::Easy, now());
        assert_eq!(next.stability, MAX_STABILITY_DAYS);
        assert_eq!(next.due_at, now() + Duration::days(36500));
    }

    #[test]
    fn test_preview_intervals() {
        let state = new_card_state();
        assert_eq!(preview_intervals(&state, now()), [1, 1, 2, 2]);

        let mut mature = new_card_state();
        mature.stability = 20.0;
        mature.difficulty = 2.0;
        // again 10, hard 24, good 44, easy 57.2
        assert_eq!(preview_intervals(&mature, now()), [10, 24, 44, 57]);
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(0), "now");
        assert_eq!(format_interval(1), "1d");
        assert_eq!(format_interval(5), "5d");
        assert_eq!(format_interval(7), "1w");
        assert_eq!(format_interval(14), "2w");
        assert_eq!(format_interval(30), "1mo");
        assert_eq!(format_interval(90), "3mo");
        assert_eq!(format_interval(365), "1y");
        assert_eq!(format_interval(730), "2y");
    }

    fn arb_grade() -> impl Strategy<Value = Grade> {
        prop_oneof![
            Just(Grade::Again),
            Just(Grade::Hard),
            Just(Grade::Good),
            Just(Grade::Easy),
        ]
    }

    fn arb_phase() -> impl Strategy<Value = CardPhase> {
        prop_oneof![
            Just(CardPhase::New),
            Just(CardPhase::Learning),
            Just(CardPhase::Review),
            Just(CardPhase::Relearning),
        ]
    }

    fn arb_state() -> impl Strategy<Value = CardSchedulingState> {
        (
            prop_oneof![1.0e-6f64..0.01, 0.01f64..5000.0],
            -5.0f64..15.0,
            0u32..1000,
            0u32..1000,
            arb_phase(),
            -100i64..100,
        )
            .prop_map(|(stability, difficulty, repetitions, lapses, state, due_offset)| CardSchedulingState {
                item_id: Uuid::nil(),
                stability,
                difficulty,
                due_at: now() + Duration::days(due_offset),
                repetitions,
                lapses,
                state,
                last_reviewed_at: None,
            })
    }

    proptest! {
        #[test]
        fn prop_due_strictly_after_review(state in arb_state(), grade in arb_grade()) {
            let next = next_state(&state, grade, now());
            prop_assert!(next.due_at > now());
            prop_assert!(next.stability > 0.0);
        }

        #[test]
        fn prop_difficulty_within_bounds(state in arb_state(), grade in arb_grade()) {
            let next = next_state(&state, grade, now());
            prop_assert!((MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&next.difficulty));
        }

        #[test]
        fn prop_again_resets_repetitions(state in arb_state()) {
            let next = next_state(&state, Grade::Again, now());
            prop_assert_eq!(next.repetitions, 0);
            prop_assert_eq!(next.lapses, state.lapses + 1);
            prop_assert_eq!(next.state, CardPhase::Relearning);
        }

        #[test]
        fn prop_recall_increments_repetitions(
            state in arb_state(),
            grade in prop_oneof![Just(Grade::Hard), Just(Grade::Good), Just(Grade::Easy)],
        ) {
            let next = next_state(&state, grade, now());
            prop_assert_eq!(next.repetitions, state.repetitions + 1);
            prop_assert_eq!(next.lapses, state.lapses);
            prop_assert_eq!(next.state, CardPhase::Review);
        }

        #[test]
        fn prop_state_survives_json(state in arb_state(), grade in arb_grade()) {
            let next = next_state(&state, grade, now());
            let json = serde_json::to_string(&next).unwrap();
            let back: CardSchedulingState = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back, next);
        }
    }
}
