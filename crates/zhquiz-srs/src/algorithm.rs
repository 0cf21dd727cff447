//! Review state machine.

use crate::interval::IntervalPolicy;
use crate::models::{Outcome, ReviewState, MAX_LEVEL};
use chrono::{DateTime, Duration, Utc};

/// Level-ladder SRS: right climbs one level, wrong drops one, repeat only
/// reschedules.
#[derive(Debug, Clone, Default)]
pub struct ReviewMachine {
    intervals: IntervalPolicy,
}

impl ReviewMachine {
    pub fn new(intervals: IntervalPolicy) -> Self {
        Self { intervals }
    }

    pub fn intervals(&self) -> &IntervalPolicy {
        &self.intervals
    }

    /// Compute the state that follows `outcome` at `now`.
    pub fn advance(&self, state: &ReviewState, outcome: Outcome, now: DateTime<Utc>) -> ReviewState {
        match outcome {
            Outcome::Right => {
                let level = state.srs_level.map_or(0, |l| l.saturating_add(1).min(MAX_LEVEL));
                ReviewState {
                    srs_level: Some(level),
                    wrong_streak: Some(0),
                    next_review: Some(schedule_at(now, self.intervals.interval(level))),
                }
            }
            Outcome::Wrong => {
                let level = state
                    .srs_level
                    .map_or(0, |l| l.min(MAX_LEVEL).saturating_sub(1));
                let streak = state.wrong_streak.map_or(1, |s| s.saturating_add(1));
                ReviewState {
                    srs_level: Some(level),
                    wrong_streak: Some(streak),
                    next_review: Some(schedule_at(now, self.intervals.interval(level))),
                }
            }
            Outcome::Repeat => {
                let delay = state
                    .srs_level
                    .map_or(self.intervals.shortest(), |l| self.intervals.interval(l));
                ReviewState {
                    next_review: Some(schedule_at(now, delay)),
                    ..*state
                }
            }
        }
    }
}

/// `now + delay`, clamped to the latest representable time.
fn schedule_at(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    now.checked_add_signed(delay)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_right_on_new_item() {
        let machine = ReviewMachine::default();
        let next = machine.advance(&ReviewState::new_item(), Outcome::Right, t0());

        assert_eq!(next.srs_level, Some(0));
        assert_eq!(next.wrong_streak, Some(0));
        assert_eq!(next.next_review, Some(t0() + machine.intervals().interval(0)));
    }

    #[test]
    fn test_wrong_drops_level_and_extends_streak() {
        let machine = ReviewMachine::default();
        let state = ReviewState {
            srs_level: Some(2),
            wrong_streak: Some(1),
            next_review: Some(t0()),
        };
        let t1 = t0() + Duration::hours(5);

        let next = machine.advance(&state, Outcome::Wrong, t1);

        assert_eq!(next.srs_level, Some(1));
        assert_eq!(next.wrong_streak, Some(2));
        assert_eq!(next.next_review, Some(t1 + machine.intervals().interval(1)));
    }

    #[test]
    fn test_wrong_at_floor() {
        let machine = ReviewMachine::default();
        let state = ReviewState {
            srs_level: Some(0),
            wrong_streak: Some(4),
            next_review: Some(t0()),
        };

        let next = machine.advance(&state, Outcome::Wrong, t0());
        assert_eq!(next.srs_level, Some(0));
        assert_eq!(next.wrong_streak, Some(5));
    }

    #[test]
    fn test_wrong_on_new_item() {
        let machine = ReviewMachine::default();
        let next = machine.advance(&ReviewState::new_item(), Outcome::Wrong, t0());
        assert_eq!(next.srs_level, Some(0));
        assert_eq!(next.wrong_streak, Some(1));
    }

    #[test]
    fn test_right_at_ceiling() {
        let machine = ReviewMachine::default();
        let state = ReviewState {
            srs_level: Some(MAX_LEVEL),
            wrong_streak: Some(2),
            next_review: Some(t0()),
        };

        let next = machine.advance(&state, Outcome::Right, t0());
        assert_eq!(next.srs_level, Some(MAX_LEVEL));
        assert_eq!(next.wrong_streak, Some(0));
    }

    #[test]
    fn test_repeat_uses_current_level() {
        let machine = ReviewMachine::default();
        let state = ReviewState {
            srs_level: Some(4),
            wrong_streak: Some(1),
            next_review: Some(t0()),
        };

        let next = machine.advance(&state, Outcome::Repeat, t0());
        assert_eq!(next.srs_level, Some(4));
        assert_eq!(next.wrong_streak, Some(1));
        assert_eq!(next.next_review, Some(t0() + machine.intervals().interval(4)));
    }

    #[test]
    fn test_repeat_on_new_item_uses_shortest() {
        let machine = ReviewMachine::default();
        let next = machine.advance(&ReviewState::new_item(), Outcome::Repeat, t0());

        assert_eq!(next.srs_level, None);
        assert_eq!(next.wrong_streak, None);
        assert_eq!(next.next_review, Some(t0() + machine.intervals().shortest()));
    }

    #[test]
    fn test_schedule_saturates_near_end_of_time() {
        let machine = ReviewMachine::default();
        let late = DateTime::<Utc>::MAX_UTC - Duration::hours(1);

        for outcome in [Outcome::Right, Outcome::Wrong, Outcome::Repeat] {
            let next = machine.advance(&ReviewState::new_item(), outcome, late);
            assert_eq!(next.next_review, Some(DateTime::<Utc>::MAX_UTC));
        }
    }

    fn outcome() -> impl Strategy<Value = Outcome> {
        prop_oneof![
            Just(Outcome::Right),
            Just(Outcome::Wrong),
            Just(Outcome::Repeat),
        ]
    }

    fn review_state() -> impl Strategy<Value = ReviewState> {
        prop_oneof![
            Just(ReviewState::new_item()),
            (0..=MAX_LEVEL, 0u32..20).prop_map(|(level, streak)| ReviewState {
                srs_level: Some(level),
                wrong_streak: Some(streak),
                next_review: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            }),
        ]
    }

    proptest! {
        #[test]
        fn test_level_stays_in_bounds(outcomes in proptest::collection::vec(outcome(), 0..60)) {
            let machine = ReviewMachine::default();
            let mut state = ReviewState::new_item();
            for o in outcomes {
                state = machine.advance(&state, o, t0());
                if let Some(level) = state.srs_level {
                    prop_assert!(level <= MAX_LEVEL);
                    prop_assert!(state.next_review.is_some());
                } else {
                    prop_assert!(state.wrong_streak.is_none());
                }
            }
        }

        #[test]
        fn test_right_resets_streak(state in review_state()) {
            let next = ReviewMachine::default().advance(&state, Outcome::Right, t0());
            prop_assert_eq!(next.wrong_streak, Some(0));
        }

        #[test]
        fn test_repeat_is_neutral(state in review_state(), minutes in 0i64..100_000) {
            let now = t0() + Duration::minutes(minutes);
            let next = ReviewMachine::default().advance(&state, Outcome::Repeat, now);
            prop_assert_eq!(next.srs_level, state.srs_level);
            prop_assert_eq!(next.wrong_streak, state.wrong_streak);
            prop_assert!(next.next_review.is_some_and(|at| at > now));
        }
    }
}
