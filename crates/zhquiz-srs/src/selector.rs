//! Due/upcoming selection for a study session.

use crate::error::RepoResult;
use crate::models::{QuizFilter, QuizItem};
use crate::repository::QuizRepository;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::cmp::Ordering;

/// Matched items split into what to study now and what comes later.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Shuffled.
    pub due: Vec<QuizItem>,
    /// Ascending by next review, unscheduled first.
    pub upcoming: Vec<QuizItem>,
}

/// Runs filtered queries and orders the result.
pub struct Selector {
    rng: Mutex<StdRng>,
}

impl Default for Selector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selector").finish_non_exhaustive()
    }
}

impl Selector {
    /// Selector shuffling from OS entropy.
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// Selector with a reproducible shuffle.
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    pub fn from_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    /// Query `repo` for the user's items matching `filter` and partition them
    /// around `now`.
    pub async fn select(
        &self,
        repo: &dyn QuizRepository,
        user_id: &str,
        filter: &QuizFilter,
        now: DateTime<Utc>,
    ) -> RepoResult<Selection> {
        let items = repo.find_by_filter(user_id, &filter.item_query()).await?;
        let matched = items
            .into_iter()
            .filter(|item| item.in_any_stage(&filter.stages))
            .collect();
        Ok(self.partition(matched, filter.is_due, now))
    }

    /// Split, shuffle and sort already-filtered items.
    pub fn partition(&self, items: Vec<QuizItem>, is_due: bool, now: DateTime<Utc>) -> Selection {
        let (mut due, mut upcoming): (Vec<_>, Vec<_>) = if is_due {
            items.into_iter().partition(|item| item.state.is_due(now))
        } else {
            (items, Vec::new())
        };

        due.shuffle(&mut *self.rng.lock());
        upcoming.sort_by(cmp_next_review);

        Selection { due, upcoming }
    }
}

/// Unscheduled items first, then ascending by time.
fn cmp_next_review(a: &QuizItem, b: &QuizItem) -> Ordering {
    match (a.state.next_review, b.state.next_review) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(&y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRepository;
    use crate::models::{Direction, QuizType, ReviewState, Stage};
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use std::collections::{BTreeSet, HashMap, HashSet};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn item(level: Option<u8>, streak: Option<u32>, next: Option<DateTime<Utc>>) -> QuizItem {
        QuizItem::new("alice", QuizType::Vocab, "词", Direction::Se).with_state(ReviewState {
            srs_level: level,
            wrong_streak: streak,
            next_review: next,
        })
    }

    fn ids(items: &[QuizItem]) -> HashSet<uuid::Uuid> {
        items.iter().map(|i| i.id).collect()
    }

    #[tokio::test]
    async fn test_stage_filter_is_or_combined() {
        let fresh = item(None, None, None);
        let leech = item(Some(1), Some(3), Some(now()));
        let solid = item(Some(5), Some(0), Some(now()));
        let repo = MemoryRepository::with_items([fresh.clone(), leech.clone(), solid.clone()]);

        let mut filter = QuizFilter::everything();
        filter.stages = BTreeSet::from([Stage::New, Stage::Leech]);
        filter.is_due = false;

        let selection = Selector::seeded(1)
            .select(&repo, "alice", &filter, now())
            .await
            .unwrap();

        assert_eq!(ids(&selection.due), HashSet::from([fresh.id, leech.id]));
        assert!(selection.upcoming.is_empty());
    }

    #[tokio::test]
    async fn test_type_direction_and_tag_filters() {
        let hanzi = QuizItem::new("alice", QuizType::Hanzi, "好", Direction::Se).with_tag("hsk1");
        let vocab_ec = QuizItem::new("alice", QuizType::Vocab, "你好", Direction::Ec).with_tag("hsk1");
        let untagged = QuizItem::new("alice", QuizType::Hanzi, "人", Direction::Se);
        let repo = MemoryRepository::with_items([hanzi.clone(), vocab_ec, untagged]);

        let mut filter = QuizFilter::everything();
        filter.types = BTreeSet::from([QuizType::Hanzi]);
        filter.directions = BTreeSet::from([Direction::Se]);
        filter.tags = BTreeSet::from(["hsk1".to_string()]);

        let selection = Selector::seeded(2)
            .select(&repo, "alice", &filter, now())
            .await
            .unwrap();

        assert_eq!(ids(&selection.due), HashSet::from([hanzi.id]));
    }

    #[test]
    fn test_due_threshold_is_inclusive() {
        let on_time = item(Some(1), Some(0), Some(now()));
        let later = item(Some(1), Some(0), Some(now() + Duration::seconds(1)));
        let unscheduled = item(None, None, None);

        let selection = Selector::seeded(3).partition(
            vec![on_time.clone(), later.clone(), unscheduled.clone()],
            true,
            now(),
        );

        assert_eq!(ids(&selection.due), HashSet::from([on_time.id, unscheduled.id]));
        assert_eq!(ids(&selection.upcoming), HashSet::from([later.id]));
    }

    #[test]
    fn test_not_due_mode_returns_everything_as_due() {
        let later = item(Some(1), Some(0), Some(now() + Duration::days(3)));
        let selection = Selector::seeded(4).partition(vec![later.clone()], false, now());

        assert_eq!(ids(&selection.due), HashSet::from([later.id]));
        assert!(selection.upcoming.is_empty());
    }

    #[test]
    fn test_empty_buckets() {
        let selection = Selector::seeded(5).partition(Vec::new(), true, now());
        assert!(selection.due.is_empty());
        assert!(selection.upcoming.is_empty());
    }

    #[test]
    fn test_upcoming_sort_puts_unscheduled_first() {
        let a = item(Some(1), Some(0), Some(now() + Duration::hours(3)));
        let b = item(Some(1), Some(0), None);
        let c = item(Some(1), Some(0), Some(now() + Duration::hours(1)));

        let mut list = vec![a.clone(), b.clone(), c.clone()];
        list.sort_by(cmp_next_review);

        let order: Vec<_> = list.iter().map(|i| i.id).collect();
        assert_eq!(order, vec![b.id, c.id, a.id]);
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let items: Vec<_> = (0..20).map(|_| item(None, None, None)).collect();

        let first = Selector::seeded(42).partition(items.clone(), true, now());
        let second = Selector::seeded(42).partition(items, true, now());

        let a: Vec<_> = first.due.iter().map(|i| i.id).collect();
        let b: Vec<_> = second.due.iter().map(|i| i.id).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_shuffle_fairness() {
        // 3 items -> 6 permutations; expect ~TRIALS/6 each.
        const TRIALS: usize = 60_000;
        let items: Vec<_> = (0..3).map(|_| item(None, None, None)).collect();
        let selector = Selector::seeded(7);
        let mut counts: HashMap<Vec<uuid::Uuid>, usize> = HashMap::new();

        for _ in 0..TRIALS {
            let selection = selector.partition(items.clone(), true, now());
            let order = selection.due.iter().map(|i| i.id).collect();
            *counts.entry(order).or_default() += 1;
        }

        assert_eq!(counts.len(), 6);
        let expected = TRIALS as f64 / 6.0;
        let chi_square: f64 = counts
            .values()
            .map(|&c| (c as f64 - expected).powi(2) / expected)
            .sum();
        // 5 degrees of freedom, p = 0.001 critical value.
        assert!(chi_square < 20.52, "chi-square {chi_square} too high: {counts:?}");
    }

    fn arbitrary_item() -> impl Strategy<Value = QuizItem> {
        (
            proptest::option::of(0u8..=9),
            0u32..6,
            proptest::option::of(-10_000i64..10_000),
        )
            .prop_map(|(level, streak, offset)| {
                let next = offset.map(|m| now() + Duration::minutes(m));
                match level {
                    Some(l) => item(Some(l), Some(streak), next.or(Some(now()))),
                    None => item(None, None, next),
                }
            })
    }

    proptest! {
        #[test]
        fn test_partition_is_complete_and_disjoint(
            items in proptest::collection::vec(arbitrary_item(), 0..40),
            seed in any::<u64>(),
        ) {
            let all = ids(&items);
            let selection = Selector::seeded(seed).partition(items, true, now());
            let due = ids(&selection.due);
            let upcoming = ids(&selection.upcoming);

            prop_assert!(due.is_disjoint(&upcoming));
            prop_assert_eq!(due.union(&upcoming).copied().collect::<HashSet<_>>(), all);
            prop_assert_eq!(due.len() + upcoming.len(), selection.due.len() + selection.upcoming.len());

            for item in &selection.due {
                prop_assert!(item.state.is_due(now()));
            }
            for item in &selection.upcoming {
                prop_assert!(!item.state.is_due(now()));
            }
            for pair in selection.upcoming.windows(2) {
                prop_assert_ne!(cmp_next_review(&pair[0], &pair[1]), Ordering::Greater);
            }
        }
    }
}
