//! Storage port used by the scheduler.
//!
//! Every call is scoped to one user: an item owned by someone else behaves
//! exactly like a missing item.

use crate::error::RepoResult;
use crate::models::{ItemLookup, ItemQuery, QuizFilter, QuizId, QuizItem, ReviewState};
use async_trait::async_trait;
use std::time::Instant;

/// Read and conditional-write access to a user's quiz items.
#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Items owned by `user_id` that match the query's type, direction and
    /// tag constraints. Each item appears at most once.
    async fn find_by_filter(&self, user_id: &str, query: &ItemQuery) -> RepoResult<Vec<QuizItem>>;

    /// A single item, or `None` when it does not exist for this user.
    async fn find_by_id(&self, user_id: &str, id: QuizId) -> RepoResult<Option<QuizItem>>;

    /// Items selected by id or by entry.
    async fn find_many(&self, user_id: &str, lookup: &ItemLookup) -> RepoResult<Vec<QuizItem>>;

    /// Store a new review state and return the new record version.
    ///
    /// With `expected_version` set, the write only happens if the stored
    /// version still matches, otherwise `RepoError::VersionConflict`.
    ///
    /// Implementations check `deadline` immediately before the write becomes
    /// visible and return `RepoError::Timeout` without writing once it has
    /// passed. A timed-out update never leaves a committed change behind.
    async fn update(
        &self,
        user_id: &str,
        id: QuizId,
        expected_version: Option<u64>,
        state: &ReviewState,
        deadline: Option<Instant>,
    ) -> RepoResult<u64>;

    /// Distinct tag names over the user's items, sorted.
    async fn all_tags(&self, user_id: &str) -> RepoResult<Vec<String>>;

    /// Remember the user's last quiz filter.
    async fn save_preference(&self, user_id: &str, filter: &QuizFilter) -> RepoResult<()>;

    async fn load_preference(&self, user_id: &str) -> RepoResult<Option<QuizFilter>>;
}
