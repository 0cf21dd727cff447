//! In-memory repository, for tests and ephemeral sessions.

use crate::error::{RepoError, RepoResult};
use crate::models::{ItemLookup, ItemQuery, QuizFilter, QuizId, QuizItem, ReviewState, UserId};
use crate::repository::QuizRepository;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

#[derive(Debug, Default)]
pub struct MemoryRepository {
    items: RwLock<HashMap<QuizId, QuizItem>>,
    preferences: RwLock<HashMap<UserId, QuizFilter>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with `items`.
    pub fn with_items(items: impl IntoIterator<Item = QuizItem>) -> Self {
        let repo = Self::new();
        for item in items {
            repo.insert(item);
        }
        repo
    }

    /// Insert or replace an item.
    pub fn insert(&self, item: QuizItem) {
        self.items.write().insert(item.id, item);
    }

    /// Fetch an item regardless of owner.
    pub fn get(&self, id: QuizId) -> Option<QuizItem> {
        self.items.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    fn collect(&self, user_id: &str, pred: impl Fn(&QuizItem) -> bool) -> Vec<QuizItem> {
        let mut out: Vec<QuizItem> = self
            .items
            .read()
            .values()
            .filter(|item| item.user_id == user_id && pred(item))
            .cloned()
            .collect();
        // Stable order, like a table scan.
        out.sort_by_key(|item| (item.created_at, item.id));
        out
    }
}

#[async_trait]
impl QuizRepository for MemoryRepository {
    async fn find_by_filter(&self, user_id: &str, query: &ItemQuery) -> RepoResult<Vec<QuizItem>> {
        Ok(self.collect(user_id, |item| query.matches(item)))
    }

    async fn find_by_id(&self, user_id: &str, id: QuizId) -> RepoResult<Option<QuizItem>> {
        Ok(self
            .items
            .read()
            .get(&id)
            .filter(|item| item.user_id == user_id)
            .cloned())
    }

    async fn find_many(&self, user_id: &str, lookup: &ItemLookup) -> RepoResult<Vec<QuizItem>> {
        Ok(self.collect(user_id, |item| lookup.matches(item)))
    }

    async fn update(
        &self,
        user_id: &str,
        id: QuizId,
        expected_version: Option<u64>,
        state: &ReviewState,
        deadline: Option<Instant>,
    ) -> RepoResult<u64> {
        let mut items = self.items.write();
        let item = items
            .get_mut(&id)
            .filter(|item| item.user_id == user_id)
            .ok_or(RepoError::NotFound)?;

        if expected_version.is_some_and(|v| v != item.version) {
            return Err(RepoError::VersionConflict);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(RepoError::Timeout);
        }

        item.state = *state;
        item.version += 1;
        item.updated_at = Utc::now();
        Ok(item.version)
    }

    async fn all_tags(&self, user_id: &str) -> RepoResult<Vec<String>> {
        let tags: BTreeSet<String> = self
            .items
            .read()
            .values()
            .filter(|item| item.user_id == user_id)
            .flat_map(|item| item.tags.iter().cloned())
            .collect();
        Ok(tags.into_iter().collect())
    }

    async fn save_preference(&self, user_id: &str, filter: &QuizFilter) -> RepoResult<()> {
        self.preferences
            .write()
            .insert(user_id.to_string(), filter.clone());
        Ok(())
    }

    async fn load_preference(&self, user_id: &str) -> RepoResult<Option<QuizFilter>> {
        Ok(self.preferences.read().get(user_id).cloned())
    }
}
