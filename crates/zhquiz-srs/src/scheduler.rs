//! Scheduler service: session selection and review marking.
//!
//! Marks on the same `(user, quiz)` pair are serialized in-process by an
//! async lock, and every write is a versioned compare-and-set so writers in
//! other processes are detected and retried.

use crate::algorithm::ReviewMachine;
use crate::config::Config;
use crate::error::{ConfigError, RepoError, RepoResult, SchedulerError, SchedulerResult};
use crate::locks::ItemLocks;
use crate::models::{
    DueItem, ItemLookup, Outcome, QuizFilter, QuizId, QuizItem, ReviewState, SelectionResult,
    UpcomingItem, UserId,
};
use crate::repository::QuizRepository;
use crate::selector::Selector;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Who is asking, at what time, and until when.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: UserId,
    /// Clock used for due checks and new review times.
    pub now: DateTime<Utc>,
    /// Repository calls past this instant fail with `Timeout`.
    pub deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            now: Utc::now(),
            deadline: None,
        }
    }

    /// Pin the request clock.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }
}

pub struct SchedulerService {
    repo: Arc<dyn QuizRepository>,
    machine: ReviewMachine,
    selector: Selector,
    locks: ItemLocks,
    max_attempts: u32,
    repository_timeout: Duration,
    preference_timeout: Duration,
    pending_saves: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for SchedulerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerService")
            .field("max_attempts", &self.max_attempts)
            .field("repository_timeout", &self.repository_timeout)
            .finish_non_exhaustive()
    }
}

impl SchedulerService {
    /// Service with the built-in interval table and default limits.
    pub fn new(repo: Arc<dyn QuizRepository>) -> Self {
        Self {
            repo,
            machine: ReviewMachine::default(),
            selector: Selector::new(),
            locks: ItemLocks::new(),
            max_attempts: 3,
            repository_timeout: Duration::from_secs(5),
            preference_timeout: Duration::from_secs(2),
            pending_saves: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(repo: Arc<dyn QuizRepository>, config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let selector = match config.schedule.shuffle_seed {
            Some(seed) => Selector::seeded(seed),
            None => Selector::new(),
        };

        Ok(Self::new(repo)
            .with_machine(ReviewMachine::new(config.schedule.interval_policy()?))
            .with_selector(selector)
            .with_max_attempts(config.service.max_attempts)
            .with_repository_timeout(config.service.repository_timeout())
            .with_preference_timeout(config.service.preference_timeout()))
    }

    pub fn with_machine(mut self, machine: ReviewMachine) -> Self {
        self.machine = machine;
        self
    }

    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_repository_timeout(mut self, timeout: Duration) -> Self {
        self.repository_timeout = timeout;
        self
    }

    pub fn with_preference_timeout(mut self, timeout: Duration) -> Self {
        self.preference_timeout = timeout;
        self
    }

    pub fn machine(&self) -> &ReviewMachine {
        &self.machine
    }

    /// Select the items to study and remember `filter` as the user's last
    /// settings.
    pub async fn initialize(
        &self,
        ctx: &RequestContext,
        filter: &QuizFilter,
    ) -> SchedulerResult<SelectionResult> {
        if let Some(field) = filter.missing_field() {
            return Err(SchedulerError::InvalidArgument(format!(
                "{field} must not be empty"
            )));
        }

        let deadline = self.deadline(ctx);
        let selection = within(
            deadline,
            self.selector
                .select(self.repo.as_ref(), &ctx.user_id, filter, ctx.now),
        )
        .await?
        .map_err(unavailable)?;

        self.save_preference_detached(&ctx.user_id, filter);

        debug!(
            user_id = %ctx.user_id,
            due = selection.due.len(),
            upcoming = selection.upcoming.len(),
            "Selected quiz items"
        );

        Ok(SelectionResult {
            due: selection.due.iter().map(DueItem::from).collect(),
            upcoming: selection.upcoming.iter().map(UpcomingItem::from).collect(),
        })
    }

    /// Record a review outcome given as text (`right`, `wrong`, `repeat`).
    pub async fn mark(
        &self,
        ctx: &RequestContext,
        quiz_id: QuizId,
        outcome: &str,
    ) -> SchedulerResult<ReviewState> {
        let outcome: Outcome = outcome.parse()?;
        self.mark_outcome(ctx, quiz_id, outcome).await
    }

    /// Record a review outcome and return the item's new state.
    pub async fn mark_outcome(
        &self,
        ctx: &RequestContext,
        quiz_id: QuizId,
        outcome: Outcome,
    ) -> SchedulerResult<ReviewState> {
        let deadline = self.deadline(ctx);
        let _guard = tokio::time::timeout_at(deadline, self.locks.acquire(&ctx.user_id, quiz_id))
            .await
            .map_err(|_| SchedulerError::Timeout)?;

        for attempt in 1..=self.max_attempts {
            let item = within(deadline, self.repo.find_by_id(&ctx.user_id, quiz_id))
                .await?
                .map_err(|e| SchedulerError::from_repo(e, quiz_id))?
                .ok_or(SchedulerError::NotFound(quiz_id))?;

            let next = self.machine.advance(&item.state, outcome, ctx.now);

            // Not raced against the deadline: the repository checks it before
            // committing, so a timed-out mark has stored nothing.
            let written = self
                .repo
                .update(
                    &ctx.user_id,
                    quiz_id,
                    Some(item.version),
                    &next,
                    Some(deadline.into_std()),
                )
                .await;

            match written {
                Ok(version) => {
                    debug!(
                        %quiz_id,
                        %outcome,
                        from = ?item.state.srs_level,
                        to = ?next.srs_level,
                        version,
                        "Marked quiz item"
                    );
                    return Ok(next);
                }
                Err(RepoError::VersionConflict) => {
                    warn!(%quiz_id, attempt, "Quiz item changed concurrently, retrying");
                }
                Err(e) => return Err(SchedulerError::from_repo(e, quiz_id)),
            }
        }

        Err(SchedulerError::Conflict {
            attempts: self.max_attempts,
        })
    }

    /// Look items up by id, or by type and entry.
    pub async fn find_many(
        &self,
        ctx: &RequestContext,
        lookup: &ItemLookup,
    ) -> SchedulerResult<Vec<QuizItem>> {
        if lookup.is_empty() {
            return Err(SchedulerError::InvalidArgument(
                "either ids or entries must be specified".to_string(),
            ));
        }

        within(self.deadline(ctx), self.repo.find_many(&ctx.user_id, lookup))
            .await?
            .map_err(unavailable)
    }

    pub async fn all_tags(&self, ctx: &RequestContext) -> SchedulerResult<Vec<String>> {
        within(self.deadline(ctx), self.repo.all_tags(&ctx.user_id))
            .await?
            .map_err(unavailable)
    }

    /// Filter saved by the user's last `initialize`.
    pub async fn last_filter(&self, ctx: &RequestContext) -> SchedulerResult<Option<QuizFilter>> {
        within(self.deadline(ctx), self.repo.load_preference(&ctx.user_id))
            .await?
            .map_err(unavailable)
    }

    fn deadline(&self, ctx: &RequestContext) -> Instant {
        ctx.deadline
            .unwrap_or_else(|| Instant::now() + self.repository_timeout)
    }

    /// Best-effort: runs on its own task, failures are only logged.
    fn save_preference_detached(&self, user_id: &str, filter: &QuizFilter) {
        let repo = Arc::clone(&self.repo);
        let user_id = user_id.to_string();
        let filter = filter.clone();
        let timeout = self.preference_timeout;

        let handle = tokio::spawn(async move {
            match tokio::time::timeout(timeout, repo.save_preference(&user_id, &filter)).await {
                Ok(Ok(())) => debug!(%user_id, "Saved quiz preference"),
                Ok(Err(e)) => warn!(%user_id, error = %e, "Failed to save quiz preference"),
                Err(_) => warn!(%user_id, "Timed out saving quiz preference"),
            }
        });

        let mut pending = self.pending_saves.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Wait for background preference saves started so far.
    pub async fn flush(&self) {
        let handles = std::mem::take(&mut *self.pending_saves.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Preference save task failed");
            }
        }
    }
}

async fn within<T>(
    deadline: Instant,
    fut: impl Future<Output = RepoResult<T>>,
) -> SchedulerResult<RepoResult<T>> {
    tokio::time::timeout_at(deadline, fut)
        .await
        .map_err(|_| SchedulerError::Timeout)
}

/// Map errors from calls that do not target a single item.
fn unavailable(e: RepoError) -> SchedulerError {
    match e {
        RepoError::Unavailable(msg) => SchedulerError::Unavailable(msg),
        RepoError::Timeout => SchedulerError::Timeout,
        other => SchedulerError::Unavailable(other.to_string()),
    }
}
