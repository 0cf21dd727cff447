//! SQLite-backed quiz repository.

use crate::error::{RepoError, RepoResult};
use crate::models::{ItemLookup, ItemQuery, QuizFilter, QuizId, QuizItem, ReviewState};
use crate::repository::QuizRepository;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Result as SqlResult};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

const SCHEMA: &str = r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS quizzes (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        quiz_type TEXT NOT NULL,
        entry TEXT NOT NULL,
        direction TEXT NOT NULL,
        front TEXT,
        back TEXT,
        mnemonic TEXT,
        srs_level INTEGER,
        wrong_streak INTEGER,
        next_review TEXT,
        version INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (user_id, quiz_type, entry, direction)
    );

    CREATE TABLE IF NOT EXISTS quiz_tags (
        quiz_id TEXT NOT NULL REFERENCES quizzes(id) ON DELETE CASCADE,
        tag TEXT NOT NULL,
        PRIMARY KEY (quiz_id, tag)
    );

    CREATE TABLE IF NOT EXISTS user_preferences (
        user_id TEXT PRIMARY KEY,
        quiz_filter TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_quizzes_user ON quizzes(user_id, quiz_type, direction);
    CREATE INDEX IF NOT EXISTS idx_quiz_tags_tag ON quiz_tags(tag);
"#;

const SELECT_QUIZ: &str = "SELECT id, user_id, quiz_type, entry, direction, front, back, mnemonic,
        srs_level, wrong_streak, next_review, version, created_at, updated_at
     FROM quizzes q";

/// Quiz repository over a single SQLite connection.
///
/// Calls run on the blocking pool; the connection is shared behind a mutex.
#[derive(Clone)]
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRepository").finish_non_exhaustive()
    }
}

impl SqliteRepository {
    pub fn open(path: &Path) -> RepoResult<Self> {
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "Opened quiz database");
        Self::init(conn)
    }

    pub fn in_memory() -> RepoResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> RepoResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, f: F) -> RepoResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> RepoResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&mut conn.lock()))
            .await
            .map_err(|e| RepoError::Unavailable(format!("storage task failed: {e}")))?
    }

    /// Import an item. Returns `false` when the user already has an item for
    /// the same type, entry and direction.
    pub async fn insert_item(&self, item: &QuizItem) -> RepoResult<bool> {
        let item = item.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO quizzes (id, user_id, quiz_type, entry, direction, front, back,
                    mnemonic, srs_level, wrong_streak, next_review, version, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    item.id.to_string(),
                    item.user_id,
                    item.quiz_type.as_str(),
                    item.entry,
                    item.direction.as_str(),
                    item.front,
                    item.back,
                    item.mnemonic,
                    item.state.srs_level,
                    item.state.wrong_streak,
                    item.state.next_review.map(timestamp),
                    version_to_sql(item.version),
                    timestamp(item.created_at),
                    timestamp(item.updated_at),
                ],
            )? > 0;

            if inserted {
                for tag in &item.tags {
                    tx.execute(
                        "INSERT OR IGNORE INTO quiz_tags (quiz_id, tag) VALUES (?1, ?2)",
                        params![item.id.to_string(), tag],
                    )?;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
    }
}

#[async_trait]
impl QuizRepository for SqliteRepository {
    async fn find_by_filter(&self, user_id: &str, query: &ItemQuery) -> RepoResult<Vec<QuizItem>> {
        let mut args = vec![user_id.to_string()];
        let mut sql = format!("{SELECT_QUIZ} WHERE q.user_id = ?1");

        sql.push_str(&in_clause("q.quiz_type", &mut args, query.types.iter().map(|t| t.as_str())));
        sql.push_str(&in_clause(
            "q.direction",
            &mut args,
            query.directions.iter().map(|d| d.as_str()),
        ));
        if !query.tags.is_empty() {
            let tags = in_clause("t.tag", &mut args, query.tags.iter().map(String::as_str));
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM quiz_tags t WHERE t.quiz_id = q.id{tags})"
            ));
        }
        sql.push_str(" ORDER BY q.created_at, q.id");

        self.run(move |conn| query_items(conn, &sql, &args)).await
    }

    async fn find_by_id(&self, user_id: &str, id: QuizId) -> RepoResult<Option<QuizItem>> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let sql = format!("{SELECT_QUIZ} WHERE q.id = ?1 AND q.user_id = ?2");
            let mut items = query_items(conn, &sql, &[id.to_string(), user_id])?;
            Ok(items.pop())
        })
        .await
    }

    async fn find_many(&self, user_id: &str, lookup: &ItemLookup) -> RepoResult<Vec<QuizItem>> {
        let mut args = vec![user_id.to_string()];
        let mut sql = format!("{SELECT_QUIZ} WHERE q.user_id = ?1");

        match lookup {
            ItemLookup::Ids(ids) => {
                let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
                sql.push_str(&in_clause("q.id", &mut args, ids.iter().map(String::as_str)));
            }
            ItemLookup::Entries { quiz_type, entries } => {
                args.push(quiz_type.as_str().to_string());
                sql.push_str(&format!(" AND q.quiz_type = ?{}", args.len()));
                sql.push_str(&in_clause("q.entry", &mut args, entries.iter().map(String::as_str)));
            }
        }
        sql.push_str(" ORDER BY q.created_at, q.id");

        self.run(move |conn| query_items(conn, &sql, &args)).await
    }

    async fn update(
        &self,
        user_id: &str,
        id: QuizId,
        expected_version: Option<u64>,
        state: &ReviewState,
        deadline: Option<Instant>,
    ) -> RepoResult<u64> {
        let user_id = user_id.to_string();
        let state = *state;
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let id_str = id.to_string();

            let current: Option<i64> = tx
                .query_row(
                    "SELECT version FROM quizzes WHERE id = ?1 AND user_id = ?2",
                    params![id_str, user_id],
                    |row| row.get(0),
                )
                .optional()?;
            let current = current.ok_or(RepoError::NotFound)?;

            if expected_version.is_some_and(|v| version_to_sql(v) != current) {
                return Err(RepoError::VersionConflict);
            }

            tx.execute(
                "UPDATE quizzes SET srs_level = ?3, wrong_streak = ?4, next_review = ?5,
                    version = version + 1, updated_at = ?6
                 WHERE id = ?1 AND user_id = ?2",
                params![
                    id_str,
                    user_id,
                    state.srs_level,
                    state.wrong_streak,
                    state.next_review.map(timestamp),
                    timestamp(Utc::now()),
                ],
            )?;
            // Dropping the transaction rolls the update back.
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(RepoError::Timeout);
            }
            tx.commit()?;

            Ok(version_from_sql(current + 1))
        })
        .await
    }

    async fn all_tags(&self, user_id: &str) -> RepoResult<Vec<String>> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT t.tag FROM quiz_tags t
                 JOIN quizzes q ON q.id = t.quiz_id
                 WHERE q.user_id = ?1
                 ORDER BY t.tag",
            )?;
            let tags = stmt
                .query_map(params![user_id], |row| row.get(0))?
                .collect::<SqlResult<Vec<String>>>()?;
            Ok(tags)
        })
        .await
    }

    async fn save_preference(&self, user_id: &str, filter: &QuizFilter) -> RepoResult<()> {
        let user_id = user_id.to_string();
        let json = serde_json::to_string(filter)?;
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO user_preferences (user_id, quiz_filter, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET
                    quiz_filter = excluded.quiz_filter, updated_at = excluded.updated_at",
                params![user_id, json, timestamp(Utc::now())],
            )?;
            Ok(())
        })
        .await
    }

    /// An unreadable stored filter counts as no preference.
    async fn load_preference(&self, user_id: &str) -> RepoResult<Option<QuizFilter>> {
        let owner = user_id.to_string();
        let user_id = owner.clone();
        let json: Option<String> = self
            .run(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT quiz_filter FROM user_preferences WHERE user_id = ?1",
                        params![user_id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;

        match json.map(|s| serde_json::from_str(&s)).transpose() {
            Ok(filter) => Ok(filter),
            Err(e) => {
                tracing::warn!(user_id = %owner, error = %e, "Ignoring unreadable quiz preference");
                Ok(None)
            }
        }
    }
}

/// Append ` AND column IN (?n, ...)` binding `values` after the existing args.
fn in_clause<'a>(
    column: &str,
    args: &mut Vec<String>,
    values: impl Iterator<Item = &'a str>,
) -> String {
    let start = args.len();
    args.extend(values.map(str::to_string));
    let placeholders: Vec<String> = (start + 1..=args.len()).map(|n| format!("?{n}")).collect();
    if placeholders.is_empty() {
        // Empty set matches nothing.
        " AND 0".to_string()
    } else {
        format!(" AND {column} IN ({})", placeholders.join(", "))
    }
}

fn query_items(conn: &Connection, sql: &str, args: &[String]) -> RepoResult<Vec<QuizItem>> {
    let mut stmt = conn.prepare(sql)?;
    let mut items = stmt
        .query_map(params_from_iter(args.iter()), parse_quiz_row)?
        .collect::<SqlResult<Vec<_>>>()?;

    let mut tag_stmt = conn.prepare("SELECT tag FROM quiz_tags WHERE quiz_id = ?1 ORDER BY tag")?;
    for item in &mut items {
        item.tags = tag_stmt
            .query_map(params![item.id.to_string()], |row| row.get(0))?
            .collect::<SqlResult<_>>()?;
    }
    Ok(items)
}

fn parse_quiz_row(row: &rusqlite::Row) -> SqlResult<QuizItem> {
    let next_review: Option<String> = row.get("next_review")?;
    let version: i64 = row.get("version")?;

    Ok(QuizItem {
        id: parse_text(row, "id", |s| Uuid::parse_str(s))?,
        user_id: row.get("user_id")?,
        quiz_type: parse_text(row, "quiz_type", str::parse)?,
        entry: row.get("entry")?,
        direction: parse_text(row, "direction", str::parse)?,
        front: row.get("front")?,
        back: row.get("back")?,
        mnemonic: row.get("mnemonic")?,
        tags: Default::default(),
        state: ReviewState {
            srs_level: row.get("srs_level")?,
            wrong_streak: row.get("wrong_streak")?,
            next_review: next_review
                .map(|s| parse_timestamp(&s).map_err(|e| conversion_error(row, "next_review", e)))
                .transpose()?,
        },
        version: version_from_sql(version),
        created_at: parse_text(row, "created_at", parse_timestamp)?,
        updated_at: parse_text(row, "updated_at", parse_timestamp)?,
    })
}

fn parse_text<T, E>(
    row: &rusqlite::Row,
    column: &str,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> SqlResult<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(column)?;
    parse(&raw).map_err(|e| conversion_error(row, column, e))
}

fn conversion_error<E>(row: &rusqlite::Row, column: &str, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    let idx = row.as_ref().column_index(column).unwrap_or_default();
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

/// Fixed-width RFC 3339 so text order matches time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

fn version_to_sql(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn version_from_sql(v: i64) -> u64 {
    u64::try_from(v).unwrap_or_default()
}
