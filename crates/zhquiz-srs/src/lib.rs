//! Spaced repetition scheduling for Chinese study quizzes.
//!
//! Each quiz item carries an SRS level, a wrong-answer streak and a next
//! review time. This crate decides which items a user studies next and how
//! a reviewed item is rescheduled.
//!
//! # Features
//!
//! - **Review state machine**: right/wrong/repeat transitions over levels 0..=9
//! - **Session selection**: filter by type, stage, direction and tag, shuffle due items
//! - **Safe marking**: per-item locks plus versioned writes, retried on conflict
//! - **Storage**: in-memory and SQLite repositories behind one async trait

pub mod algorithm;
pub mod config;
pub mod db;
pub mod error;
pub mod interval;
pub mod locks;
pub mod memory;
pub mod models;
pub mod repository;
pub mod scheduler;
pub mod selector;

// Re-exports
pub use algorithm::ReviewMachine;
pub use config::Config;
pub use db::SqliteRepository;
pub use error::{ConfigError, RepoError, RepoResult, SchedulerError, SchedulerResult};
pub use interval::IntervalPolicy;
pub use memory::MemoryRepository;
pub use models::{
    Direction, DueItem, ItemLookup, Outcome, QuizFilter, QuizId, QuizItem, QuizType,
    ReviewState, SelectionResult, Stage, UpcomingItem,
};
pub use repository::QuizRepository;
pub use scheduler::{RequestContext, SchedulerService};
pub use selector::{Selection, Selector};
