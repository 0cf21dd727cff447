//! Command-line arguments.

use anyhow::bail;
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::PathBuf;
use uuid::Uuid;
use zhquiz_srs::{Direction, ItemLookup, QuizFilter, QuizType, Stage};

/// Review scheduler for Chinese study quizzes
#[derive(Debug, Parser)]
#[command(name = "zhquiz")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Pick quiz items to study and record review outcomes")]
pub struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Act as this user instead of the configured one
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// SQLite database path
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Select due and upcoming items
    Due(DueArgs),

    /// Record a review outcome
    Mark {
        /// Quiz item id
        id: Uuid,
        /// right, wrong or repeat
        outcome: String,
    },

    /// List all tags in use
    Tags,

    /// Show items by id, or by type and entry
    Show(ShowArgs),

    /// Import quiz items from a JSON file
    Import {
        /// Path to a JSON array of items
        file: PathBuf,
    },
}

/// Unset options fall back to the last filter used, then to everything.
#[derive(Debug, Args)]
pub struct DueArgs {
    /// Quiz types (hanzi, vocab, sentence, extra)
    #[arg(long = "type", value_delimiter = ',')]
    pub types: Vec<QuizType>,

    /// Stages (new, leech, learning, graduated)
    #[arg(long = "stage", value_delimiter = ',')]
    pub stages: Vec<Stage>,

    /// Directions (se, te, ec)
    #[arg(long = "direction", value_delimiter = ',')]
    pub directions: Vec<Direction>,

    /// Only items with one of these tags
    #[arg(long = "tag", value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Drop any saved tag restriction
    #[arg(long, conflicts_with = "tags")]
    pub no_tag: bool,

    /// Return every match as due, ignoring review times
    #[arg(long)]
    pub all: bool,
}

impl DueArgs {
    pub fn to_filter(&self, saved: Option<QuizFilter>) -> QuizFilter {
        let mut filter = saved.unwrap_or_else(QuizFilter::everything);

        if !self.types.is_empty() {
            filter.types = self.types.iter().copied().collect();
        }
        if !self.stages.is_empty() {
            filter.stages = self.stages.iter().copied().collect();
        }
        if !self.directions.is_empty() {
            filter.directions = self.directions.iter().copied().collect();
        }
        if self.no_tag {
            filter.tags.clear();
        } else if !self.tags.is_empty() {
            filter.tags = self.tags.iter().cloned().collect::<BTreeSet<_>>();
        }
        filter.is_due = !self.all;

        filter
    }
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Item ids
    #[arg(long = "id")]
    pub ids: Vec<Uuid>,

    /// Quiz type, used with entries
    #[arg(long = "type")]
    pub quiz_type: Option<QuizType>,

    /// Entries to look up, used with --type
    #[arg(long = "entry")]
    pub entries: Vec<String>,
}

impl ShowArgs {
    pub fn to_lookup(&self) -> anyhow::Result<ItemLookup> {
        if !self.ids.is_empty() {
            return Ok(ItemLookup::Ids(self.ids.clone()));
        }
        match self.quiz_type {
            Some(quiz_type) if !self.entries.is_empty() => Ok(ItemLookup::Entries {
                quiz_type,
                entries: self.entries.clone(),
            }),
            _ => bail!("pass --id, or --type with at least one entry"),
        }
    }
}
