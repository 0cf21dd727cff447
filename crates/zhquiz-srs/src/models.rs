//! Data models for the quiz scheduler.

use crate::error::ParseEnumError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifiers.
pub type QuizId = Uuid;
pub type UserId = String;

/// Highest SRS level an item can reach.
pub const MAX_LEVEL: u8 = 9;

/// Consecutive wrong answers that make an item a leech.
pub const LEECH_STREAK: u32 = 3;

/// Level from which an item counts as graduated.
pub const GRADUATED_LEVEL: u8 = 3;

/// Kind of study content a quiz item is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizType {
    /// Single character.
    Hanzi,
    /// Dictionary word.
    Vocab,
    /// Example sentence.
    Sentence,
    /// User-added entry.
    Extra,
}

impl QuizType {
    pub const ALL: [QuizType; 4] = [Self::Hanzi, Self::Vocab, Self::Sentence, Self::Extra];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hanzi => "hanzi",
            Self::Vocab => "vocab",
            Self::Sentence => "sentence",
            Self::Extra => "extra",
        }
    }
}

impl FromStr for QuizType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hanzi" => Ok(Self::Hanzi),
            "vocab" => Ok(Self::Vocab),
            "sentence" => Ok(Self::Sentence),
            "extra" => Ok(Self::Extra),
            _ => Err(ParseEnumError::new("quiz type", s)),
        }
    }
}

impl fmt::Display for QuizType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presentation direction of a quiz item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Simplified Chinese shown, English expected.
    Se,
    /// Traditional Chinese shown, English expected.
    Te,
    /// English shown, Chinese expected.
    Ec,
}

impl Direction {
    pub const ALL: [Direction; 3] = [Self::Se, Self::Te, Self::Ec];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Se => "se",
            Self::Te => "te",
            Self::Ec => "ec",
        }
    }
}

impl FromStr for Direction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "se" => Ok(Self::Se),
            "te" => Ok(Self::Te),
            "ec" => Ok(Self::Ec),
            _ => Err(ParseEnumError::new("direction", s)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived mastery classification. An item may match several stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Never reviewed.
    New,
    /// Keeps getting answered wrong.
    Leech,
    /// Reviewed but below the graduation level.
    Learning,
    /// At or above the graduation level.
    Graduated,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Self::New, Self::Leech, Self::Learning, Self::Graduated];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Leech => "leech",
            Self::Learning => "learning",
            Self::Graduated => "graduated",
        }
    }

    /// Check whether a review state falls into this stage.
    pub fn matches(&self, state: &ReviewState) -> bool {
        match self {
            Self::New => state.srs_level.is_none(),
            Self::Leech => state.wrong_streak.unwrap_or(0) >= LEECH_STREAK,
            Self::Learning => state.srs_level.is_some_and(|l| l < GRADUATED_LEVEL),
            Self::Graduated => state.srs_level.is_some_and(|l| l >= GRADUATED_LEVEL),
        }
    }
}

impl FromStr for Stage {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "leech" => Ok(Self::Leech),
            "learning" => Ok(Self::Learning),
            "graduated" => Ok(Self::Graduated),
            _ => Err(ParseEnumError::new("stage", s)),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Learner's answer for one presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Recalled correctly.
    Right,
    /// Recalled incorrectly.
    Wrong,
    /// Show again later without grading.
    Repeat,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Right => "right",
            Self::Wrong => "wrong",
            Self::Repeat => "repeat",
        }
    }
}

impl FromStr for Outcome {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "right" => Ok(Self::Right),
            "wrong" => Ok(Self::Wrong),
            "repeat" => Ok(Self::Repeat),
            _ => Err(ParseEnumError::new("outcome", s)),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling state of a quiz item.
///
/// `srs_level: None` means the item was never reviewed; in that case
/// `wrong_streak` is `None` as well. A reviewed item always carries a
/// `next_review`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewState {
    pub srs_level: Option<u8>,
    pub wrong_streak: Option<u32>,
    pub next_review: Option<DateTime<Utc>>,
}

impl ReviewState {
    /// State of an item that was never reviewed.
    pub fn new_item() -> Self {
        Self::default()
    }

    /// Whether the item should be studied at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.next_review {
            Some(at) => at <= now,
            None => true,
        }
    }
}

/// A studyable unit bound to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizItem {
    /// Unique identifier.
    pub id: QuizId,
    /// Owner.
    pub user_id: UserId,
    /// Content kind.
    #[serde(rename = "type")]
    pub quiz_type: QuizType,
    /// Content key, e.g. the Chinese string.
    pub entry: String,
    /// Presentation direction.
    pub direction: Direction,
    pub front: Option<String>,
    pub back: Option<String>,
    pub mnemonic: Option<String>,
    /// Labels used for filtering.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(flatten)]
    pub state: ReviewState,
    /// Record version, bumped by every update.
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuizItem {
    /// Create a never-reviewed item.
    pub fn new(
        user_id: impl Into<UserId>,
        quiz_type: QuizType,
        entry: impl Into<String>,
        direction: Direction,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            quiz_type,
            entry: entry.into(),
            direction,
            front: None,
            back: None,
            mnemonic: None,
            tags: BTreeSet::new(),
            state: ReviewState::new_item(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Set the review state.
    pub fn with_state(mut self, state: ReviewState) -> Self {
        self.state = state;
        self
    }

    /// Check whether the item falls into any of `stages`.
    pub fn in_any_stage(&self, stages: &BTreeSet<Stage>) -> bool {
        stages.iter().any(|stage| stage.matches(&self.state))
    }
}

/// Selection criteria for a study session.
///
/// Also persisted as the user's last-used quiz settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizFilter {
    #[serde(rename = "type")]
    pub types: BTreeSet<QuizType>,
    #[serde(rename = "stage")]
    pub stages: BTreeSet<Stage>,
    #[serde(rename = "direction")]
    pub directions: BTreeSet<Direction>,
    /// Empty means no tag restriction.
    #[serde(rename = "tag", default)]
    pub tags: BTreeSet<String>,
    #[serde(rename = "isDue")]
    pub is_due: bool,
}

impl QuizFilter {
    /// Filter matching every item, partitioned by due date.
    pub fn everything() -> Self {
        Self {
            types: QuizType::ALL.into_iter().collect(),
            stages: Stage::ALL.into_iter().collect(),
            directions: Direction::ALL.into_iter().collect(),
            tags: BTreeSet::new(),
            is_due: true,
        }
    }

    /// Name of the first required set that is empty, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.types.is_empty() {
            Some("type")
        } else if self.stages.is_empty() {
            Some("stage")
        } else if self.directions.is_empty() {
            Some("direction")
        } else {
            None
        }
    }

    /// The part of the filter the repository evaluates.
    pub fn item_query(&self) -> ItemQuery {
        ItemQuery {
            types: self.types.clone(),
            directions: self.directions.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Storage-level query: type and direction membership plus optional tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemQuery {
    pub types: BTreeSet<QuizType>,
    pub directions: BTreeSet<Direction>,
    /// Empty means no tag restriction; otherwise the item needs one of them.
    pub tags: BTreeSet<String>,
}

impl ItemQuery {
    pub fn matches(&self, item: &QuizItem) -> bool {
        self.types.contains(&item.quiz_type)
            && self.directions.contains(&item.direction)
            && (self.tags.is_empty() || !self.tags.is_disjoint(&item.tags))
    }
}

/// Direct lookup of items, by id or by content entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemLookup {
    Ids(Vec<QuizId>),
    Entries {
        quiz_type: QuizType,
        entries: Vec<String>,
    },
}

impl ItemLookup {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Ids(ids) => ids.is_empty(),
            Self::Entries { entries, .. } => entries.is_empty(),
        }
    }

    pub fn matches(&self, item: &QuizItem) -> bool {
        match self {
            Self::Ids(ids) => ids.contains(&item.id),
            Self::Entries { quiz_type, entries } => {
                item.quiz_type == *quiz_type && entries.contains(&item.entry)
            }
        }
    }
}

/// Due item as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DueItem {
    pub id: QuizId,
    pub next_review: Option<DateTime<Utc>>,
    pub srs_level: Option<u8>,
    pub wrong_streak: Option<u32>,
}

impl From<&QuizItem> for DueItem {
    fn from(item: &QuizItem) -> Self {
        Self {
            id: item.id,
            next_review: item.state.next_review,
            srs_level: item.state.srs_level,
            wrong_streak: item.state.wrong_streak,
        }
    }
}

/// Upcoming item; mastery fields are withheld.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingItem {
    pub id: QuizId,
    pub next_review: Option<DateTime<Utc>>,
}

impl From<&QuizItem> for UpcomingItem {
    fn from(item: &QuizItem) -> Self {
        Self {
            id: item.id,
            next_review: item.state.next_review,
        }
    }
}

/// Result of initializing a study session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub due: Vec<DueItem>,
    pub upcoming: Vec<UpcomingItem>,
}
