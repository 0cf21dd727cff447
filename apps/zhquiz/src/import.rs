//! JSON import of quiz items.

use serde::Deserialize;
use std::collections::BTreeSet;
use zhquiz_srs::{Direction, QuizItem, QuizType};

/// One entry of an import file. Without `direction`, an item is created for
/// every direction.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportItem {
    #[serde(rename = "type")]
    pub quiz_type: QuizType,
    pub entry: String,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub front: Option<String>,
    #[serde(default)]
    pub back: Option<String>,
    #[serde(default)]
    pub mnemonic: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl ImportItem {
    pub fn into_items(self, user_id: &str) -> Vec<QuizItem> {
        let directions = match self.direction {
            Some(direction) => vec![direction],
            None => Direction::ALL.to_vec(),
        };

        directions
            .into_iter()
            .map(|direction| {
                let mut item = QuizItem::new(user_id, self.quiz_type, self.entry.clone(), direction);
                item.front = self.front.clone();
                item.back = self.back.clone();
                item.mnemonic = self.mnemonic.clone();
                item.tags = self.tags.clone();
                item
            })
            .collect()
    }
}

pub fn parse_items(json: &str) -> serde_json::Result<Vec<ImportItem>> {
    serde_json::from_str(json)
}
