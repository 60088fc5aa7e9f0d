use std::fmt;

use serde::{Deserialize, Serialize};

/// Id prefix for items that only exist in an unsaved editor draft.
pub const DRAFT_ID_PREFIX: &str = "new_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedItem {
    pub id: String,
    pub title: String,
    pub link: String,
    pub image_url: String,
    pub chapter_number: String,
    pub last_updated: String,
    pub status: ItemStatus,
}

impl TrackedItem {
    pub fn is_draft_only(&self) -> bool {
        self.id.starts_with(DRAFT_ID_PREFIX)
    }

    pub fn is_deleted(&self) -> bool {
        self.status == ItemStatus::Delete
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemStatus {
    Good,
    Down,
    Delete,
    Other(String),
}

impl ItemStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ItemStatus::Good => "Good",
            ItemStatus::Down => "Down",
            ItemStatus::Delete => "Delete",
            ItemStatus::Other(raw) => raw,
        }
    }

    pub fn health(&self) -> StatusHealth {
        status_health(self.as_str())
    }
}

impl Default for ItemStatus {
    fn default() -> Self {
        ItemStatus::Good
    }
}

impl From<&str> for ItemStatus {
    fn from(raw: &str) -> Self {
        match raw.trim() {
            "Good" => ItemStatus::Good,
            "Down" => ItemStatus::Down,
            "Delete" => ItemStatus::Delete,
            other => ItemStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for ItemStatus {
    fn from(raw: String) -> Self {
        ItemStatus::from(raw.as_str())
    }
}

impl From<ItemStatus> for String {
    fn from(status: ItemStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse colour bucket for status dots in the grid and side panels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusHealth {
    Up,
    Down,
    Unknown,
}

/// Website status tags arrive either as labels or as the last HTTP code seen
/// by the scraper.
pub fn status_health(raw: &str) -> StatusHealth {
    match raw.trim() {
        "Good" | "200" => StatusHealth::Up,
        "Down" | "401" => StatusHealth::Down,
        _ => StatusHealth::Unknown,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub title: String,
    pub link: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedWebsite {
    pub website_id: String,
    pub title: String,
    pub last_checked: String,
    pub link: String,
    pub status: String,
}
