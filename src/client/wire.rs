use serde::{Deserialize, Serialize};

use crate::model::{Bookmark, ItemStatus, SupportedWebsite, TrackedItem};

use super::ClientError;

/// Scalar the backend sends as either a JSON number or a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Default for Label {
    fn default() -> Self {
        Label::Text(String::new())
    }
}

impl Label {
    pub fn into_string(self) -> String {
        match self {
            Label::Int(value) => value.to_string(),
            Label::Float(value) if value.fract() == 0.0 && value.is_finite() => {
                format!("{value:.0}")
            }
            Label::Float(value) => value.to_string(),
            Label::Text(value) => value.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemRecord {
    #[serde(default)]
    pub id: Label,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default, rename = "imageUrl", alias = "image_url")]
    pub image_url: Option<String>,
    #[serde(
        default,
        rename = "chapter_number",
        alias = "chapterNumber",
        alias = "chapter"
    )]
    pub chapter_number: Label,
    #[serde(default, rename = "lastUpdated", alias = "last_updated")]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl TryFrom<ItemRecord> for TrackedItem {
    type Error = ClientError;

    fn try_from(record: ItemRecord) -> Result<Self, Self::Error> {
        let id = record.id.into_string();
        if id.is_empty() {
            return Err(ClientError::InvalidRecord(format!(
                "item '{}' has no id",
                record.title
            )));
        }
        Ok(TrackedItem {
            id,
            title: record.title,
            link: record.link,
            image_url: record.image_url.unwrap_or_default(),
            chapter_number: record.chapter_number.into_string(),
            last_updated: record.last_updated.unwrap_or_default(),
            status: record
                .status
                .map(ItemStatus::from)
                .unwrap_or_default(),
        })
    }
}

pub fn into_items(records: Vec<ItemRecord>) -> Result<Vec<TrackedItem>, ClientError> {
    records.into_iter().map(TrackedItem::try_from).collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookmarkRecord {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub status: Option<Label>,
}

impl From<BookmarkRecord> for Bookmark {
    fn from(record: BookmarkRecord) -> Self {
        Bookmark {
            title: record.title,
            link: record.link,
            status: record.status.map(Label::into_string).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebsiteRecord {
    #[serde(default, alias = "id")]
    pub website_id: Label,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "lastChecked", alias = "last_checked")]
    pub last_checked: Option<String>,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub status: Option<Label>,
}

impl From<WebsiteRecord> for SupportedWebsite {
    fn from(record: WebsiteRecord) -> Self {
        SupportedWebsite {
            website_id: record.website_id.into_string(),
            title: record.title,
            last_checked: record.last_checked.unwrap_or_default(),
            link: record.link,
            status: record.status.map(Label::into_string).unwrap_or_default(),
        }
    }
}

/// Backend ids go back as numbers; draft ids keep their string marker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WireId<'a> {
    Number(i64),
    Draft(&'a str),
}

impl<'a> WireId<'a> {
    pub fn from_id(id: &'a str) -> Self {
        match id.parse() {
            Ok(number) => WireId::Number(number),
            Err(_) => WireId::Draft(id),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitRecord<'a> {
    pub id: WireId<'a>,
    #[serde(rename = "lastChecked")]
    pub last_checked: &'a str,
    pub link: &'a str,
    pub status: &'a str,
    pub title: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitPayload<'a> {
    pub manga_records: Vec<SubmitRecord<'a>>,
}

impl<'a> SubmitPayload<'a> {
    pub fn from_items(items: &'a [TrackedItem]) -> Self {
        let manga_records = items
            .iter()
            .map(|item| SubmitRecord {
                id: WireId::from_id(&item.id),
                last_checked: &item.last_updated,
                link: &item.link,
                status: item.status.as_str(),
                title: &item.title,
            })
            .collect();
        Self { manga_records }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub confirmation: Vec<ItemRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub email: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub access_token: Option<String>,
}
