use parking_lot::Mutex;

use crate::model::{Bookmark, ItemStatus, SupportedWebsite, TrackedItem};

use super::{Backend, ClientError, ClientResult, Credentials, Registration};

/// In-memory backend that mimics the scraper service: submissions drop
/// `Delete` markers and give new links real ids.
#[derive(Default)]
pub struct FakeBackend {
    pub items: Mutex<Vec<TrackedItem>>,
    pub bookmarks: Vec<Bookmark>,
    pub websites: Vec<SupportedWebsite>,
    pub submissions: Mutex<Vec<Vec<TrackedItem>>>,
    pub password: Option<String>,
    pub reject_fetch: bool,
    next_id: Mutex<u32>,
}

impl FakeBackend {
    pub fn with_items(items: Vec<TrackedItem>) -> Self {
        Self {
            items: Mutex::new(items),
            next_id: Mutex::new(100),
            ..Self::default()
        }
    }

    pub fn set_chapter(&self, id: &str, chapter: &str) {
        for item in self.items.lock().iter_mut() {
            if item.id == id {
                item.chapter_number = chapter.to_string();
            }
        }
    }
}

impl Backend for FakeBackend {
    fn fetch_items(&self) -> ClientResult<Vec<TrackedItem>> {
        if self.reject_fetch {
            return Err(ClientError::Unauthorized);
        }
        Ok(self.items.lock().clone())
    }

    fn fetch_bookmarks(&self) -> ClientResult<Vec<Bookmark>> {
        if self.reject_fetch {
            return Err(ClientError::Unauthorized);
        }
        Ok(self.bookmarks.clone())
    }

    fn fetch_supported_websites(&self) -> ClientResult<Vec<SupportedWebsite>> {
        if self.reject_fetch {
            return Err(ClientError::Unauthorized);
        }
        Ok(self.websites.clone())
    }

    fn refresh(&self) -> ClientResult<String> {
        Ok(format!("Refreshed {} records", self.items.lock().len()))
    }

    fn submit(&self, items: &[TrackedItem]) -> ClientResult<Vec<TrackedItem>> {
        self.submissions.lock().push(items.to_vec());
        let mut next_id = self.next_id.lock();
        let confirmed: Vec<TrackedItem> = items
            .iter()
            .filter(|item| item.status != ItemStatus::Delete)
            .map(|item| {
                let mut item = item.clone();
                if item.is_draft_only() {
                    *next_id += 1;
                    item.id = next_id.to_string();
                    item.chapter_number = "1".into();
                }
                item
            })
            .collect();
        *self.items.lock() = confirmed.clone();
        Ok(confirmed)
    }

    fn login(&self, credentials: &Credentials) -> ClientResult<String> {
        match &self.password {
            Some(expected) if *expected == credentials.password => {
                Ok(format!("token-for-{}", credentials.username))
            }
            _ => Err(ClientError::Unauthorized),
        }
    }

    fn register(&self, registration: &Registration) -> ClientResult<String> {
        Ok(format!("registered {}", registration.username))
    }
}

pub fn item(id: &str, title: &str, chapter: &str, updated: &str) -> TrackedItem {
    TrackedItem {
        id: id.to_string(),
        title: title.to_string(),
        link: format!("https://manga.test/{}", title.to_lowercase().replace(' ', "-")),
        image_url: String::new(),
        chapter_number: chapter.to_string(),
        last_updated: updated.to_string(),
        status: ItemStatus::Good,
    }
}
