use anyhow::{bail, Result};
use indexmap::IndexMap;
use uuid::Uuid;

use crate::model::{ItemStatus, TrackedItem, DRAFT_ID_PREFIX};

#[derive(Debug, Clone)]
struct DraftEntry {
    item: TrackedItem,
    /// Status to go back to when a soft delete is undone.
    original_status: ItemStatus,
}

/// Unsaved edits to the tracked list. Nothing reaches the backend until the
/// caller submits [`EditDraft::records`].
#[derive(Debug, Clone, Default)]
pub struct EditDraft {
    entries: IndexMap<String, DraftEntry>,
    selected: usize,
}

impl EditDraft {
    pub fn from_snapshot(items: &[TrackedItem]) -> Self {
        let entries = items
            .iter()
            .map(|item| {
                (
                    item.id.clone(),
                    DraftEntry {
                        item: item.clone(),
                        original_status: item.status.clone(),
                    },
                )
            })
            .collect();
        Self {
            entries,
            selected: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = &TrackedItem> {
        self.entries.values().map(|entry| &entry.item)
    }

    pub fn get(&self, id: &str) -> Option<&TrackedItem> {
        self.entries.get(id).map(|entry| &entry.item)
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.entries
            .get_index(self.selected)
            .map(|(id, _)| id.as_str())
    }

    pub fn move_selection(&mut self, delta: isize) {
        if self.entries.is_empty() {
            self.selected = 0;
            return;
        }
        let last = self.entries.len() as isize - 1;
        self.selected = (self.selected as isize + delta).clamp(0, last) as usize;
    }

    pub fn add_link(&mut self, link: &str) -> Result<String> {
        let link = link.trim();
        if link.is_empty() {
            bail!("link cannot be empty");
        }
        let duplicate = self.entries.values().any(|entry| {
            !entry.item.is_deleted() && entry.item.link.eq_ignore_ascii_case(link)
        });
        if duplicate {
            bail!("'{link}' is already tracked");
        }
        let id = format!("{DRAFT_ID_PREFIX}{}", Uuid::new_v4());
        let item = TrackedItem {
            id: id.clone(),
            title: title_from_link(link),
            link: link.to_string(),
            image_url: String::new(),
            chapter_number: String::new(),
            last_updated: String::new(),
            status: ItemStatus::Good,
        };
        self.entries.insert(
            id.clone(),
            DraftEntry {
                item,
                original_status: ItemStatus::Good,
            },
        );
        self.selected = self.entries.len() - 1;
        Ok(id)
    }

    /// Soft-deletes or restores `id`. Draft-only items are dropped instead.
    /// Returns `false` when the id is unknown.
    pub fn toggle_delete(&mut self, id: &str) -> bool {
        let Some(entry) = self.entries.get_mut(id) else {
            return false;
        };
        if entry.item.is_draft_only() {
            self.entries.shift_remove(id);
            self.clamp_selection();
            return true;
        }
        entry.item.status = if entry.item.is_deleted() {
            entry.original_status.clone()
        } else {
            ItemStatus::Delete
        };
        true
    }

    pub fn toggle_selected(&mut self) -> bool {
        match self.selected_id().map(str::to_string) {
            Some(id) => self.toggle_delete(&id),
            None => false,
        }
    }

    pub fn restore_all(&mut self) {
        self.entries.retain(|_, entry| !entry.item.is_draft_only());
        for entry in self.entries.values_mut() {
            entry.item.status = entry.original_status.clone();
        }
        self.clamp_selection();
    }

    pub fn pending_additions(&self) -> Vec<&TrackedItem> {
        self.items().filter(|item| item.is_draft_only()).collect()
    }

    pub fn pending_deletions(&self) -> Vec<&TrackedItem> {
        self.entries
            .values()
            .filter(|entry| entry.item.is_deleted() && entry.original_status != ItemStatus::Delete)
            .map(|entry| &entry.item)
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        !self.pending_additions().is_empty() || !self.pending_deletions().is_empty()
    }

    /// Full list to submit, soft-delete markers included.
    pub fn records(&self) -> Vec<TrackedItem> {
        self.items().cloned().collect()
    }

    fn clamp_selection(&mut self) {
        if self.entries.is_empty() {
            self.selected = 0;
        } else if self.selected >= self.entries.len() {
            self.selected = self.entries.len() - 1;
        }
    }
}

/// Placeholder title until the backend scrapes the real one.
fn title_from_link(link: &str) -> String {
    let path = link
        .split(['?', '#'])
        .next()
        .unwrap_or(link)
        .trim_end_matches('/');
    let has_scheme = path.contains("://");
    let without_scheme = path.split_once("://").map_or(path, |(_, rest)| rest);
    let segment = match without_scheme.rsplit_once('/') {
        Some((_, segment)) => segment,
        None if has_scheme => return link.to_string(),
        None => without_scheme,
    };
    let words: Vec<String> = segment
        .split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(capitalize)
        .collect();
    if words.is_empty() {
        link.to_string()
    } else {
        words.join(" ")
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
