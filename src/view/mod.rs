//! Turns a fetched item snapshot plus the current filter controls into the
//! ordered list the results grid renders.
//!
//! Everything in here is pure: inputs are borrowed, outputs are fresh
//! vectors, and nothing touches the network or the terminal.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};
use time::format_description::well_known::Rfc3339;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

use crate::model::TrackedItem;

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AlphabetOrder {
    #[default]
    None,
    Alphabetical,
    ReverseAlphabetical,
}

impl AlphabetOrder {
    pub fn label(&self) -> &'static str {
        match self {
            AlphabetOrder::None => "None",
            AlphabetOrder::Alphabetical => "A-Z",
            AlphabetOrder::ReverseAlphabetical => "Z-A",
        }
    }

    pub fn next(self) -> Self {
        cycle(self)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DateOrder {
    #[default]
    None,
    NewestDate,
    OldestDate,
}

impl DateOrder {
    pub fn label(&self) -> &'static str {
        match self {
            DateOrder::None => "None",
            DateOrder::NewestDate => "Newest",
            DateOrder::OldestDate => "Oldest",
        }
    }

    pub fn next(self) -> Self {
        cycle(self)
    }
}

fn cycle<T: IntoEnumIterator + PartialEq + Copy>(current: T) -> T {
    let all: Vec<T> = T::iter().collect();
    let position = all.iter().position(|value| *value == current).unwrap_or(0);
    all[(position + 1) % all.len()]
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SortSelection {
    pub search_term: String,
    pub alphabet: AlphabetOrder,
    pub date: DateOrder,
}

impl SortSelection {
    pub fn new(alphabet: AlphabetOrder, date: DateOrder) -> Self {
        Self {
            search_term: String::new(),
            alphabet,
            date,
        }
    }

    pub fn with_search<S: Into<String>>(mut self, term: S) -> Self {
        self.search_term = term.into();
        self
    }

    pub fn derive(&self, items: &[TrackedItem]) -> Vec<TrackedItem> {
        derive(items, &self.search_term, self.alphabet, self.date)
    }
}

pub fn derive(
    items: &[TrackedItem],
    search_term: &str,
    alphabet: AlphabetOrder,
    date: DateOrder,
) -> Vec<TrackedItem> {
    let mut ordered = items.to_vec();

    let alphabet_sorted = alphabet != AlphabetOrder::None;
    if alphabet_sorted {
        sort_by_title(&mut ordered, alphabet);
    }

    if date != DateOrder::None {
        ordered = sort_groups_by_date(ordered, alphabet_sorted, date);
    }

    let needle = search_term.to_lowercase();
    ordered.retain(|item| title_matches(&item.title, &needle));
    ordered
}

/// `needle` must already be lowercased.
pub fn title_matches(title: &str, needle: &str) -> bool {
    needle.is_empty() || title.to_lowercase().contains(needle)
}

fn sort_by_title(items: &mut [TrackedItem], order: AlphabetOrder) {
    match order {
        AlphabetOrder::None => {}
        AlphabetOrder::Alphabetical => items.sort_by_cached_key(|item| item.title.to_lowercase()),
        AlphabetOrder::ReverseAlphabetical => {
            let mut keyed: Vec<(String, TrackedItem)> = items
                .iter()
                .map(|item| (item.title.to_lowercase(), item.clone()))
                .collect();
            keyed.sort_by(|a, b| b.0.cmp(&a.0));
            for (slot, (_, item)) in items.iter_mut().zip(keyed) {
                *slot = item;
            }
        }
    }
}

fn sort_groups_by_date(
    items: Vec<TrackedItem>,
    group_by_letter: bool,
    order: DateOrder,
) -> Vec<TrackedItem> {
    let mut groups: Vec<Vec<(i128, TrackedItem)>> = Vec::new();
    let mut current_key: Option<Option<String>> = None;
    for item in items {
        let key = if group_by_letter {
            first_letter(&item.title)
        } else {
            None
        };
        let stamp = timestamp_key(&item.last_updated);
        match groups.last_mut() {
            Some(group) if current_key.as_ref() == Some(&key) => group.push((stamp, item)),
            _ => {
                groups.push(vec![(stamp, item)]);
                current_key = Some(key);
            }
        }
    }

    let mut out = Vec::new();
    for mut group in groups {
        group.sort_by(|a, b| compare_stamps(a.0, b.0, order));
        out.extend(group.into_iter().map(|(_, item)| item));
    }
    out
}

fn compare_stamps(a: i128, b: i128, order: DateOrder) -> Ordering {
    match order {
        DateOrder::NewestDate => b.cmp(&a),
        DateOrder::OldestDate => a.cmp(&b),
        DateOrder::None => Ordering::Equal,
    }
}

fn first_letter(title: &str) -> Option<String> {
    title.chars().next().map(|ch| ch.to_lowercase().collect())
}

/// Parses the backend's `lastUpdated` value. Returns `None` for anything
/// that is not one of the accepted ISO-8601 shapes.
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(parsed);
    }
    let naive_formats: [&[FormatItem<'static>]; 5] = [
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]"),
    ];
    for format in naive_formats {
        if let Ok(parsed) = PrimitiveDateTime::parse(raw, format) {
            return Some(parsed.assume_utc());
        }
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|date| date.with_time(Time::MIDNIGHT).assume_utc())
}

/// Sort key for `lastUpdated`; unparsable values sort below every real date.
pub fn timestamp_key(raw: &str) -> i128 {
    parse_timestamp(raw)
        .map(|dt| dt.unix_timestamp_nanos())
        .unwrap_or(i128::MIN)
}

/// Ids whose chapter label changed between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewChapters {
    ids: HashSet<String>,
}

impl NewChapters {
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Items only present in `current` have no earlier chapter and are not
/// flagged.
pub fn detect_new_chapters(previous: &[TrackedItem], current: &[TrackedItem]) -> NewChapters {
    let before: HashMap<&str, &str> = previous
        .iter()
        .map(|item| (item.id.as_str(), item.chapter_number.trim()))
        .collect();
    let ids = current
        .iter()
        .filter(|item| {
            before
                .get(item.id.as_str())
                .is_some_and(|chapter| *chapter != item.chapter_number.trim())
        })
        .map(|item| item.id.clone())
        .collect();
    NewChapters { ids }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub item: TrackedItem,
    pub is_new: bool,
}

/// What the results grid shows: soft-deleted items dropped, the rest
/// derived and annotated.
pub fn build_entries(
    items: &[TrackedItem],
    selection: &SortSelection,
    new_chapters: &NewChapters,
) -> Vec<ListEntry> {
    let visible: Vec<TrackedItem> = items
        .iter()
        .filter(|item| !item.is_deleted())
        .cloned()
        .collect();
    selection
        .derive(&visible)
        .into_iter()
        .map(|item| {
            let is_new = new_chapters.contains(&item.id);
            ListEntry { item, is_new }
        })
        .collect()
}

/// Memoises the last derived list keyed on snapshot generation and selection.
#[derive(Debug, Default)]
pub struct ViewCache {
    key: Option<(u64, SortSelection)>,
    entries: Vec<ListEntry>,
}

impl ViewCache {
    pub fn entries(
        &mut self,
        generation: u64,
        items: &[TrackedItem],
        selection: &SortSelection,
        new_chapters: &NewChapters,
    ) -> &[ListEntry] {
        let fresh = matches!(&self.key, Some((gen, sel)) if *gen == generation && sel == selection);
        if !fresh {
            self.entries = build_entries(items, selection, new_chapters);
            self.key = Some((generation, selection.clone()));
        }
        &self.entries
    }

    /// Entries from the most recent [`ViewCache::entries`] call.
    pub fn current(&self) -> &[ListEntry] {
        &self.entries
    }

    pub fn invalidate(&mut self) {
        self.key = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemStatus;

    fn item(id: &str, title: &str, updated: &str) -> TrackedItem {
        TrackedItem {
            id: id.into(),
            title: title.into(),
            link: format!("https://example.test/{id}"),
            image_url: String::new(),
            chapter_number: "1".into(),
            last_updated: updated.into(),
            status: ItemStatus::Good,
        }
    }

    fn titles(items: &[TrackedItem]) -> Vec<&str> {
        items.iter().map(|item| item.title.as_str()).collect()
    }

    fn sample() -> Vec<TrackedItem> {
        vec![
            item("1", "Overgeared", "2024-03-01"),
            item("2", "one piece", "2024-05-01"),
            item("3", "Blue Lock", "2023-12-24T08:00:00Z"),
            item("4", "Omniscient Reader", "not a date"),
            item("5", "bleach", "2024-01-15 10:30:00"),
            item("6", "Solo Leveling", "2024-05-01"),
        ]
    }

    #[test]
    fn alphabetical_then_none_orders_case_insensitively() {
        let items = vec![
            item("1", "Zeta", "2024-01-01"),
            item("2", "Alpha", "2024-06-01"),
        ];
        let out = derive(&items, "", AlphabetOrder::Alphabetical, DateOrder::None);
        assert_eq!(titles(&out), vec!["Alpha", "Zeta"]);
    }

    #[test]
    fn date_sort_alone_is_one_global_group() {
        let items = vec![
            item("1", "Zeta", "2024-01-01"),
            item("2", "Alpha", "2024-06-01"),
        ];
        let out = derive(&items, "", AlphabetOrder::None, DateOrder::NewestDate);
        assert_eq!(titles(&out), vec!["Alpha", "Zeta"]);

        let out = derive(&sample(), "", AlphabetOrder::None, DateOrder::OldestDate);
        assert_eq!(
            titles(&out),
            vec![
                "Omniscient Reader",
                "Blue Lock",
                "bleach",
                "Overgeared",
                "one piece",
                "Solo Leveling"
            ]
        );
    }

    #[test]
    fn empty_titles_form_their_own_group_under_reverse_order() {
        let items = vec![
            item("1", "Ab", "2024-01-01"),
            item("2", "", "2023-01-01"),
            item("3", "az", "2024-06-01"),
            item("4", "b", "garbage"),
            item("5", "", "2024-02-01"),
        ];
        let out = derive(
            &items,
            "",
            AlphabetOrder::ReverseAlphabetical,
            DateOrder::NewestDate,
        );
        let ids: Vec<&str> = out.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["4", "3", "1", "5", "2"]);

        let out = derive(
            &items,
            "",
            AlphabetOrder::ReverseAlphabetical,
            DateOrder::OldestDate,
        );
        let ids: Vec<&str> = out.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["4", "1", "3", "2", "5"]);
    }

    #[test]
    fn date_sort_stays_inside_first_letter_runs_after_alphabet_sort() {
        let out = derive(
            &sample(),
            "",
            AlphabetOrder::Alphabetical,
            DateOrder::NewestDate,
        );
        assert_eq!(
            titles(&out),
            vec![
                "bleach",
                "Blue Lock",
                "one piece",
                "Overgeared",
                "Omniscient Reader",
                "Solo Leveling"
            ]
        );
    }

    #[test]
    fn reverse_alphabetical_keeps_ties_in_input_order() {
        let items = vec![
            item("1", "Naruto", "2024-01-01"),
            item("2", "naruto", "2024-02-01"),
            item("3", "Berserk", "2024-03-01"),
        ];
        let out = derive(
            &items,
            "",
            AlphabetOrder::ReverseAlphabetical,
            DateOrder::None,
        );
        let ids: Vec<&str> = out.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn equal_dates_preserve_relative_order() {
        let items = vec![
            item("a", "First", "2024-05-01"),
            item("b", "Second", "2024-05-01"),
            item("c", "Third", "2024-05-01"),
        ];
        let out = derive(&items, "", AlphabetOrder::None, DateOrder::NewestDate);
        let ids: Vec<&str> = out.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn no_options_returns_search_filtered_input_in_order() {
        let items = sample();
        let out = derive(&items, "", AlphabetOrder::None, DateOrder::None);
        assert_eq!(out, items);

        let out = derive(&items, "O", AlphabetOrder::None, DateOrder::None);
        let expected: Vec<TrackedItem> = items
            .iter()
            .filter(|item| item.title.to_lowercase().contains('o'))
            .cloned()
            .collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let items = vec![
            item("1", "Apple", "2024-01-01"),
            item("2", "Apricot", "2024-01-02"),
        ];
        assert_eq!(
            derive(&items, "ap", AlphabetOrder::None, DateOrder::None).len(),
            2
        );
        assert_eq!(
            derive(&items, "APR", AlphabetOrder::None, DateOrder::None).len(),
            1
        );
        assert!(derive(&items, "z", AlphabetOrder::None, DateOrder::None).is_empty());
    }

    #[test]
    fn every_alphabet_result_is_ordered_and_filtered() {
        let items = sample();
        for date in DateOrder::iter() {
            let out = derive(&items, "l", AlphabetOrder::Alphabetical, date);
            for item in &out {
                assert!(item.title.to_lowercase().contains('l'));
            }
            if date == DateOrder::None {
                for pair in out.windows(2) {
                    assert!(pair[0].title.to_lowercase() <= pair[1].title.to_lowercase());
                }
            }
            let excluded = items
                .iter()
                .filter(|item| !out.iter().any(|kept| kept.id == item.id));
            for item in excluded {
                assert!(!item.title.to_lowercase().contains('l'));
            }
        }
    }

    #[test]
    fn derive_is_idempotent_and_leaves_input_alone() {
        let items = sample();
        let before = items.clone();
        let first = derive(
            &items,
            "e",
            AlphabetOrder::ReverseAlphabetical,
            DateOrder::OldestDate,
        );
        let second = derive(
            &items,
            "e",
            AlphabetOrder::ReverseAlphabetical,
            DateOrder::OldestDate,
        );
        assert_eq!(first, second);
        assert_eq!(items, before);
    }

    #[test]
    fn timestamps_accept_common_iso_shapes() {
        assert!(parse_timestamp("2024-01-01").is_some());
        assert!(parse_timestamp("2024-01-01T10:00:00").is_some());
        assert!(parse_timestamp("2024-01-01T10:00:00.123456").is_some());
        assert!(parse_timestamp("2024-01-01 10:00:00").is_some());
        assert!(parse_timestamp("2024-01-01T10:00:00+02:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
        assert_eq!(timestamp_key(""), i128::MIN);
        assert!(timestamp_key("1969-12-31") > timestamp_key("garbage"));
    }

    #[test]
    fn chapter_change_is_flagged_as_new() {
        let mut previous = item("1", "Berserk", "2024-01-01");
        previous.chapter_number = "5".into();
        let mut current = previous.clone();
        current.chapter_number = "6".into();

        let flagged = detect_new_chapters(&[previous.clone()], &[current]);
        assert!(flagged.contains("1"));

        let unchanged = detect_new_chapters(&[previous.clone()], &[previous]);
        assert!(unchanged.is_empty());
    }

    #[test]
    fn items_without_history_are_not_new() {
        let current = vec![item("9", "Kaiju No. 8", "2024-01-01")];
        assert!(detect_new_chapters(&[], &current).is_empty());
    }

    #[test]
    fn grid_entries_hide_soft_deleted_and_mark_new() {
        let mut items = sample();
        items[1].status = ItemStatus::Delete;
        let mut previous = sample();
        previous[0].chapter_number = "0".into();
        let new_chapters = detect_new_chapters(&previous, &items);

        let selection = SortSelection::new(AlphabetOrder::Alphabetical, DateOrder::None);
        let entries = build_entries(&items, &selection, &new_chapters);

        assert!(!entries.iter().any(|entry| entry.item.id == "2"));
        let overgeared = entries
            .iter()
            .find(|entry| entry.item.id == "1")
            .expect("overgeared present");
        assert!(overgeared.is_new);
        assert_eq!(entries.iter().filter(|entry| entry.is_new).count(), 1);
    }

    #[test]
    fn view_cache_recomputes_only_on_key_change() {
        let mut cache = ViewCache::default();
        let items = sample();
        let none = NewChapters::default();
        let selection = SortSelection::default();
        assert_eq!(cache.entries(1, &items, &selection, &none).len(), 6);

        let filtered = selection.clone().with_search("solo");
        assert_eq!(cache.entries(1, &items, &filtered, &none).len(), 1);

        // Same key: stale input is not re-read.
        assert_eq!(cache.entries(1, &[], &filtered, &none).len(), 1);
        assert!(cache.entries(2, &[], &filtered, &none).is_empty());
    }

    #[test]
    fn options_cycle_and_parse_from_kebab_case() {
        assert_eq!(AlphabetOrder::None.next(), AlphabetOrder::Alphabetical);
        assert_eq!(AlphabetOrder::ReverseAlphabetical.next(), AlphabetOrder::None);
        assert_eq!(DateOrder::NewestDate.next(), DateOrder::OldestDate);
        assert_eq!(
            "reverse-alphabetical".parse::<AlphabetOrder>().ok(),
            Some(AlphabetOrder::ReverseAlphabetical)
        );
        assert_eq!(DateOrder::NewestDate.to_string(), "newest-date");
    }
}
