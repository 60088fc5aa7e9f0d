use anyhow::{bail, Result};
use time::OffsetDateTime;
use unicode_segmentation::UnicodeSegmentation;

use crate::client::{Credentials, Registration};
use crate::draft::EditDraft;
use crate::model::{Bookmark, SupportedWebsite, TrackedItem};
use crate::view::{
    detect_new_chapters, AlphabetOrder, DateOrder, ListEntry, NewChapters, SortSelection,
    ViewCache,
};

const MAX_INPUT_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Grid,
    Sidebar,
}

#[derive(Debug, Clone, Default)]
pub struct SearchState {
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorMode {
    Browse,
    AddLink,
}

#[derive(Debug, Clone)]
pub struct EditorOverlay {
    pub draft: EditDraft,
    pub mode: EditorMode,
    pub input: String,
    pub error: Option<String>,
    pub submitting: bool,
}

impl EditorOverlay {
    pub fn new(draft: EditDraft) -> Self {
        Self {
            draft,
            mode: EditorMode::Browse,
            input: String::new(),
            error: None,
            submitting: false,
        }
    }

    pub fn begin_add(&mut self) {
        self.mode = EditorMode::AddLink;
        self.input.clear();
        self.error = None;
    }

    pub fn cancel_input(&mut self) {
        self.mode = EditorMode::Browse;
        self.input.clear();
    }

    pub fn push_char(&mut self, ch: char) {
        if self.input.len() < MAX_INPUT_LEN {
            self.input.push(ch);
        }
    }

    pub fn pop_char(&mut self) {
        pop_grapheme(&mut self.input);
    }

    /// Adds the typed link to the draft. On rejection the input stays open
    /// with the reason in `error`.
    pub fn commit_input(&mut self) -> bool {
        match self.draft.add_link(&self.input) {
            Ok(_) => {
                self.cancel_input();
                self.error = None;
                true
            }
            Err(err) => {
                self.error = Some(err.to_string());
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginField {
    #[default]
    Username,
    Password,
    Email,
}

#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub email: String,
    pub field: LoginField,
    pub register: bool,
    pub error: Option<String>,
    pub submitting: bool,
}

impl LoginForm {
    pub fn new(username: Option<String>) -> Self {
        let username = username.unwrap_or_default();
        let field = if username.is_empty() {
            LoginField::Username
        } else {
            LoginField::Password
        };
        Self {
            username,
            field,
            ..Self::default()
        }
    }

    pub fn next_field(&mut self) {
        self.field = match (self.field, self.register) {
            (LoginField::Username, _) => LoginField::Password,
            (LoginField::Password, true) => LoginField::Email,
            (LoginField::Password, false) | (LoginField::Email, _) => LoginField::Username,
        };
    }

    pub fn toggle_register(&mut self) {
        self.register = !self.register;
        self.error = None;
        if !self.register && self.field == LoginField::Email {
            self.field = LoginField::Username;
        }
    }

    pub fn push_char(&mut self, ch: char) {
        let value = self.active_value_mut();
        if value.len() < MAX_INPUT_LEN {
            value.push(ch);
        }
    }

    pub fn pop_char(&mut self) {
        pop_grapheme(self.active_value_mut());
    }

    fn active_value_mut(&mut self) -> &mut String {
        match self.field {
            LoginField::Username => &mut self.username,
            LoginField::Password => &mut self.password,
            LoginField::Email => &mut self.email,
        }
    }

    pub fn credentials(&self) -> Result<Credentials> {
        let username = self.username.trim();
        if username.is_empty() || self.password.is_empty() {
            bail!("username and password are required");
        }
        Ok(Credentials {
            username: username.to_string(),
            password: self.password.clone(),
        })
    }

    pub fn registration(&self) -> Result<Registration> {
        let credentials = self.credentials()?;
        let email = self.email.trim();
        if !email.contains('@') {
            bail!("a valid email address is required");
        }
        Ok(Registration {
            username: credentials.username,
            password: credentials.password,
            email: email.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub enum Overlay {
    Editor(EditorOverlay),
    Login(LoginForm),
}

/// Latest request id per response kind. Anything else that arrives is stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingRequests {
    pub items: Option<u64>,
    pub bookmarks: Option<u64>,
    pub websites: Option<u64>,
    pub refresh: Option<u64>,
    pub submit: Option<u64>,
    pub auth: Option<u64>,
}

impl PendingRequests {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug)]
pub struct AppState {
    pub focus: FocusPane,
    pub selected: usize,
    pub sidebar_selected: usize,
    pub bookmarks: Vec<Bookmark>,
    pub websites: Vec<SupportedWebsite>,
    pub overlay: Option<Overlay>,
    pub status_message: Option<String>,
    pub pending: PendingRequests,
    pub last_synced: Option<OffsetDateTime>,
    pub from_cache: bool,
    pub username: Option<String>,
    items: Vec<TrackedItem>,
    generation: u64,
    new_chapters: NewChapters,
    selection: SortSelection,
    search: SearchState,
    view: ViewCache,
}

impl AppState {
    pub fn new(selection: SortSelection) -> Self {
        let mut state = Self {
            focus: FocusPane::Grid,
            selected: 0,
            sidebar_selected: 0,
            bookmarks: Vec::new(),
            websites: Vec::new(),
            overlay: None,
            status_message: None,
            pending: PendingRequests::default(),
            last_synced: None,
            from_cache: false,
            username: None,
            items: Vec::new(),
            generation: 0,
            new_chapters: NewChapters::default(),
            selection,
            search: SearchState::default(),
            view: ViewCache::default(),
        };
        state.sync_view();
        state
    }

    pub fn items(&self) -> &[TrackedItem] {
        &self.items
    }

    pub fn entries(&self) -> &[ListEntry] {
        self.view.current()
    }

    pub fn selected_entry(&self) -> Option<&ListEntry> {
        self.entries().get(self.selected)
    }

    pub fn selection(&self) -> &SortSelection {
        &self.selection
    }

    pub fn new_chapter_count(&self) -> usize {
        self.new_chapters.len()
    }

    /// Shows a snapshot read from the local cache until the backend answers.
    pub fn load_cached(&mut self, items: Vec<TrackedItem>, fetched_at: Option<OffsetDateTime>) {
        self.items = items;
        self.new_chapters = NewChapters::default();
        self.from_cache = true;
        self.last_synced = fetched_at;
        self.bump_generation();
    }

    pub fn clear_snapshot(&mut self) {
        self.items.clear();
        self.new_chapters = NewChapters::default();
        self.from_cache = false;
        self.last_synced = None;
        self.bump_generation();
    }

    /// Replaces the snapshot wholesale, flagging chapters that moved since
    /// the one it replaces. Returns the number of flagged items.
    pub fn apply_snapshot(&mut self, items: Vec<TrackedItem>) -> usize {
        self.new_chapters = detect_new_chapters(&self.items, &items);
        self.items = items;
        self.from_cache = false;
        self.last_synced = Some(OffsetDateTime::now_utc());
        self.bump_generation();
        self.new_chapters.len()
    }

    fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.sync_view();
    }

    fn sync_view(&mut self) {
        let len = self
            .view
            .entries(
                self.generation,
                &self.items,
                &self.selection,
                &self.new_chapters,
            )
            .len();
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }

    pub fn move_selection(&mut self, delta: isize) {
        let (len, cursor) = match self.focus {
            FocusPane::Grid => (self.entries().len(), &mut self.selected),
            FocusPane::Sidebar => (self.bookmarks.len(), &mut self.sidebar_selected),
        };
        if len == 0 {
            *cursor = 0;
            return;
        }
        let last = len as isize - 1;
        *cursor = (*cursor as isize + delta).clamp(0, last) as usize;
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            FocusPane::Grid => FocusPane::Sidebar,
            FocusPane::Sidebar => FocusPane::Grid,
        };
    }

    pub fn set_bookmarks(&mut self, bookmarks: Vec<Bookmark>) {
        self.bookmarks = bookmarks;
        if self.sidebar_selected >= self.bookmarks.len() {
            self.sidebar_selected = self.bookmarks.len().saturating_sub(1);
        }
    }

    pub fn cycle_alphabet(&mut self) -> AlphabetOrder {
        self.selection.alphabet = self.selection.alphabet.next();
        self.sync_view();
        self.selection.alphabet
    }

    pub fn cycle_date(&mut self) -> DateOrder {
        self.selection.date = self.selection.date.next();
        self.sync_view();
        self.selection.date
    }

    pub fn begin_search(&mut self) {
        self.search.active = true;
        self.focus = FocusPane::Grid;
    }

    pub fn finish_search(&mut self) {
        self.search.active = false;
    }

    pub fn cancel_search(&mut self) {
        self.search.active = false;
        if !self.selection.search_term.is_empty() {
            self.selection.search_term.clear();
            self.sync_view();
        }
    }

    pub fn push_search_char(&mut self, ch: char) {
        if self.selection.search_term.len() >= MAX_INPUT_LEN {
            return;
        }
        self.selection.search_term.push(ch);
        self.selected = 0;
        self.sync_view();
    }

    pub fn pop_search_char(&mut self) {
        if pop_grapheme(&mut self.selection.search_term) {
            self.sync_view();
        }
    }

    pub fn search_query(&self) -> &str {
        &self.selection.search_term
    }

    pub fn is_search_active(&self) -> bool {
        self.search.active
    }

    pub fn open_editor(&mut self) {
        self.search.active = false;
        self.overlay = Some(Overlay::Editor(EditorOverlay::new(
            EditDraft::from_snapshot(&self.items),
        )));
    }

    pub fn open_login(&mut self) {
        if matches!(self.overlay, Some(Overlay::Login(_))) {
            return;
        }
        self.search.active = false;
        self.overlay = Some(Overlay::Login(LoginForm::new(self.username.clone())));
    }

    pub fn close_overlay(&mut self) {
        self.overlay = None;
    }

    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    pub fn editor_mut(&mut self) -> Option<&mut EditorOverlay> {
        match self.overlay.as_mut() {
            Some(Overlay::Editor(editor)) => Some(editor),
            _ => None,
        }
    }

    pub fn login_mut(&mut self) -> Option<&mut LoginForm> {
        match self.overlay.as_mut() {
            Some(Overlay::Login(form)) => Some(form),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.pending.items.is_some() || self.pending.refresh.is_some()
    }

    pub fn set_status_message<S: Into<String>>(&mut self, message: Option<S>) {
        self.status_message = message.map(Into::into);
    }

    pub fn clear_status_message(&mut self) {
        self.status_message = None;
    }
}

fn pop_grapheme(value: &mut String) -> bool {
    match value.grapheme_indices(true).next_back() {
        Some((idx, _)) => {
            value.truncate(idx);
            true
        }
        None => false,
    }
}
