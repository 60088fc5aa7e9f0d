use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::ListState;
use ratatui::Terminal;

use crate::client::{Backend, ClientError, ClientResult};
use crate::config::AppConfig;
use crate::session::SessionProvider;
use crate::storage::CacheHandle;
use crate::ui;

mod actions;
pub mod state;

pub use actions::{ActionDispatcher, AsyncResponse, Request, Response};
pub use state::{
    AppState, EditorMode, EditorOverlay, FocusPane, LoginField, LoginForm, Overlay,
    PendingRequests,
};

enum Action {
    Quit,
    SelectNext,
    SelectPrevious,
    ToggleFocus,
    StartSearch,
    CycleAlphabet,
    CycleDate,
    OpenEditor,
    Reload,
    Rescrape,
}

pub struct App {
    pub config: Arc<AppConfig>,
    session: Arc<dyn SessionProvider>,
    cache: Option<CacheHandle>,
    dispatcher: ActionDispatcher,
    state: AppState,
    list_state: ListState,
    sidebar_state: ListState,
    should_quit: bool,
    tick_rate: Duration,
}

impl App {
    pub fn new(
        config: Arc<AppConfig>,
        backend: Arc<dyn Backend>,
        session: Arc<dyn SessionProvider>,
        cache: Option<CacheHandle>,
    ) -> Result<Self> {
        let mut state = AppState::new(config.initial_selection());
        state.username = session.username();
        let tick_rate = config.ui.tick_rate();
        let mut app = Self {
            dispatcher: ActionDispatcher::new(backend),
            config,
            session,
            cache,
            state,
            list_state: ListState::default(),
            sidebar_state: ListState::default(),
            should_quit: false,
            tick_rate,
        };
        if app.config.auth.require_login && !app.session.is_authenticated() {
            app.state.open_login();
            app.state
                .set_status_message(Some("Log in to load your tracked titles"));
        } else {
            app.show_cached_snapshot();
            app.reload_all();
        }
        Ok(app)
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        restore_terminal(&mut terminal)?;
        result
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        loop {
            terminal
                .draw(|frame| {
                    if self.state.entries().is_empty() {
                        self.list_state.select(None);
                    } else {
                        self.list_state.select(Some(self.state.selected));
                    }
                    if self.state.bookmarks.is_empty() {
                        self.sidebar_state.select(None);
                    } else {
                        self.sidebar_state.select(Some(self.state.sidebar_selected));
                    }
                    ui::draw_app(
                        frame,
                        &self.state,
                        self.config.ui.show_bookmarks,
                        &mut self.list_state,
                        &mut self.sidebar_state,
                    );
                })
                .context("rendering frame")?;

            if self.should_quit {
                break;
            }

            let timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(0));

            if event::poll(timeout).context("polling for terminal events")? {
                if let Event::Key(key) = event::read().context("reading terminal event")? {
                    self.handle_key(key);
                }
            }

            if last_tick.elapsed() >= self.tick_rate {
                self.on_tick();
                last_tick = Instant::now();
            }
        }
        Ok(())
    }

    fn on_tick(&mut self) {
        while let Some(response) = self.dispatcher.try_recv() {
            self.handle_response(response);
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        if self.handle_overlay_key(key) {
            return;
        }

        if self.state.is_search_active() {
            match key.code {
                KeyCode::Esc => {
                    self.state.cancel_search();
                    return;
                }
                KeyCode::Enter => {
                    self.state.finish_search();
                    return;
                }
                KeyCode::Backspace => {
                    self.state.pop_search_char();
                    return;
                }
                KeyCode::Char(ch) if is_plain(&key) => {
                    self.state.push_search_char(ch);
                    return;
                }
                _ => {}
            }
        }

        let action = match key.code {
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Char('j') | KeyCode::Down => Some(Action::SelectNext),
            KeyCode::Char('k') | KeyCode::Up => Some(Action::SelectPrevious),
            KeyCode::Tab => Some(Action::ToggleFocus),
            KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Reload)
            }
            KeyCode::Char('/') if is_plain(&key) => Some(Action::StartSearch),
            KeyCode::Char('s') if is_plain(&key) => Some(Action::CycleAlphabet),
            KeyCode::Char('d') if is_plain(&key) => Some(Action::CycleDate),
            KeyCode::Char('e') if is_plain(&key) => Some(Action::OpenEditor),
            KeyCode::Char('R') => Some(Action::Rescrape),
            _ => None,
        };

        if let Some(action) = action {
            self.handle_action(action);
        }
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::SelectNext => self.state.move_selection(1),
            Action::SelectPrevious => self.state.move_selection(-1),
            Action::ToggleFocus => self.state.toggle_focus(),
            Action::StartSearch => self.state.begin_search(),
            Action::CycleAlphabet => {
                let order = self.state.cycle_alphabet();
                self.state
                    .set_status_message(Some(format!("Title order: {}", order.label())));
            }
            Action::CycleDate => {
                let order = self.state.cycle_date();
                self.state
                    .set_status_message(Some(format!("Date order: {}", order.label())));
            }
            Action::OpenEditor => {
                self.state.open_editor();
                self.state.set_status_message(Some(
                    "a add link, x toggle delete, u restore, Enter save, Esc discard",
                ));
            }
            Action::Reload => {
                self.reload_all();
                self.state.set_status_message(Some("Reloading from backend…"));
            }
            Action::Rescrape => self.handle_rescrape(),
        }
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) -> bool {
        match self.state.overlay() {
            Some(Overlay::Editor(_)) => {
                self.handle_editor_key(key);
                true
            }
            Some(Overlay::Login(_)) => {
                self.handle_login_key(key);
                true
            }
            None => false,
        }
    }

    fn handle_editor_key(&mut self, key: KeyEvent) {
        let Some(editor) = self.state.editor_mut() else {
            return;
        };
        if editor.submitting {
            return;
        }
        match editor.mode {
            EditorMode::AddLink => match key.code {
                KeyCode::Esc => editor.cancel_input(),
                KeyCode::Enter => {
                    editor.commit_input();
                }
                KeyCode::Backspace => editor.pop_char(),
                KeyCode::Char(ch) if is_plain(&key) => editor.push_char(ch),
                _ => {}
            },
            EditorMode::Browse => match key.code {
                KeyCode::Esc => {
                    self.state.close_overlay();
                    self.state.set_status_message(Some("Discarded list changes"));
                }
                KeyCode::Enter => self.submit_draft(),
                KeyCode::Char('j') | KeyCode::Down => editor.draft.move_selection(1),
                KeyCode::Char('k') | KeyCode::Up => editor.draft.move_selection(-1),
                KeyCode::Char('a') => editor.begin_add(),
                KeyCode::Char('x') | KeyCode::Char(' ') => {
                    editor.draft.toggle_selected();
                }
                KeyCode::Char('u') => editor.draft.restore_all(),
                _ => {}
            },
        }
    }

    fn submit_draft(&mut self) {
        let Some(editor) = self.state.editor_mut() else {
            return;
        };
        if !editor.draft.is_dirty() {
            self.state.close_overlay();
            self.state.set_status_message(Some("No changes to save"));
            return;
        }
        let records = editor.draft.records();
        match self.dispatcher.dispatch(Request::Submit(records)) {
            Ok(request_id) => {
                if let Some(editor) = self.state.editor_mut() {
                    editor.submitting = true;
                    editor.error = None;
                }
                self.state.pending.submit = Some(request_id);
                self.state.set_status_message(Some("Saving list…"));
            }
            Err(err) => {
                tracing::error!(?err, "failed to submit list changes");
                if let Some(editor) = self.state.editor_mut() {
                    editor.error = Some(format!("{err:#}"));
                }
            }
        }
    }

    fn handle_login_key(&mut self, key: KeyEvent) {
        let gate_required = self.config.auth.require_login && !self.session.is_authenticated();
        let Some(form) = self.state.login_mut() else {
            return;
        };
        if form.submitting {
            return;
        }
        match key.code {
            KeyCode::Esc if gate_required => self.should_quit = true,
            KeyCode::Esc => {
                self.state.close_overlay();
                self.state.clear_status_message();
            }
            KeyCode::Tab => form.next_field(),
            KeyCode::Char('n') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                form.toggle_register()
            }
            KeyCode::Enter => self.submit_login(),
            KeyCode::Backspace => form.pop_char(),
            KeyCode::Char(ch) if is_plain(&key) => form.push_char(ch),
            _ => {}
        }
    }

    fn submit_login(&mut self) {
        let Some(form) = self.state.login_mut() else {
            return;
        };
        let request = if form.register {
            form.registration().map(Request::Register)
        } else {
            form.credentials().map(Request::Login)
        };
        let request = match request {
            Ok(request) => request,
            Err(err) => {
                form.error = Some(err.to_string());
                return;
            }
        };
        match self.dispatcher.dispatch(request) {
            Ok(request_id) => {
                if let Some(form) = self.state.login_mut() {
                    form.submitting = true;
                    form.error = None;
                }
                self.state.pending.auth = Some(request_id);
            }
            Err(err) => {
                tracing::error!(?err, "failed to start login request");
                if let Some(form) = self.state.login_mut() {
                    form.error = Some(format!("{err:#}"));
                }
            }
        }
    }

    fn handle_rescrape(&mut self) {
        if self.state.pending.refresh.is_some() {
            self.state
                .set_status_message(Some("Backend refresh already running"));
            return;
        }
        match self.dispatcher.dispatch(Request::Refresh) {
            Ok(request_id) => {
                self.state.pending.refresh = Some(request_id);
                self.state
                    .set_status_message(Some("Asked backend to re-check every site…"));
            }
            Err(err) => {
                tracing::error!(?err, "failed to start backend refresh");
                self.state
                    .set_status_message(Some(format!("Refresh failed: {err:#}")));
            }
        }
    }

    fn reload_all(&mut self) {
        self.state.pending.items = self.dispatch_logged(Request::Items);
        if self.config.ui.show_bookmarks {
            self.state.pending.bookmarks = self.dispatch_logged(Request::Bookmarks);
            self.state.pending.websites = self.dispatch_logged(Request::Websites);
        }
    }

    fn dispatch_logged(&mut self, request: Request) -> Option<u64> {
        match self.dispatcher.dispatch(request) {
            Ok(request_id) => Some(request_id),
            Err(err) => {
                tracing::error!(?err, "failed to dispatch backend request");
                self.state
                    .set_status_message(Some(format!("Could not reach backend: {err:#}")));
                None
            }
        }
    }

    fn handle_response(&mut self, response: AsyncResponse) {
        let AsyncResponse {
            request_id,
            response,
        } = response;
        let pending = &mut self.state.pending;
        let slot = match &response {
            Response::Items(_) => &mut pending.items,
            Response::Bookmarks(_) => &mut pending.bookmarks,
            Response::Websites(_) => &mut pending.websites,
            Response::Refreshed(_) => &mut pending.refresh,
            Response::Submitted(_) => &mut pending.submit,
            Response::LoggedIn { .. } | Response::Registered { .. } => &mut pending.auth,
        };
        if *slot != Some(request_id) {
            tracing::debug!(request_id, "ignoring stale backend response");
            return;
        }
        *slot = None;

        match response {
            Response::Items(Ok(items)) => {
                let flagged = self.state.apply_snapshot(items);
                self.persist_snapshot();
                let count = self.state.items().len();
                tracing::info!(count, flagged, "tracked titles loaded");
                let message = if flagged > 0 {
                    format!("Loaded {count} titles, {flagged} with new chapters")
                } else {
                    format!("Loaded {count} titles")
                };
                self.state.set_status_message(Some(message));
            }
            Response::Items(Err(err)) => self.report_client_error(err, "Loading titles"),
            Response::Bookmarks(Ok(bookmarks)) => self.state.set_bookmarks(bookmarks),
            Response::Bookmarks(Err(err)) => self.report_client_error(err, "Loading bookmarks"),
            Response::Websites(Ok(websites)) => self.state.websites = websites,
            Response::Websites(Err(err)) => {
                self.report_client_error(err, "Loading supported websites")
            }
            Response::Refreshed(Ok(message)) => {
                tracing::info!(%message, "backend refresh finished");
                self.state.set_status_message(Some(message));
                self.state.pending.items = self.dispatch_logged(Request::Items);
            }
            Response::Refreshed(Err(err)) => self.report_client_error(err, "Backend refresh"),
            Response::Submitted(Ok(items)) => {
                if matches!(self.state.overlay(), Some(Overlay::Editor(_))) {
                    self.state.close_overlay();
                }
                self.state.apply_snapshot(items);
                self.persist_snapshot();
                let count = self.state.items().len();
                self.state
                    .set_status_message(Some(format!("Saved list: {count} titles")));
            }
            Response::Submitted(Err(err)) => {
                tracing::error!(?err, "list update rejected");
                if let Some(editor) = self.state.editor_mut() {
                    editor.submitting = false;
                    editor.error = Some(err.to_string());
                }
                if err.is_unauthorized() {
                    self.state
                        .set_status_message(Some("Session expired; log in and save again"));
                }
            }
            Response::LoggedIn { username, result } => self.finish_login(username, result),
            Response::Registered { username, result } => match result {
                Ok(message) => {
                    tracing::info!(%username, "registered account");
                    if let Some(form) = self.state.login_mut() {
                        form.submitting = false;
                        form.toggle_register();
                    }
                    self.state
                        .set_status_message(Some(format!("{message}; press Enter to log in")));
                }
                Err(err) => self.fail_login(err),
            },
        }
    }

    fn finish_login(&mut self, username: String, result: ClientResult<String>) {
        let token = match result {
            Ok(token) => token,
            Err(err) => {
                self.fail_login(err);
                return;
            }
        };
        if let Err(err) = self.session.store(&token, &username) {
            tracing::error!(?err, "failed to persist session");
        }
        tracing::info!(%username, "logged in");
        self.state.username = Some(username);
        self.state.close_overlay();
        if self.state.items().is_empty() {
            self.show_cached_snapshot();
        }
        self.reload_all();
        self.state.set_status_message(Some("Logged in; loading titles…"));
    }

    fn fail_login(&mut self, err: ClientError) {
        tracing::warn!(?err, "authentication failed");
        let message = if err.is_unauthorized() {
            "Invalid username or password".to_string()
        } else {
            err.to_string()
        };
        if let Some(form) = self.state.login_mut() {
            form.submitting = false;
            form.password.clear();
            form.error = Some(message);
        }
    }

    fn report_client_error(&mut self, err: ClientError, what: &str) {
        if err.is_unauthorized() {
            tracing::warn!(what, "backend rejected session");
            if let Err(err) = self.session.clear() {
                tracing::error!(?err, "failed to clear rejected session");
            }
            self.forget_snapshot();
            self.state.open_login();
            self.state.username = None;
            self.state
                .set_status_message(Some("Session expired; please log in"));
            return;
        }
        tracing::error!(?err, what, "backend request failed");
        let suffix = if self.state.from_cache {
            " (showing cached list)"
        } else {
            ""
        };
        self.state
            .set_status_message(Some(format!("{what} failed: {err}{suffix}")));
    }

    fn show_cached_snapshot(&mut self) {
        let Some(cache) = &self.cache else {
            return;
        };
        match cache.snapshot_for(self.session.username().as_deref()) {
            Ok(Some((items, meta))) => {
                tracing::info!(count = items.len(), "showing cached snapshot");
                self.state.load_cached(items, Some(meta.fetched_at));
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(?err, "ignoring unreadable snapshot cache"),
        }
    }

    fn persist_snapshot(&self) {
        let Some(cache) = &self.cache else {
            return;
        };
        let owner = self.session.username();
        if let Err(err) = cache.save_snapshot(self.state.items(), owner.as_deref()) {
            tracing::error!(?err, "failed to cache snapshot");
        }
    }

    fn forget_snapshot(&mut self) {
        self.state.clear_snapshot();
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.clear_snapshot() {
                tracing::error!(?err, "failed to clear cached snapshot");
            }
        }
    }
}

fn is_plain(key: &KeyEvent) -> bool {
    !key
        .modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER)
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen).context("switching to alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("creating terminal backend")?;
    terminal.hide_cursor().context("hiding cursor")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor().ok();
    disable_raw_mode().context("disabling raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen).context("restoring screen state")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::{item, FakeBackend};
    use crate::config::CacheOptions;
    use crate::model::Bookmark;
    use crate::session::MemorySession;
    use crate::storage;
    use tempfile::TempDir;

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn type_text(app: &mut App, text: &str) {
        for ch in text.chars() {
            press(app, KeyCode::Char(ch));
        }
    }

    fn settle(app: &mut App) {
        while !app.state.pending.is_idle() {
            let response = app
                .dispatcher
                .recv_timeout(Duration::from_secs(5))
                .expect("backend response");
            app.handle_response(response);
        }
    }

    fn cache(dir: &TempDir) -> anyhow::Result<CacheHandle> {
        storage::init(&CacheOptions {
            database_path: dir.path().join("cache.sqlite3"),
            ..CacheOptions::default()
        })
    }

    fn backend() -> Arc<FakeBackend> {
        let mut backend = FakeBackend::with_items(vec![
            item("1", "Vagabond", "327", "2024-03-01"),
            item("2", "Berserk", "374", "2024-05-10"),
        ]);
        backend.bookmarks = vec![Bookmark {
            title: "MangaDex".into(),
            link: "https://mangadex.test".into(),
            status: "Good".into(),
        }];
        Arc::new(backend)
    }

    #[test]
    fn startup_loads_titles_and_flags_chapters_against_the_cache() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let cache = cache(&dir)?;
        let backend = backend();
        let config = Arc::new(AppConfig::default());

        let mut app = App::new(
            config.clone(),
            backend.clone(),
            Arc::new(MemorySession::new()),
            Some(cache.clone()),
        )?;
        settle(&mut app);
        assert_eq!(app.state.entries().len(), 2);
        assert_eq!(app.state.bookmarks.len(), 1);
        assert_eq!(app.state.new_chapter_count(), 0);
        assert_eq!(cache.load_snapshot()?.len(), 2);

        backend.set_chapter("2", "375");
        let mut app = App::new(
            config,
            backend,
            Arc::new(MemorySession::new()),
            Some(cache),
        )?;
        assert!(app.state.from_cache);
        settle(&mut app);
        let flagged: Vec<&str> = app
            .state
            .entries()
            .iter()
            .filter(|entry| entry.is_new)
            .map(|entry| entry.item.id.as_str())
            .collect();
        assert_eq!(flagged, vec!["2"]);
        Ok(())
    }

    #[test]
    fn editor_submission_replaces_the_snapshot() -> anyhow::Result<()> {
        let backend = backend();
        let mut app = App::new(
            Arc::new(AppConfig::default()),
            backend.clone(),
            Arc::new(MemorySession::new()),
            None,
        )?;
        settle(&mut app);

        press(&mut app, KeyCode::Char('e'));
        press(&mut app, KeyCode::Char('x'));
        press(&mut app, KeyCode::Char('a'));
        type_text(&mut app, "https://manga.test/blue-lock");
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Enter);
        settle(&mut app);

        assert!(app.state.overlay().is_none());
        let submitted = backend.submissions.lock();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].len(), 3);
        let titles: Vec<&str> = app
            .state
            .entries()
            .iter()
            .map(|entry| entry.item.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Berserk", "Blue Lock"]);
        assert!(app.state.items().iter().all(|item| !item.is_draft_only()));
        Ok(())
    }

    #[test]
    fn escape_discards_the_draft() -> anyhow::Result<()> {
        let backend = backend();
        let mut app = App::new(
            Arc::new(AppConfig::default()),
            backend.clone(),
            Arc::new(MemorySession::new()),
            None,
        )?;
        settle(&mut app);
        press(&mut app, KeyCode::Char('e'));
        press(&mut app, KeyCode::Char('x'));
        press(&mut app, KeyCode::Esc);
        assert!(app.state.overlay().is_none());
        assert_eq!(app.state.entries().len(), 2);
        assert!(backend.submissions.lock().is_empty());
        Ok(())
    }

    #[test]
    fn login_gate_blocks_loading_until_credentials_succeed() -> anyhow::Result<()> {
        let mut backend = FakeBackend::with_items(vec![item("1", "Kingdom", "800", "2024-01-01")]);
        backend.password = Some("hunter2".into());
        let session = Arc::new(MemorySession::new());
        let mut config = AppConfig::default();
        config.auth.require_login = true;

        let mut app = App::new(Arc::new(config), Arc::new(backend), session.clone(), None)?;
        assert!(matches!(app.state.overlay(), Some(Overlay::Login(_))));
        assert!(app.state.pending.is_idle());

        type_text(&mut app, "reader");
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "wrong");
        press(&mut app, KeyCode::Enter);
        settle(&mut app);
        match app.state.overlay() {
            Some(Overlay::Login(form)) => {
                assert_eq!(form.error.as_deref(), Some("Invalid username or password"));
                assert!(form.password.is_empty());
            }
            other => panic!("expected login form, got {other:?}"),
        }

        type_text(&mut app, "hunter2");
        press(&mut app, KeyCode::Enter);
        settle(&mut app);
        assert!(app.state.overlay().is_none());
        assert_eq!(session.token().as_deref(), Some("token-for-reader"));
        assert_eq!(app.state.entries().len(), 1);
        Ok(())
    }

    #[test]
    fn unauthorized_fetch_opens_the_login_form() -> anyhow::Result<()> {
        let mut backend = FakeBackend::with_items(Vec::new());
        backend.reject_fetch = true;
        let session = Arc::new(MemorySession::with_token("expired", "reader"));
        let mut app = App::new(
            Arc::new(AppConfig::default()),
            Arc::new(backend),
            session.clone(),
            None,
        )?;
        settle(&mut app);
        assert!(matches!(app.state.overlay(), Some(Overlay::Login(_))));
        assert!(session.token().is_none());
        Ok(())
    }

    #[test]
    fn login_gate_hides_cached_titles_until_their_owner_logs_in() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let cache = cache(&dir)?;
        cache.save_snapshot(&[item("7", "Secret Series", "12", "2024-01-01")], Some("reader"))?;
        let mut backend =
            FakeBackend::with_items(vec![item("7", "Secret Series", "13", "2024-02-01")]);
        backend.password = Some("hunter2".into());
        let mut config = AppConfig::default();
        config.auth.require_login = true;

        let mut app = App::new(
            Arc::new(config),
            Arc::new(backend),
            Arc::new(MemorySession::new()),
            Some(cache),
        )?;
        assert!(matches!(app.state.overlay(), Some(Overlay::Login(_))));
        assert!(app.state.entries().is_empty());
        assert!(!app.state.from_cache);

        type_text(&mut app, "reader");
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "hunter2");
        press(&mut app, KeyCode::Enter);
        settle(&mut app);
        assert_eq!(app.state.entries().len(), 1);
        assert_eq!(app.state.new_chapter_count(), 1);
        Ok(())
    }

    #[test]
    fn snapshot_cached_for_another_account_is_not_shown() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let cache = cache(&dir)?;
        cache.save_snapshot(&[item("7", "Secret Series", "12", "2024-01-01")], Some("alice"))?;

        let app = App::new(
            Arc::new(AppConfig::default()),
            Arc::new(FakeBackend::with_items(Vec::new())),
            Arc::new(MemorySession::with_token("token", "bob")),
            Some(cache),
        )?;
        assert!(app.state.entries().is_empty());
        assert!(!app.state.from_cache);
        Ok(())
    }

    #[test]
    fn rejected_session_clears_the_cached_snapshot() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let cache = cache(&dir)?;
        cache.save_snapshot(&[item("7", "Secret Series", "12", "2024-01-01")], Some("reader"))?;
        let mut backend = FakeBackend::with_items(Vec::new());
        backend.reject_fetch = true;

        let mut app = App::new(
            Arc::new(AppConfig::default()),
            Arc::new(backend),
            Arc::new(MemorySession::with_token("expired", "reader")),
            Some(cache.clone()),
        )?;
        assert_eq!(app.state.entries().len(), 1);
        settle(&mut app);
        assert!(app.state.entries().is_empty());
        assert!(cache.last_snapshot()?.is_none());
        assert!(cache.load_snapshot()?.is_empty());
        Ok(())
    }

    #[test]
    fn stale_responses_are_ignored() -> anyhow::Result<()> {
        let backend = backend();
        let mut app = App::new(
            Arc::new(AppConfig::default()),
            backend,
            Arc::new(MemorySession::new()),
            None,
        )?;
        settle(&mut app);
        app.handle_response(AsyncResponse {
            request_id: 9_999,
            response: Response::Items(Ok(Vec::new())),
        });
        assert_eq!(app.state.entries().len(), 2);
        Ok(())
    }

    #[test]
    fn search_keys_filter_until_escape() -> anyhow::Result<()> {
        let mut app = App::new(
            Arc::new(AppConfig::default()),
            backend(),
            Arc::new(MemorySession::new()),
            None,
        )?;
        settle(&mut app);
        press(&mut app, KeyCode::Char('/'));
        type_text(&mut app, "berS");
        assert_eq!(app.state.entries().len(), 1);
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Char('s'));
        assert_eq!(
            app.state.selection().alphabet,
            crate::view::AlphabetOrder::Alphabetical
        );
        press(&mut app, KeyCode::Char('/'));
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.state.entries().len(), 2);
        Ok(())
    }
}
