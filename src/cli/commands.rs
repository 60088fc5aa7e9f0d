use std::fmt::Write as _;
use std::io::{self, BufRead};

use anyhow::{bail, Context, Result};
use clap::Args;
use unicode_width::UnicodeWidthStr;

use crate::app::App;
use crate::client::{Backend, ClientError, Credentials, Registration};
use crate::config::AppConfig;
use crate::draft::EditDraft;
use crate::model::TrackedItem;
use crate::session::SessionProvider;
use crate::storage::CacheHandle;
use crate::view::{
    build_entries, detect_new_chapters, AlphabetOrder, DateOrder, ListEntry, NewChapters,
    SortSelection,
};

const TITLE_COLUMN: usize = 40;

/// The snapshot cache together with the account its rows belong to.
#[derive(Clone, Copy)]
struct SnapshotSlot<'a> {
    cache: &'a CacheHandle,
    owner: Option<&'a str>,
}

fn snapshot_slot<'a>(
    cache: Option<&'a CacheHandle>,
    owner: Option<&'a str>,
) -> Option<SnapshotSlot<'a>> {
    cache.map(|cache| SnapshotSlot { cache, owner })
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Only show titles containing this text (case-insensitive)
    #[arg(long)]
    pub search: Option<String>,
    /// Title order: none, alphabetical, reverse-alphabetical
    #[arg(long)]
    pub alpha: Option<AlphabetOrder>,
    /// Date order: none, newest-date, oldest-date
    #[arg(long)]
    pub date: Option<DateOrder>,
    /// Only print titles with a chapter newer than the cached snapshot
    #[arg(long)]
    pub new_only: bool,
    /// Render the cached snapshot without contacting the backend
    #[arg(long)]
    pub offline: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Series page links to start tracking
    #[arg(required = true)]
    pub links: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RemoveArgs {
    /// Ids of tracked titles to drop (see `mangatrack list`)
    #[arg(required = true)]
    pub ids: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct LoginArgs {
    /// Account name (prompted if omitted)
    #[arg(long)]
    pub username: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RegisterArgs {
    /// Account name (prompted if omitted)
    #[arg(long)]
    pub username: Option<String>,
    /// Contact address (prompted if omitted)
    #[arg(long)]
    pub email: Option<String>,
}

pub fn run_tui(app: &mut App) -> Result<()> {
    app.run()
}

pub fn list_titles(
    config: &AppConfig,
    backend: &dyn Backend,
    session: &dyn SessionProvider,
    cache: Option<&CacheHandle>,
    args: ListArgs,
) -> Result<()> {
    let owner = session.username();
    let output = run_list(config, backend, snapshot_slot(cache, owner.as_deref()), &args)?;
    print!("{output}");
    Ok(())
}

pub fn add_links(
    backend: &dyn Backend,
    session: &dyn SessionProvider,
    cache: Option<&CacheHandle>,
    args: AddArgs,
) -> Result<()> {
    let owner = session.username();
    let slot = snapshot_slot(cache, owner.as_deref());
    println!("{}", run_add(backend, slot, &args.links)?);
    Ok(())
}

pub fn remove_titles(
    backend: &dyn Backend,
    session: &dyn SessionProvider,
    cache: Option<&CacheHandle>,
    args: RemoveArgs,
) -> Result<()> {
    let owner = session.username();
    let slot = snapshot_slot(cache, owner.as_deref());
    println!("{}", run_remove(backend, slot, &args.ids)?);
    Ok(())
}

pub fn refresh_backend(backend: &dyn Backend) -> Result<()> {
    let message = backend.refresh().context("asking backend to refresh")?;
    println!("{message}");
    Ok(())
}

pub fn list_sites(backend: &dyn Backend) -> Result<()> {
    print!("{}", run_sites(backend)?);
    Ok(())
}

pub fn list_bookmarks(backend: &dyn Backend) -> Result<()> {
    print!("{}", run_bookmarks(backend)?);
    Ok(())
}

pub fn login(backend: &dyn Backend, session: &dyn SessionProvider, args: LoginArgs) -> Result<()> {
    let username = match args.username {
        Some(name) => name,
        None => prompt("Username")?,
    };
    let password = read_secret("Password")?;
    let credentials = Credentials {
        username: username.trim().to_string(),
        password,
    };
    println!("{}", run_login(backend, session, &credentials)?);
    Ok(())
}

pub fn register(backend: &dyn Backend, args: RegisterArgs) -> Result<()> {
    let username = match args.username {
        Some(name) => name,
        None => prompt("Username")?,
    };
    let email = match args.email {
        Some(email) => email,
        None => prompt("Email")?,
    };
    let password = read_secret("Password")?;
    let registration = Registration {
        username: username.trim().to_string(),
        password,
        email: email.trim().to_string(),
    };
    println!("{}", run_register(backend, &registration)?);
    Ok(())
}

pub fn logout(session: &dyn SessionProvider, cache: Option<&CacheHandle>) -> Result<()> {
    let who = session.username();
    session.clear().context("clearing stored session")?;
    if let Some(cache) = cache {
        cache.clear_snapshot().context("clearing cached snapshot")?;
    }
    match who {
        Some(name) => println!("Logged out {name}"),
        None => println!("No stored session"),
    }
    Ok(())
}

fn run_list(
    config: &AppConfig,
    backend: &dyn Backend,
    slot: Option<SnapshotSlot<'_>>,
    args: &ListArgs,
) -> Result<String> {
    let (items, new_chapters) = if args.offline {
        let Some(slot) = slot else {
            bail!("--offline needs the snapshot cache; enable [cache] in the config");
        };
        let items = slot
            .cache
            .snapshot_for(slot.owner)
            .context("reading cached snapshot")?
            .map(|(items, _)| items)
            .unwrap_or_default();
        (items, NewChapters::default())
    } else {
        let items = backend
            .fetch_items()
            .map_err(auth_hint)
            .context("fetching tracked titles")?;
        let previous = match slot.map(|slot| slot.cache.snapshot_for(slot.owner)).transpose() {
            Ok(previous) => previous.flatten().map(|(items, _)| items).unwrap_or_default(),
            Err(err) => {
                tracing::warn!(?err, "ignoring unreadable snapshot cache");
                Vec::new()
            }
        };
        let new_chapters = detect_new_chapters(&previous, &items);
        if let Some(slot) = slot {
            if let Err(err) = slot.cache.save_snapshot(&items, slot.owner) {
                tracing::error!(?err, "failed to cache snapshot");
            }
        }
        (items, new_chapters)
    };

    let selection = SortSelection {
        search_term: args.search.clone().unwrap_or_default(),
        alphabet: args.alpha.unwrap_or(config.default_sort.alphabet),
        date: args.date.unwrap_or(config.default_sort.date),
    };
    let mut entries = build_entries(&items, &selection, &new_chapters);
    if args.new_only {
        entries.retain(|entry| entry.is_new);
    }
    Ok(format_entries(&entries, new_chapters.len()))
}

fn format_entries(entries: &[ListEntry], flagged: usize) -> String {
    let mut out = String::new();
    if entries.is_empty() {
        out.push_str("No matching titles.\n");
        return out;
    }
    let id_width = entries
        .iter()
        .map(|entry| entry.item.id.width())
        .max()
        .unwrap_or(2)
        .max(2);
    for entry in entries {
        let item = &entry.item;
        let title = clip(&item.title, TITLE_COLUMN);
        let _ = writeln!(
            out,
            "{id}{id_pad}  {title}{title_pad}  {chapter:<12} {updated:<25} {status}{badge}",
            id = item.id,
            id_pad = " ".repeat(id_width.saturating_sub(item.id.width())),
            title_pad = " ".repeat(TITLE_COLUMN.saturating_sub(title.width())),
            chapter = chapter_label(item),
            updated = if item.last_updated.is_empty() { "-" } else { item.last_updated.as_str() },
            status = item.status,
            badge = if entry.is_new { "  [NEW]" } else { "" },
        );
    }
    let _ = writeln!(
        out,
        "{} title(s), {flagged} with new chapters",
        entries.len()
    );
    out
}

fn chapter_label(item: &TrackedItem) -> String {
    let chapter = item.chapter_number.trim();
    if chapter.is_empty() {
        "Ch. ?".to_string()
    } else {
        format!("Ch. {chapter}")
    }
}

fn clip(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let mut out = String::new();
    for ch in text.chars() {
        if out.width() + ch.to_string().width() + 1 > width {
            break;
        }
        out.push(ch);
    }
    out.push('…');
    out
}

fn run_add(
    backend: &dyn Backend,
    slot: Option<SnapshotSlot<'_>>,
    links: &[String],
) -> Result<String> {
    let items = backend
        .fetch_items()
        .map_err(auth_hint)
        .context("fetching tracked titles")?;
    let mut draft = EditDraft::from_snapshot(&items);
    for link in links {
        draft
            .add_link(link)
            .with_context(|| format!("adding {link}"))?;
    }
    let added = draft.pending_additions().len();
    let confirmed = submit_draft(backend, slot, &draft)?;
    Ok(format!(
        "Added {added} link(s); now tracking {} title(s)",
        confirmed.len()
    ))
}

fn run_remove(
    backend: &dyn Backend,
    slot: Option<SnapshotSlot<'_>>,
    ids: &[String],
) -> Result<String> {
    let items = backend
        .fetch_items()
        .map_err(auth_hint)
        .context("fetching tracked titles")?;
    let mut draft = EditDraft::from_snapshot(&items);
    for id in ids {
        let already_deleted = draft.get(id).is_some_and(TrackedItem::is_deleted);
        if already_deleted || !draft.toggle_delete(id) {
            bail!("no tracked title with id {id}");
        }
    }
    let removed = draft.pending_deletions().len();
    let confirmed = submit_draft(backend, slot, &draft)?;
    Ok(format!(
        "Removed {removed} title(s); now tracking {} title(s)",
        confirmed.len()
    ))
}

fn submit_draft(
    backend: &dyn Backend,
    slot: Option<SnapshotSlot<'_>>,
    draft: &EditDraft,
) -> Result<Vec<TrackedItem>> {
    let confirmed = backend
        .submit(&draft.records())
        .map_err(auth_hint)
        .context("submitting list changes")?;
    if let Some(slot) = slot {
        slot.cache
            .save_snapshot(&confirmed, slot.owner)
            .context("caching confirmed list")?;
    }
    Ok(confirmed)
}

fn run_sites(backend: &dyn Backend) -> Result<String> {
    let sites = backend
        .fetch_supported_websites()
        .map_err(auth_hint)
        .context("fetching supported websites")?;
    let mut out = String::new();
    for site in &sites {
        let _ = writeln!(
            out,
            "{:<6} {}{}  {}  (checked {})",
            site.status,
            clip(&site.title, 30),
            " ".repeat(30usize.saturating_sub(clip(&site.title, 30).width())),
            site.link,
            if site.last_checked.is_empty() { "never" } else { site.last_checked.as_str() },
        );
    }
    if sites.is_empty() {
        out.push_str("Backend reported no supported websites.\n");
    }
    Ok(out)
}

fn run_bookmarks(backend: &dyn Backend) -> Result<String> {
    let bookmarks = backend
        .fetch_bookmarks()
        .map_err(auth_hint)
        .context("fetching bookmarks")?;
    let mut out = String::new();
    for bookmark in &bookmarks {
        let _ = writeln!(out, "{:<6} {}  {}", bookmark.status, bookmark.title, bookmark.link);
    }
    if bookmarks.is_empty() {
        out.push_str("No bookmarks.\n");
    }
    Ok(out)
}

fn run_login(
    backend: &dyn Backend,
    session: &dyn SessionProvider,
    credentials: &Credentials,
) -> Result<String> {
    if credentials.username.is_empty() || credentials.password.is_empty() {
        bail!("username and password are required");
    }
    let token = match backend.login(credentials) {
        Ok(token) => token,
        Err(ClientError::Unauthorized) => bail!("invalid username or password"),
        Err(err) => return Err(err).context("logging in"),
    };
    session
        .store(&token, &credentials.username)
        .context("saving session")?;
    tracing::info!(username = %credentials.username, "logged in");
    Ok(format!("Logged in as {}", credentials.username))
}

fn run_register(backend: &dyn Backend, registration: &Registration) -> Result<String> {
    if registration.username.is_empty() || registration.password.is_empty() {
        bail!("username and password are required");
    }
    if !registration.email.contains('@') {
        bail!("'{}' is not an email address", registration.email);
    }
    let message = backend
        .register(registration)
        .context("registering account")?;
    Ok(message)
}

fn auth_hint(err: ClientError) -> anyhow::Error {
    if err.is_unauthorized() {
        anyhow::Error::new(err).context("run `mangatrack login` first")
    } else {
        anyhow::Error::new(err)
    }
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write;
    let mut stdout = io::stdout();
    write!(stdout, "{}: ", label)?;
    stdout.flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim_end().to_owned())
}

/// Reads a secret from piped stdin, or prompts when attached to a terminal.
fn read_secret(label: &str) -> Result<String> {
    if atty::is(atty::Stream::Stdin) {
        return prompt(label);
    }
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}
