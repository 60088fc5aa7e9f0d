use std::env;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::client::{Backend, HttpBackend};
use crate::config::{ConfigLoader, BACKEND_URL_ENV, CONFIG_ENV, DATA_ENV};
use crate::session::{FileSession, MemorySession, SessionProvider};
use crate::storage::{self, CacheHandle};

pub mod commands;

use self::commands::{AddArgs, ListArgs, LoginArgs, RegisterArgs, RemoveArgs};

const LOG_FILE: &str = "mangatrack.log";

#[derive(Parser, Debug)]
#[command(
    name = "mangatrack",
    version,
    about = "Terminal dashboard for manga chapter releases"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over MANGATRACK_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over MANGATRACK_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Scraper backend base URL (takes precedence over MANGATRACK_BACKEND_URL)
    #[arg(long)]
    pub backend_url: Option<String>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the interactive dashboard (default)
    Tui,
    /// Print the tracked titles, flagging new chapters
    List(ListArgs),
    /// Start tracking one or more series links
    Add(AddArgs),
    /// Stop tracking titles by id
    Remove(RemoveArgs),
    /// Ask the backend to re-check every tracked site
    Refresh,
    /// List the websites the backend can scrape
    Sites,
    /// List bookmarks stored on the backend
    Bookmarks,
    /// Log in and remember the session
    Login(LoginArgs),
    /// Create a backend account
    Register(RegisterArgs),
    /// Forget the stored session
    Logout,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(DATA_ENV, path);
    }
    if let Some(url) = &cli.backend_url {
        env::set_var(BACKEND_URL_ENV, url);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    let command = cli.command.unwrap_or(Commands::Tui);
    let log_file = matches!(command, Commands::Tui).then(|| paths.log_dir.join(LOG_FILE));
    init_tracing(&cli.log_level, log_file.as_deref())
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = Arc::new(loader.load_or_init()?);
    tracing::debug!(backend = %config.backend.base_url, "configuration loaded");

    let session: Arc<dyn SessionProvider> = if config.auth.remember_session {
        Arc::new(FileSession::open(&paths.state_dir)?)
    } else {
        Arc::new(MemorySession::new())
    };
    let backend: Arc<dyn Backend> = Arc::new(
        HttpBackend::new(&config.backend, Arc::clone(&session))
            .context("building backend client")?,
    );
    let cache = open_cache(&config.cache);

    match command {
        Commands::Tui => {
            let mut app = App::new(config.clone(), backend, session, cache)?;
            commands::run_tui(&mut app)
        }
        Commands::List(args) => {
            commands::list_titles(&config, backend.as_ref(), session.as_ref(), cache.as_ref(), args)
        }
        Commands::Add(args) => {
            commands::add_links(backend.as_ref(), session.as_ref(), cache.as_ref(), args)
        }
        Commands::Remove(args) => {
            commands::remove_titles(backend.as_ref(), session.as_ref(), cache.as_ref(), args)
        }
        Commands::Refresh => commands::refresh_backend(backend.as_ref()),
        Commands::Sites => commands::list_sites(backend.as_ref()),
        Commands::Bookmarks => commands::list_bookmarks(backend.as_ref()),
        Commands::Login(args) => commands::login(backend.as_ref(), session.as_ref(), args),
        Commands::Register(args) => commands::register(backend.as_ref(), args),
        Commands::Logout => commands::logout(session.as_ref(), cache.as_ref()),
    }
}

fn open_cache(options: &crate::config::CacheOptions) -> Option<CacheHandle> {
    if !options.enabled {
        return None;
    }
    match storage::init(options) {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!(?err, "snapshot cache unavailable; continuing without it");
            None
        }
    }
}

fn init_tracing(level: &str, log_file: Option<&Path>) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        let builder = fmt().with_env_filter(env_filter);
        match log_file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("opening log file {}", path.display()))?;
                builder.with_ansi(false).with_writer(Mutex::new(file)).init();
            }
            None => builder.with_writer(std::io::stderr).init(),
        }
        Ok(())
    })
    .map(|_| ())
}
