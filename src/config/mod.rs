use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::view::{AlphabetOrder, DateOrder, SortSelection};

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "MangaTrack";
const APP_NAME: &str = "mangatrack";

pub const CONFIG_ENV: &str = "MANGATRACK_CONFIG";
pub const DATA_ENV: &str = "MANGATRACK_DATA";
pub const BACKEND_URL_ENV: &str = "MANGATRACK_BACKEND_URL";

const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            self.write_default_config(&default_cfg)?;
            default_cfg.post_load(&self.paths)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load(&self.paths)?;
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let body = toml::to_string_pretty(cfg).context("serializing default config")?;
        let path = &self.paths.config_file;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file =
            fs::File::create(path).with_context(|| format!("creating config {}", path.display()))?;
        writeln!(file, "# mangatrack configuration; delete to regenerate defaults")
            .and_then(|_| file.write_all(body.as_bytes()))
            .with_context(|| format!("writing default config {}", path.display()))?;
        tracing::info!(path = %path.display(), "wrote default configuration");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub cache_path: PathBuf,
    pub log_dir: PathBuf,
    pub state_dir: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let override_data = env::var(DATA_ENV).ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_root = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
        let state_dir = project_dirs
            .state_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| data_root.join("state"));

        Ok(Self::rooted(config_dir, config_file, data_root, state_dir))
    }

    /// Lays every path out under explicit roots.
    pub fn rooted(
        config_dir: PathBuf,
        config_file: PathBuf,
        data_dir: PathBuf,
        state_dir: PathBuf,
    ) -> Self {
        Self {
            cache_path: data_dir.join("cache.db"),
            log_dir: state_dir.join("logs"),
            config_dir,
            config_file,
            data_dir,
            state_dir,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.config_dir,
            &self.data_dir,
            &self.log_dir,
            &self.state_dir,
        ] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendOptions,
    pub default_sort: SortDefaults,
    pub auth: AuthOptions,
    pub cache: CacheOptions,
    pub ui: UiOptions,
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) -> Result<()> {
        self.cache.resolve(paths);
        if let Ok(url) = env::var(BACKEND_URL_ENV) {
            if !url.trim().is_empty() {
                self.backend.base_url = url;
            }
        }
        self.backend.normalize();
        Ok(())
    }

    pub fn initial_selection(&self) -> SortSelection {
        SortSelection::new(self.default_sort.alphabet, self.default_sort.date)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendOptions {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            timeout_secs: 15,
            user_agent: format!("mangatrack/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl BackendOptions {
    pub fn normalize(&mut self) {
        let trimmed = self.base_url.trim().trim_end_matches('/').to_string();
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            tracing::warn!(base_url = %self.base_url, "backend url must be http(s), falling back to default");
            self.base_url = DEFAULT_BACKEND_URL.to_string();
        } else {
            self.base_url = trimmed;
        }
        if self.user_agent.trim().is_empty() {
            self.user_agent = BackendOptions::default().user_agent;
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SortDefaults {
    pub alphabet: AlphabetOrder,
    pub date: DateOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthOptions {
    /// Show the login form before the dashboard when no session exists.
    pub require_login: bool,
    /// Persist the access token in the state directory.
    pub remember_session: bool,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            require_login: false,
            remember_session: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    pub enabled: bool,
    #[serde(skip)]
    pub database_path: PathBuf,
    pub wal_autocheckpoint: u32,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            database_path: PathBuf::new(),
            wal_autocheckpoint: 1000,
        }
    }
}

impl CacheOptions {
    fn resolve(&mut self, paths: &ConfigPaths) {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.cache_path.clone();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiOptions {
    pub show_bookmarks: bool,
    pub tick_ms: u64,
}

impl Default for UiOptions {
    fn default() -> Self {
        Self {
            show_bookmarks: true,
            tick_ms: 250,
        }
    }
}

impl UiOptions {
    pub fn tick_rate(&self) -> Duration {
        Duration::from_millis(self.tick_ms.clamp(50, 2000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_paths(root: &TempDir) -> ConfigPaths {
        let base = root.path();
        ConfigPaths::rooted(
            base.join("config"),
            base.join("config/config.toml"),
            base.join("data"),
            base.join("state"),
        )
    }

    #[test]
    fn first_run_writes_defaults() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let loader = ConfigLoader::with_paths(temp_paths(&temp));
        let cfg = loader.load_or_init()?;

        assert!(loader.paths().config_file.exists());
        assert_eq!(cfg.cache.database_path, loader.paths().cache_path);
        assert!(cfg.auth.remember_session);
        assert_eq!(cfg.default_sort.alphabet, AlphabetOrder::None);

        let written = fs::read_to_string(&loader.paths().config_file)?;
        assert!(written.contains("[backend]"));
        assert!(!written.contains("database_path"));
        Ok(())
    }

    #[test]
    fn partial_config_keeps_defaults_for_missing_keys() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let loader = ConfigLoader::with_paths(temp_paths(&temp));
        loader.paths().ensure_directories()?;
        fs::write(
            &loader.paths().config_file,
            r#"
[backend]
base_url = "https://tracker.example.test/"

[default_sort]
alphabet = "reverse-alphabetical"
date = "newest-date"

[auth]
require_login = true
"#,
        )?;
        let cfg = loader.load()?;
        assert_eq!(cfg.backend.base_url, "https://tracker.example.test");
        assert_eq!(cfg.backend.timeout_secs, 15);
        assert!(cfg.auth.require_login);
        assert!(cfg.auth.remember_session);
        let selection = cfg.initial_selection();
        assert_eq!(selection.alphabet, AlphabetOrder::ReverseAlphabetical);
        assert_eq!(selection.date, DateOrder::NewestDate);
        Ok(())
    }

    #[test]
    fn non_http_backend_url_falls_back_to_default() {
        let mut options = BackendOptions {
            base_url: "localhost:8000".into(),
            ..BackendOptions::default()
        };
        options.normalize();
        assert_eq!(options.base_url, DEFAULT_BACKEND_URL);
    }
}
