use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const SESSION_FILE: &str = "session.json";
const SESSION_TMP_EXTENSION: &str = "json.tmp";

/// Source of the access token attached to backend requests.
pub trait SessionProvider: Send + Sync {
    fn token(&self) -> Option<String>;
    fn username(&self) -> Option<String>;
    fn store(&self, token: &str, username: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;

    fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct SessionRecord {
    token: String,
    username: String,
    saved_at: i64,
}

#[derive(Debug, Default)]
pub struct MemorySession {
    record: RwLock<Option<SessionRecord>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str, username: &str) -> Self {
        Self {
            record: RwLock::new(Some(SessionRecord {
                token: token.to_string(),
                username: username.to_string(),
                saved_at: OffsetDateTime::now_utc().unix_timestamp(),
            })),
        }
    }
}

impl SessionProvider for MemorySession {
    fn token(&self) -> Option<String> {
        self.record.read().as_ref().map(|record| record.token.clone())
    }

    fn username(&self) -> Option<String> {
        self.record
            .read()
            .as_ref()
            .map(|record| record.username.clone())
    }

    fn store(&self, token: &str, username: &str) -> Result<()> {
        *self.record.write() = Some(SessionRecord {
            token: token.to_string(),
            username: username.to_string(),
            saved_at: OffsetDateTime::now_utc().unix_timestamp(),
        });
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.record.write() = None;
        Ok(())
    }
}

/// Keeps the session in `<state_dir>/session.json` so it survives restarts.
#[derive(Debug)]
pub struct FileSession {
    path: PathBuf,
    cached: RwLock<Option<SessionRecord>>,
}

impl FileSession {
    pub fn open(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(SESSION_FILE);
        let cached = match read_record(&path) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(?err, path = %path.display(), "ignoring unreadable session file");
                None
            }
        };
        Ok(Self {
            path,
            cached: RwLock::new(cached),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionProvider for FileSession {
    fn token(&self) -> Option<String> {
        self.cached.read().as_ref().map(|record| record.token.clone())
    }

    fn username(&self) -> Option<String> {
        self.cached
            .read()
            .as_ref()
            .map(|record| record.username.clone())
    }

    fn store(&self, token: &str, username: &str) -> Result<()> {
        let record = SessionRecord {
            token: token.to_string(),
            username: username.to_string(),
            saved_at: OffsetDateTime::now_utc().unix_timestamp(),
        };
        write_record(&self.path, &record)?;
        *self.cached.write() = Some(record);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("removing session file {}", self.path.display()))
            }
        }
        *self.cached.write() = None;
        Ok(())
    }
}

fn read_record(path: &Path) -> Result<Option<SessionRecord>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw =
        fs::read(path).with_context(|| format!("reading session file {}", path.display()))?;
    let record: SessionRecord = serde_json::from_slice(&raw)
        .with_context(|| format!("parsing session file {}", path.display()))?;
    if record.token.is_empty() {
        return Ok(None);
    }
    Ok(Some(record))
}

fn write_record(path: &Path, record: &SessionRecord) -> Result<()> {
    let json = serde_json::to_vec_pretty(record).context("serialising session")?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("ensuring session dir {}", parent.display()))?;
    }
    let tmp_path = path.with_extension(SESSION_TMP_EXTENSION);
    fs::write(&tmp_path, &json)
        .with_context(|| format!("writing temporary session file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("atomically persisting session {}", path.display()))?;
    Ok(())
}
