use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::state::dedupe_shortlist;
use super::state::Message;
use super::state::Session;

/// Session-scoped key holding `{messages, session}`.
pub const SESSION_STATE_KEY: &str = "concierge.widget.state";
/// Local-scoped key holding the intro-dismissed timestamp.
pub const INTRO_DISMISSED_KEY: &str = "concierge.intro.dismissedAt";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HydrateError {
    #[error("stored state is not valid json: {0}")]
    Parse(String),
    #[error("stored state is missing `{0}`")]
    MissingField(&'static str),
    #[error("stored state has an unexpected shape: {0}")]
    Shape(String),
}

/// A string key/value area with web-storage semantics.
pub trait StorageArea: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// In-process storage. Clones share the same backing map, which lets a test
/// reopen a store against the "same tab".
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageArea for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.remove(key);
        Ok(())
    }
}

/// One file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn open(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        if !valid || key.starts_with('.') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl StorageArea for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        write_private(&path, value)?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut opts = OpenOptions::new();
    opts.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts.open(path)?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedWidget {
    pub messages: Vec<Message>,
    pub session: Session,
}

pub fn encode_snapshot(messages: &[Message], session: &Session) -> Result<String, StorageError> {
    #[derive(Serialize)]
    struct Borrowed<'a> {
        messages: &'a [Message],
        session: &'a Session,
    }
    Ok(serde_json::to_string(&Borrowed { messages, session })?)
}

/// Restores a stored snapshot on top of `base`. Session fields absent from
/// the stored shape keep the value they have in `base`.
pub fn hydrate_snapshot(raw: &str, base: &Session) -> Result<PersistedWidget, HydrateError> {
    let stored: Value =
        serde_json::from_str(raw).map_err(|err| HydrateError::Parse(err.to_string()))?;
    let messages = stored
        .get("messages")
        .filter(|value| !value.is_null())
        .ok_or(HydrateError::MissingField("messages"))?;
    let stored_session = stored
        .get("session")
        .and_then(Value::as_object)
        .ok_or(HydrateError::MissingField("session"))?;

    let mut merged = serde_json::to_value(base).map_err(|err| HydrateError::Shape(err.to_string()))?;
    if let Value::Object(fields) = &mut merged {
        for (key, value) in stored_session {
            fields.insert(key.clone(), value.clone());
        }
    }

    let mut session: Session =
        serde_json::from_value(merged).map_err(|err| HydrateError::Shape(err.to_string()))?;
    session.shortlist = dedupe_shortlist(std::mem::take(&mut session.shortlist));
    let messages: Vec<Message> = serde_json::from_value(messages.clone())
        .map_err(|err| HydrateError::Shape(err.to_string()))?;
    Ok(PersistedWidget { messages, session })
}

pub fn read_intro_dismissed(local: &dyn StorageArea) -> Option<i64> {
    match local.get_item(INTRO_DISMISSED_KEY) {
        Ok(Some(raw)) => raw.trim().parse::<i64>().ok(),
        Ok(None) => None,
        Err(err) => {
            tracing::warn!(error = %err, "failed to read intro dismissal flag");
            None
        }
    }
}
