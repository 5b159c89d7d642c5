//! Cookie-like key/value storage with per-entry expiry.
//!
//! Both the session credential and the partner identifier live here, next to
//! entries without expiry (the cached Telegram photo). Expired entries read as
//! absent and are purged on access.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::Result;

pub trait CookieStore: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;

    /// `ttl = None` keeps the entry until it is removed.
    fn set(&self, name: &str, value: &str, ttl: Option<Duration>);

    fn remove(&self, name: &str);

    fn expires_at(&self, name: &str) -> Option<DateTime<Utc>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn new(value: &str, ttl: Option<Duration>) -> Self {
        Self {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Utc::now() + ttl),
        }
    }

    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

type Entries = HashMap<String, Entry>;

/// Returns the live value and whether an expired entry was dropped.
fn read_live(entries: &mut Entries, name: &str) -> (Option<String>, bool) {
    match entries.get(name) {
        Some(entry) if entry.is_live(Utc::now()) => (Some(entry.value.clone()), false),
        Some(_) => {
            entries.remove(name);
            (None, true)
        }
        None => (None, false),
    }
}

fn lock(entries: &Mutex<Entries>) -> MutexGuard<'_, Entries> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieStore for MemoryStore {
    fn get(&self, name: &str) -> Option<String> {
        read_live(&mut lock(&self.entries), name).0
    }

    fn set(&self, name: &str, value: &str, ttl: Option<Duration>) {
        lock(&self.entries).insert(name.to_string(), Entry::new(value, ttl));
    }

    fn remove(&self, name: &str) {
        lock(&self.entries).remove(name);
    }

    fn expires_at(&self, name: &str) -> Option<DateTime<Utc>> {
        lock(&self.entries).get(name).and_then(|e| e.expires_at)
    }
}

/// JSON document on disk, rewritten through a temp file on every mutation.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<Entries>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => Entries::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Entries::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("Opened credential store at {} ({} entries)", path.display(), entries.len());

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &Entries) {
        if let Err(e) = self.write(entries) {
            warn!("Failed to persist credential store {}: {}", self.path.display(), e);
        }
    }

    fn write(&self, entries: &Entries) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(entries).map_err(io::Error::other)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)
    }
}

impl CookieStore for FileStore {
    fn get(&self, name: &str) -> Option<String> {
        let mut entries = lock(&self.entries);
        let (value, purged) = read_live(&mut entries, name);
        if purged {
            self.persist(&entries);
        }
        value
    }

    fn set(&self, name: &str, value: &str, ttl: Option<Duration>) {
        let mut entries = lock(&self.entries);
        entries.insert(name.to_string(), Entry::new(value, ttl));
        self.persist(&entries);
    }

    fn remove(&self, name: &str) {
        let mut entries = lock(&self.entries);
        if entries.remove(name).is_some() {
            self.persist(&entries);
        }
    }

    fn expires_at(&self, name: &str) -> Option<DateTime<Utc>> {
        lock(&self.entries).get(name).and_then(|e| e.expires_at)
    }
}
