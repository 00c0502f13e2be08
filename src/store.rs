//! Key-value persistence for reading progress and unlocked chapters.
//!
//! [`KeyValueStore`] is the raw string store (the browser-storage shaped
//! seam). [`ProgressStore`] layers the chapter progress and unlock records on
//! top of it. All access to persisted progress goes through the adapter.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ViewerConfig;
use crate::version::{DEFAULT_PROGRESS_NAMESPACE, DEFAULT_UNLOCK_KEY};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store encoding error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("write to '{key}' rejected")]
    WriteFailed { key: String },
}

/// A key changed by another session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

pub type ChangeListener = Box<dyn FnMut(&StoreChange)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// String-keyed persistence with change notification.
///
/// Listeners hear about writes made by *other* sessions only, mirroring how
/// browser storage events behave.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> StoreResult<()>;
    fn remove(&mut self, key: &str) -> StoreResult<()>;
    fn subscribe(&mut self, listener: ChangeListener) -> SubscriptionId;
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;
}

struct Listener {
    id: SubscriptionId,
    session: u64,
    callback: Rc<RefCell<ChangeListener>>,
}

#[derive(Default)]
struct SharedEntries {
    entries: BTreeMap<String, String>,
    listeners: Vec<Listener>,
    next_session: u64,
    next_subscription: u64,
    read_only: bool,
}

/// In-process store. Every [`MemoryStore::session`] handle shares the same
/// entries, like tabs sharing one origin's storage.
pub struct MemoryStore {
    shared: Rc<RefCell<SharedEntries>>,
    session: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        let shared = Rc::new(RefCell::new(SharedEntries {
            next_session: 1,
            ..SharedEntries::default()
        }));
        Self { shared, session: 0 }
    }

    /// Opens another handle onto the same entries.
    pub fn session(&self) -> Self {
        let session = {
            let mut shared = self.shared.borrow_mut();
            let session = shared.next_session;
            shared.next_session += 1;
            session
        };
        Self {
            shared: Rc::clone(&self.shared),
            session,
        }
    }

    /// Makes every write fail, as a full or disabled storage backend would.
    pub fn set_read_only(&self, read_only: bool) {
        self.shared.borrow_mut().read_only = read_only;
    }

    pub fn len(&self) -> usize {
        self.shared.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.borrow().entries.is_empty()
    }

    fn write(&mut self, key: &str, value: Option<&str>) -> StoreResult<()> {
        let change = {
            let mut shared = self.shared.borrow_mut();
            if shared.read_only {
                return Err(StoreError::WriteFailed {
                    key: key.to_string(),
                });
            }
            let old_value = match value {
                Some(value) => shared.entries.insert(key.to_string(), value.to_string()),
                None => shared.entries.remove(key),
            };
            if old_value.as_deref() == value {
                return Ok(());
            }
            StoreChange {
                key: key.to_string(),
                old_value,
                new_value: value.map(str::to_string),
            }
        };
        self.notify_others(&change);
        Ok(())
    }

    /// Runs the listeners of every other session. No store borrow is held
    /// during a callback, so listeners may read, write and unsubscribe. A
    /// listener already running is skipped by nested writes.
    fn notify_others(&self, change: &StoreChange) {
        let targets: Vec<(SubscriptionId, Rc<RefCell<ChangeListener>>)> = self
            .shared
            .borrow()
            .listeners
            .iter()
            .filter(|listener| listener.session != self.session)
            .map(|listener| (listener.id, Rc::clone(&listener.callback)))
            .collect();
        for (id, callback) in targets {
            let subscribed = self
                .shared
                .borrow()
                .listeners
                .iter()
                .any(|listener| listener.id == id);
            if !subscribed {
                continue;
            }
            match callback.try_borrow_mut() {
                Ok(mut callback) => (*callback)(change),
                Err(_) => {
                    debug!(key = %change.key, "listener busy, skipping nested notification")
                }
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.shared.borrow();
        f.debug_struct("MemoryStore")
            .field("session", &self.session)
            .field("entries", &shared.entries)
            .field("listeners", &shared.listeners.len())
            .finish()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.shared.borrow().entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> StoreResult<()> {
        self.write(key, Some(value))
    }

    fn remove(&mut self, key: &str) -> StoreResult<()> {
        self.write(key, None)
    }

    fn subscribe(&mut self, listener: ChangeListener) -> SubscriptionId {
        let mut shared = self.shared.borrow_mut();
        let id = SubscriptionId(shared.next_subscription);
        shared.next_subscription += 1;
        shared.listeners.push(Listener {
            id,
            session: self.session,
            callback: Rc::new(RefCell::new(listener)),
        });
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let mut shared = self.shared.borrow_mut();
        let before = shared.listeners.len();
        shared.listeners.retain(|listener| listener.id != id);
        shared.listeners.len() != before
    }
}

/// JSON object on disk. Writes are atomic; [`FileStore::reload`] picks up
/// changes made by other processes and notifies listeners.
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
    listeners: Vec<(SubscriptionId, ChangeListener)>,
    next_subscription: u64,
}

impl FileStore {
    /// Opens the store, starting empty when the file is missing or corrupt.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let entries = read_entries(&path)?;
        Ok(Self {
            path,
            entries,
            listeners: Vec::new(),
            next_subscription: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-reads the file and reports every key that differs from memory.
    pub fn reload(&mut self) -> StoreResult<Vec<StoreChange>> {
        let fresh = read_entries(&self.path)?;
        let changes = diff_entries(&self.entries, &fresh);
        self.entries = fresh;
        for change in &changes {
            for (_, listener) in self.listeners.iter_mut() {
                listener(change);
            }
        }
        Ok(changes)
    }

    /// Applies one key change on top of the file's current contents, so keys
    /// written by other processes since the last read survive.
    fn write(&mut self, key: &str, value: Option<&str>) -> StoreResult<()> {
        let external = self.reload()?;
        if !external.is_empty() {
            debug!(
                path = %self.path.display(),
                changed = external.len(),
                "merged external progress"
            );
        }
        if self.entries.get(key).map(String::as_str) == value {
            return Ok(());
        }
        let mut entries = self.entries.clone();
        match value {
            Some(value) => entries.insert(key.to_string(), value.to_string()),
            None => entries.remove(key),
        };
        self.commit(entries)
    }

    fn commit(&mut self, entries: BTreeMap<String, String>) -> StoreResult<()> {
        let payload = serde_json::to_vec_pretty(&entries)?;
        atomic_write(&self.path, &payload)?;
        self.entries = entries;
        Ok(())
    }
}

impl fmt::Debug for FileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("entries", &self.entries)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> StoreResult<()> {
        self.write(key, Some(value))
    }

    fn remove(&mut self, key: &str) -> StoreResult<()> {
        self.write(key, None)
    }

    fn subscribe(&mut self, listener: ChangeListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, listener));
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }
}

fn diff_entries(
    old: &BTreeMap<String, String>,
    new: &BTreeMap<String, String>,
) -> Vec<StoreChange> {
    let mut changes = Vec::new();
    for (key, value) in new {
        let previous = old.get(key);
        if previous != Some(value) {
            changes.push(StoreChange {
                key: key.clone(),
                old_value: previous.cloned(),
                new_value: Some(value.clone()),
            });
        }
    }
    for (key, value) in old {
        if !new.contains_key(key) {
            changes.push(StoreChange {
                key: key.clone(),
                old_value: Some(value.clone()),
                new_value: None,
            });
        }
    }
    changes
}

fn read_entries(path: &Path) -> StoreResult<BTreeMap<String, String>> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(err) => return Err(StoreError::Io(err)),
    };
    match serde_json::from_slice(&raw) {
        Ok(entries) => Ok(entries),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "discarding unreadable progress file");
            Ok(BTreeMap::new())
        }
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)
}

/// Progress for one chapter, as seen by a listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressChange {
    pub chapter_id: String,
    /// Parsed stored value; `None` when removed or unparsable.
    pub index: Option<i64>,
}

/// Chapter progress and unlock records over a raw [`KeyValueStore`].
#[derive(Debug)]
pub struct ProgressStore<S> {
    inner: S,
    namespace: String,
    unlock_key: String,
}

impl<S: KeyValueStore> ProgressStore<S> {
    pub fn new(inner: S) -> Self {
        Self::with_keys(inner, DEFAULT_PROGRESS_NAMESPACE, DEFAULT_UNLOCK_KEY)
    }

    pub fn from_config(inner: S, config: &ViewerConfig) -> Self {
        Self::with_keys(inner, &config.namespace, &config.unlock_key)
    }

    pub fn with_keys(inner: S, namespace: &str, unlock_key: &str) -> Self {
        Self {
            inner,
            namespace: namespace.to_string(),
            unlock_key: unlock_key.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn key_for(&self, chapter_id: &str) -> String {
        format!("{}_{}", self.namespace, chapter_id)
    }

    /// Stored line index for a chapter. Unparsable values read as absent.
    pub fn get(&self, chapter_id: &str) -> Option<i64> {
        let key = self.key_for(chapter_id);
        let raw = self.inner.get(&key)?;
        match raw.trim().parse::<i64>() {
            Ok(index) => Some(index),
            Err(_) => {
                warn!(%key, value = %raw, "ignoring malformed progress value");
                None
            }
        }
    }

    pub fn set(&mut self, chapter_id: &str, index: usize) -> StoreResult<()> {
        let key = self.key_for(chapter_id);
        self.inner.set(&key, &index.to_string())?;
        debug!(%key, index, "progress written");
        Ok(())
    }

    pub fn clear(&mut self, chapter_id: &str) -> StoreResult<()> {
        let key = self.key_for(chapter_id);
        self.inner.remove(&key)
    }

    /// Notifies when another session changes progress in this namespace.
    pub fn subscribe<F>(&mut self, mut listener: F) -> SubscriptionId
    where
        F: FnMut(&ProgressChange) + 'static,
    {
        let prefix = format!("{}_", self.namespace);
        self.inner.subscribe(Box::new(move |change: &StoreChange| {
            let Some(chapter_id) = change.key.strip_prefix(&prefix) else {
                return;
            };
            let index = change
                .new_value
                .as_deref()
                .and_then(|value| value.trim().parse::<i64>().ok());
            listener(&ProgressChange {
                chapter_id: chapter_id.to_string(),
                index,
            });
        }))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.inner.unsubscribe(id)
    }

    /// Unlocked chapter ids. A malformed record reads as empty.
    pub fn unlocked_chapters(&self) -> Vec<String> {
        let Some(raw) = self.inner.get(&self.unlock_key) else {
            return Vec::new();
        };
        match serde_json::from_str(&raw) {
            Ok(ids) => ids,
            Err(err) => {
                warn!(key = %self.unlock_key, error = %err, "ignoring malformed unlock record");
                Vec::new()
            }
        }
    }

    pub fn is_unlocked(&self, chapter_id: &str) -> bool {
        self.unlocked_chapters().iter().any(|id| id == chapter_id)
    }

    /// Adds a chapter to the unlock record. Returns `false` if it was already
    /// unlocked.
    pub fn unlock(&mut self, chapter_id: &str) -> StoreResult<bool> {
        let mut ids = self.unlocked_chapters();
        if ids.iter().any(|id| id == chapter_id) {
            return Ok(false);
        }
        ids.push(chapter_id.to_string());
        let payload = serde_json::to_string(&ids)?;
        self.inner.set(&self.unlock_key, &payload)?;
        debug!(chapter_id, "chapter unlocked");
        Ok(true)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
