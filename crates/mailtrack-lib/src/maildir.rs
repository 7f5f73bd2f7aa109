//! Message Store: one maildir per issue.
//!
//! An issue folder holds three staging subfolders. New messages are written
//! to `tmp/` under a unique delivery key, flushed, and renamed into `new/`,
//! so a reader listing `new/` and `cur/` never sees a partial file. `tmp/`
//! is never listed.
//!
//! Keys are the file name up to an optional maildir info suffix
//! (`key:2,FLAGS`). Storage order is the lexicographic key order, which
//! follows delivery time because keys start with the delivery timestamp.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, TrackerError};
use crate::lock::{DEFAULT_LOCK_TIMEOUT, IssueLock};
use crate::message::Message;
use crate::thread;
use crate::util::{delivery_key, key_from_filename};

/// Staging subfolders every issue folder carries.
pub const SUBDIRS: [&str; 3] = ["new", "cur", "tmp"];

const LOCK_FILE: &str = ".lock";

/// A message loaded from disk.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub key: String,
    pub path: PathBuf,
    pub message: Message,
}

/// All messages of one issue, in storage order.
#[derive(Debug, Clone)]
pub struct Mailbox {
    dir: PathBuf,
    entries: Vec<StoredMessage>,
    lock_timeout: Duration,
}

impl Mailbox {
    /// Create the staging subfolders of `dir` if any are missing.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if a folder cannot be created.
    pub fn ensure_layout(dir: &Path) -> Result<()> {
        for sub in SUBDIRS {
            let path = dir.join(sub);
            if !path.is_dir() {
                fs::create_dir_all(&path).map_err(|e| {
                    TrackerError::storage(format!("cannot create {}: {e}", path.display()))
                })?;
                debug!(path = %path.display(), "Created staging folder");
            }
        }
        Ok(())
    }

    /// Open an issue folder, creating missing staging subfolders.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the layout cannot be created, or `Io` if a
    /// staging folder cannot be listed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let mut mailbox = Self {
            dir: dir.into(),
            entries: Vec::new(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        };
        Self::ensure_layout(&mailbox.dir)?;
        mailbox.reload()?;
        Ok(mailbox)
    }

    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Re-read `new/` and `cur/`.
    ///
    /// Files that vanish between listing and reading (moved by a mail
    /// reader, for example) are skipped.
    ///
    /// # Errors
    ///
    /// Returns `Io` if a staging folder cannot be listed.
    pub fn reload(&mut self) -> Result<()> {
        let mut entries = Vec::new();
        for sub in ["new", "cur"] {
            let folder = self.dir.join(sub);
            let listing = match fs::read_dir(&folder) {
                Ok(listing) => listing,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            for entry in listing {
                let entry = entry?;
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.starts_with('.') {
                    continue;
                }
                let path = entry.path();
                let raw = match fs::read(&path) {
                    Ok(raw) => raw,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        debug!(path = %path.display(), "Message vanished while reading");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };
                entries.push(StoredMessage {
                    key: key_from_filename(&name).to_string(),
                    path,
                    message: Message::parse(&raw),
                });
            }
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries.dedup_by(|later, earlier| {
            let dup = later.key == earlier.key;
            if dup {
                warn!(key = %later.key, "Duplicate message key, keeping first copy");
            }
            dup
        });
        self.entries = entries;
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Issue id: the folder name.
    #[must_use]
    pub fn id(&self) -> String {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in storage order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Message> {
        self.find(key).map(|e| &e.message)
    }

    #[must_use]
    pub fn path_of(&self, key: &str) -> Option<&Path> {
        self.find(key).map(|e| e.path.as_path())
    }

    #[must_use]
    pub fn entries(&self) -> &[StoredMessage] {
        &self.entries
    }

    /// `(key, message)` pairs in storage order, the input shape of the
    /// thread functions.
    #[must_use]
    pub fn pairs(&self) -> Vec<(&str, &Message)> {
        self.entries
            .iter()
            .map(|e| (e.key.as_str(), &e.message))
            .collect()
    }

    /// Key of the root message, if the issue has one.
    #[must_use]
    pub fn root_key(&self) -> Option<&str> {
        thread::find_root(&self.pairs())
    }

    #[must_use]
    pub fn root(&self) -> Option<&Message> {
        self.root_key().and_then(|k| self.get(k))
    }

    fn find(&self, key: &str) -> Option<&StoredMessage> {
        self.entries
            .binary_search_by(|e| e.key.as_str().cmp(key))
            .ok()
            .map(|i| &self.entries[i])
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Deliver `message` and return its key and final path.
    ///
    /// The file is fully written and synced under `tmp/` before it is
    /// renamed into `new/`.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be written or moved.
    pub fn add(&mut self, message: &Message) -> Result<(String, PathBuf)> {
        let bytes = message.to_bytes();
        loop {
            let key = delivery_key();
            let tmp_path = self.dir.join("tmp").join(&key);
            let final_path = self.dir.join("new").join(&key);
            if final_path.exists() {
                continue;
            }

            let mut file = match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp_path)
            {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };
            if let Err(e) = file.write_all(&bytes).and_then(|()| file.sync_all()) {
                drop(file);
                let _ = fs::remove_file(&tmp_path);
                return Err(e.into());
            }
            drop(file);

            if let Err(e) = fs::rename(&tmp_path, &final_path) {
                let _ = fs::remove_file(&tmp_path);
                return Err(e.into());
            }
            debug!(key = %key, path = %final_path.display(), "Delivered message");

            let stored = StoredMessage {
                key: key.clone(),
                path: final_path.clone(),
                message: message.clone(),
            };
            let pos = self
                .entries
                .partition_point(|e| e.key.as_str() < key.as_str());
            self.entries.insert(pos, stored);
            return Ok((key, final_path));
        }
    }

    /// Rewrite the root message's headers from `message`.
    ///
    /// The stored body and Message-Id are kept whatever `message` carries.
    /// Returns the root's path.
    ///
    /// # Errors
    ///
    /// Returns `MalformedIssue` if there is no root, or `Io` if the file
    /// cannot be rewritten.
    pub fn replace_root(&mut self, message: &Message) -> Result<PathBuf> {
        let key = self
            .root_key()
            .map(ToString::to_string)
            .ok_or_else(|| TrackerError::MalformedIssue { id: self.id() })?;
        let idx = self
            .entries
            .binary_search_by(|e| e.key.as_str().cmp(key.as_str()))
            .map_err(|_| TrackerError::MalformedIssue { id: self.id() })?;

        let current = &self.entries[idx];
        let mut updated = message.clone();
        updated.set_body(current.message.body().to_vec());
        match current.message.message_id() {
            Some(mid) => updated.set_header("Message-Id", mid),
            None => {
                updated.remove_header("Message-Id");
            }
        }

        let path = current.path.clone();
        let tmp_path = self.dir.join("tmp").join(format!("{key}.rewrite"));
        replace_file(&tmp_path, &path, &updated.to_bytes())?;
        debug!(key = %key, "Rewrote root message headers");
        self.entries[idx].message = updated;
        Ok(path)
    }

    // ========================================================================
    // Locking
    // ========================================================================

    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.dir.join("tmp").join(LOCK_FILE)
    }

    /// Acquire the issue's advisory lock.
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` if the lock stays held by another writer.
    pub fn lock(&self) -> Result<IssueLock> {
        IssueLock::acquire(&self.lock_path(), self.lock_timeout)
    }

    /// Run `f` under the issue lock against a freshly reloaded view.
    ///
    /// The lock is released on every exit path.
    ///
    /// # Errors
    ///
    /// Propagates lock, reload and `f` errors.
    pub fn with_lock<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let guard = self.lock()?;
        self.reload()?;
        let result = f(self);
        drop(guard);
        result
    }
}

/// Write `bytes` to `tmp_path`, flush, and rename over `dest`. The temp
/// file never outlives a failure.
fn replace_file(tmp_path: &Path, dest: &Path, bytes: &[u8]) -> Result<()> {
    let written = fs::File::create(tmp_path)
        .and_then(|mut file| file.write_all(bytes).and_then(|()| file.sync_all()))
        .and_then(|()| fs::rename(tmp_path, dest));
    if let Err(e) = written {
        let _ = fs::remove_file(tmp_path);
        return Err(e.into());
    }
    Ok(())
}
