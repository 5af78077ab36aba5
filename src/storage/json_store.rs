use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use log::{debug, warn};

use super::{Collection, PersistenceProvider, StorageError};
use crate::validation::safe_filename;

const JOURNAL_DIR: &str = "journal";

/// File-backed provider: one JSON document per `(collection, guild)`.
pub struct JsonFileStore {
    data_dir: PathBuf,
}

impl JsonFileStore {
    /// Open (or create) a store rooted at `data_dir`.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        for collection in Collection::ALL {
            fs::create_dir_all(data_dir.join(collection.name()))?;
        }
        fs::create_dir_all(data_dir.join(JOURNAL_DIR))?;
        Ok(Self { data_dir })
    }

    /// Base directory of this store.
    pub fn base_dir(&self) -> &Path {
        &self.data_dir
    }

    fn document_path(&self, collection: Collection, guild: &str) -> PathBuf {
        self.data_dir
            .join(collection.name())
            .join(format!("{}.json", safe_filename(guild)))
    }

    fn journal_path(&self, guild: &str) -> PathBuf {
        self.data_dir
            .join(JOURNAL_DIR)
            .join(format!("{}.jsonl", safe_filename(guild)))
    }

    fn read_document(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(path) {
            // The destination is created empty to hold the lock, so a first write that
            // crashed before its rename leaves an empty file behind.
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write `content` to `path` atomically while holding an exclusive lock on the destination.
    fn write_file_locked(path: &Path, content: &[u8]) -> Result<(), StorageError> {
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        lock_file.lock_exclusive()?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let base = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("document.json");
        let mut counter = 0u32;
        let tmp_path = loop {
            let candidate = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(mut tmp) => {
                    tmp.write_all(content)?;
                    tmp.flush()?;
                    tmp.sync_all()?;
                    break candidate;
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    counter = counter.saturating_add(1);
                }
                Err(e) => return Err(e.into()),
            }
        };

        fs::rename(&tmp_path, path)?;
        if let Ok(dir_file) = File::open(dir) {
            let _ = dir_file.sync_all();
        }
        drop(lock_file);
        Ok(())
    }

    fn restore(path: &Path, previous: Option<&[u8]>) -> Result<(), StorageError> {
        match previous {
            Some(bytes) => Self::write_file_locked(path, bytes),
            None => match fs::remove_file(path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            },
        }
    }
}

impl PersistenceProvider for JsonFileStore {
    fn load_collection(
        &self,
        collection: Collection,
        guild: &str,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        Self::read_document(&self.document_path(collection, guild))
    }

    fn save_collections(
        &self,
        guild: &str,
        batch: &[(Collection, Vec<u8>)],
    ) -> Result<(), StorageError> {
        // Documents live in separate files, so a failure part-way through is undone by
        // rewriting the earlier files with what they held before.
        let mut written: Vec<(PathBuf, Option<Vec<u8>>)> = Vec::with_capacity(batch.len());
        for (collection, bytes) in batch {
            let path = self.document_path(*collection, guild);
            let previous = match Self::read_document(&path) {
                Ok(previous) => previous,
                Err(e) => return Err(self.rollback(guild, written, e)),
            };
            if let Err(e) = Self::write_file_locked(&path, bytes) {
                written.push((path, previous));
                return Err(self.rollback(guild, written, e));
            }
            debug!("saved {} for guild {} ({} bytes)", collection, guild, bytes.len());
            written.push((path, previous));
        }
        Ok(())
    }

    fn append_journal(&self, guild: &str, entry: &[u8]) -> Result<(), StorageError> {
        let path = self.journal_path(guild);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.lock_exclusive()?;
        file.write_all(entry)?;
        file.write_all(b"\n")?;
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }

    fn read_journal(&self, guild: &str) -> Result<Vec<Vec<u8>>, StorageError> {
        let path = self.journal_path(guild);
        let mut content = Vec::new();
        match File::open(&path) {
            Ok(mut file) => {
                file.lock_shared()?;
                file.read_to_end(&mut content)?;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        }
        Ok(content
            .split(|b| *b == b'\n')
            .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
            .map(<[u8]>::to_vec)
            .collect())
    }
}

impl JsonFileStore {
    fn rollback(
        &self,
        guild: &str,
        written: Vec<(PathBuf, Option<Vec<u8>>)>,
        cause: StorageError,
    ) -> StorageError {
        let mut failures = Vec::new();
        for (path, previous) in written.into_iter().rev() {
            if let Err(e) = Self::restore(&path, previous.as_deref()) {
                warn!("rollback of {} failed: {}", path.display(), e);
                failures.push(format!("{}: {}", path.display(), e));
            }
        }
        if failures.is_empty() {
            cause
        } else {
            StorageError::RollbackFailed {
                guild: guild.to_string(),
                cause: cause.to_string(),
                rollback: failures.join("; "),
            }
        }
    }
}
