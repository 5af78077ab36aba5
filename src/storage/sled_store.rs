use std::path::Path;

use log::debug;

use super::{Collection, PersistenceProvider, StorageError};

const TREE_DOCUMENTS: &str = "guildvault_documents";
const TREE_JOURNAL: &str = "guildvault_journal";

/// Sled-backed provider. All documents share one tree so a multi-document save
/// is a single atomic `apply_batch`.
pub struct SledStore {
    db: sled::Db,
    documents: sled::Tree,
    journal: sled::Tree,
}

impl SledStore {
    /// Open (or create) the sled database rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let documents = db.open_tree(TREE_DOCUMENTS)?;
        let journal = db.open_tree(TREE_JOURNAL)?;
        Ok(Self {
            db,
            documents,
            journal,
        })
    }

    /// Key layout: `[collection tag][guild bytes]`. The tag is fixed width, so no
    /// guild id can collide with another collection's key.
    fn document_key(collection: Collection, guild: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(guild.len() + 1);
        key.push(collection.tag());
        key.extend_from_slice(guild.as_bytes());
        key
    }

    /// Key layout: `[guild len: u32 BE][guild bytes]`, followed by a monotonic id for entries.
    fn journal_prefix(guild: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(guild.len() + 4);
        key.extend_from_slice(&(guild.len() as u32).to_be_bytes());
        key.extend_from_slice(guild.as_bytes());
        key
    }
}

impl PersistenceProvider for SledStore {
    fn load_collection(
        &self,
        collection: Collection,
        guild: &str,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let key = Self::document_key(collection, guild);
        Ok(self.documents.get(key)?.map(|bytes| bytes.to_vec()))
    }

    fn save_collections(
        &self,
        guild: &str,
        batch: &[(Collection, Vec<u8>)],
    ) -> Result<(), StorageError> {
        let mut sled_batch = sled::Batch::default();
        for (collection, bytes) in batch {
            sled_batch.insert(Self::document_key(*collection, guild), bytes.as_slice());
        }
        self.documents.apply_batch(sled_batch)?;
        self.documents.flush()?;
        debug!("saved {} document(s) for guild {}", batch.len(), guild);
        Ok(())
    }

    fn append_journal(&self, guild: &str, entry: &[u8]) -> Result<(), StorageError> {
        let mut key = Self::journal_prefix(guild);
        key.extend_from_slice(&self.db.generate_id()?.to_be_bytes());
        self.journal.insert(key, entry)?;
        self.journal.flush()?;
        Ok(())
    }

    fn read_journal(&self, guild: &str) -> Result<Vec<Vec<u8>>, StorageError> {
        self.journal
            .scan_prefix(Self::journal_prefix(guild))
            .map(|entry| {
                entry
                    .map(|(_key, value)| value.to_vec())
                    .map_err(StorageError::from)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn documents_survive_reopen() {
        let dir = TempDir::new().expect("tempdir");
        {
            let store = SledStore::open(dir.path()).expect("store");
            store
                .save_collections(
                    "g1",
                    &[
                        (Collection::Users, b"users".to_vec()),
                        (Collection::Shops, b"shops".to_vec()),
                    ],
                )
                .expect("save");
        }
        let store = SledStore::open(dir.path()).expect("reopen");
        assert_eq!(
            store.load_collection(Collection::Users, "g1").expect("load"),
            Some(b"users".to_vec())
        );
        assert_eq!(
            store.load_collection(Collection::Shops, "g1").expect("load"),
            Some(b"shops".to_vec())
        );
        assert!(store
            .load_collection(Collection::Checkins, "g1")
            .expect("load")
            .is_none());
    }

    #[test]
    fn journal_is_partitioned_by_guild() {
        let dir = TempDir::new().expect("tempdir");
        let store = SledStore::open(dir.path()).expect("store");
        store.append_journal("g", b"first").expect("append");
        store.append_journal("g2", b"other").expect("append");
        store.append_journal("g", b"second").expect("append");
        let entries = store.read_journal("g").expect("read");
        assert_eq!(entries, vec![b"first".to_vec(), b"second".to_vec()]);
    }
}
