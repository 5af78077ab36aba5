use std::collections::HashMap;
use std::sync::Mutex;

use super::{Collection, PersistenceProvider, StorageError};

/// In-process provider. Nothing survives the process; a batch is swapped in under one lock.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<(Collection, String), Vec<u8>>>,
    journal: Mutex<HashMap<String, Vec<Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceProvider for MemoryStore {
    fn load_collection(
        &self,
        collection: Collection,
        guild: &str,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let documents = self
            .documents
            .lock()
            .map_err(|_| StorageError::Poisoned("memory documents"))?;
        Ok(documents.get(&(collection, guild.to_string())).cloned())
    }

    fn save_collections(
        &self,
        guild: &str,
        batch: &[(Collection, Vec<u8>)],
    ) -> Result<(), StorageError> {
        let mut documents = self
            .documents
            .lock()
            .map_err(|_| StorageError::Poisoned("memory documents"))?;
        for (collection, bytes) in batch {
            documents.insert((*collection, guild.to_string()), bytes.clone());
        }
        Ok(())
    }

    fn append_journal(&self, guild: &str, entry: &[u8]) -> Result<(), StorageError> {
        let mut journal = self
            .journal
            .lock()
            .map_err(|_| StorageError::Poisoned("memory journal"))?;
        journal
            .entry(guild.to_string())
            .or_default()
            .push(entry.to_vec());
        Ok(())
    }

    fn read_journal(&self, guild: &str) -> Result<Vec<Vec<u8>>, StorageError> {
        let journal = self
            .journal
            .lock()
            .map_err(|_| StorageError::Poisoned("memory journal"))?;
        Ok(journal.get(guild).cloned().unwrap_or_default())
    }
}
