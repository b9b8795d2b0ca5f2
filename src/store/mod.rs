pub mod disk;
pub mod memory;

use crate::core::cache::{KeyValueCollection, Store};
use disk::DiskCollection;
use fjall::{Keyspace, PartitionCreateOptions};
use memory::MemoryCollection;
use std::path::Path;
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};
use tracing::warn;

/// A thread-safe key-value store that can hold multiple collections.
pub struct KeyValueStore {
    collections: RwLock<HashMap<String, Arc<dyn KeyValueCollection>>>,
    keyspace: Option<Arc<Keyspace>>,
}

impl KeyValueStore {
    /// Opens a store whose persistent collections live under `data_path`.
    ///
    /// If the keyspace cannot be opened the store still works, but only
    /// ephemeral collections can be created.
    pub fn open(data_path: &Path) -> Self {
        let keyspace = match fjall::Config::new(data_path.join("cache")).open() {
            Ok(keyspace) => Some(Arc::new(keyspace)),
            Err(e) => {
                warn!(
                    "Failed to open cache at {}: {}. Prices will not persist",
                    data_path.display(),
                    e
                );
                None
            }
        };

        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace,
        }
    }

    /// A store without persistence; persistent collections are unavailable.
    pub fn in_memory() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace: None,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.keyspace.is_some()
    }

    /// Syncs persistent collections to disk.
    pub fn flush(&self) -> anyhow::Result<()> {
        if let Some(keyspace) = &self.keyspace {
            keyspace.persist(fjall::PersistMode::SyncAll)?;
        }
        Ok(())
    }
}

impl Store for KeyValueStore {
    fn get_collection(
        &self,
        name: &str,
        persist: bool,
        create_if_missing: bool,
    ) -> Option<Arc<dyn KeyValueCollection>> {
        if create_if_missing {
            let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
            if !collections.contains_key(name) {
                let new_collection: Option<Arc<dyn KeyValueCollection>> = if persist {
                    self.keyspace.as_ref().and_then(|ks| {
                        ks.open_partition(name, PartitionCreateOptions::default())
                            .ok()
                            .map(|partition| {
                                Arc::new(DiskCollection::new(partition))
                                    as Arc<dyn KeyValueCollection>
                            })
                    })
                } else {
                    Some(Arc::new(MemoryCollection::new()))
                };

                match new_collection {
                    Some(collection) => {
                        collections.insert(name.to_string(), collection);
                    }
                    None => return None, // Failed to create persistent collection
                }
            }
        }

        let collections = self.collections.read().unwrap_or_else(PoisonError::into_inner);
        collections.get(name).cloned()
    }
}
