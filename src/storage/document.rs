//! JSON document collections with store-assigned ids.

use crate::core::{CaptureError, Result};
use crate::storage::persistence::{DurabilityMode, PersistenceManager, WalEntry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::warn;
use uuid::Uuid;

pub type Document = Value;

/// Field holding the store-assigned id inside every document.
pub const ID_FIELD: &str = "id";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Collection {
    documents: HashMap<String, Document>,
}

impl Collection {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.documents.get(id)
    }

    pub(crate) fn put(&mut self, id: String, document: Document) {
        self.documents.insert(id, document);
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Document> {
        self.documents.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Document)> {
        self.documents.iter()
    }
}

fn with_id(mut document: Document, id: &str) -> Result<Document> {
    match document.as_object_mut() {
        Some(object) => {
            object.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
            Ok(document)
        }
        None => Err(CaptureError::InvalidInput(
            "documents must be JSON objects".to_string(),
        )),
    }
}

/// In-memory document store with optional WAL + snapshot durability.
pub struct DocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
    persistence: Option<Mutex<PersistenceManager>>,
    closed: AtomicBool,
}

impl DocumentStore {
    /// A store that never touches the disk.
    pub fn in_memory() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            persistence: None,
            closed: AtomicBool::new(false),
        }
    }

    /// Opens (or creates) a store under `data_dir`, recovering prior state.
    pub fn open<P: AsRef<Path>>(data_dir: P, durability_mode: DurabilityMode) -> Result<Self> {
        if durability_mode == DurabilityMode::None {
            return Ok(Self::in_memory());
        }
        let persistence = PersistenceManager::new(data_dir, durability_mode)?;
        let collections = persistence.recover()?;
        Ok(Self {
            collections: RwLock::new(collections),
            persistence: Some(Mutex::new(persistence)),
            closed: AtomicBool::new(false),
        })
    }

    /// Every later operation fails with [`CaptureError::StoreClosed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(CaptureError::StoreClosed);
        }
        Ok(())
    }

    /// Makes `entry` durable, then applies it. A failed append leaves the
    /// collections untouched; a failed checkpoint does not, since the entry
    /// is already in the WAL.
    async fn commit(&self, entry: WalEntry, collections: &mut HashMap<String, Collection>) -> Result<()> {
        let Some(persistence) = &self.persistence else {
            entry.apply(collections);
            return Ok(());
        };
        let mut persistence = persistence.lock().await;
        persistence.log(&entry)?;
        entry.apply(collections);
        if persistence.needs_checkpoint() {
            if let Err(err) = persistence.checkpoint(collections) {
                warn!(error = %err, "checkpoint failed; WAL keeps growing");
            }
        }
        Ok(())
    }

    /// Inserts `document` and returns the id assigned to it.
    pub async fn insert(&self, collection: &str, document: Document) -> Result<String> {
        self.ensure_open()?;
        let id = Uuid::new_v4().to_string();
        let document = with_id(document, &id)?;

        let mut collections = self.collections.write().await;
        self.commit(
            WalEntry::Insert {
                collection: collection.to_string(),
                id: id.clone(),
                document,
            },
            &mut collections,
        )
        .await?;
        Ok(id)
    }

    /// Replaces an existing document wholesale.
    pub async fn replace(&self, collection: &str, id: &str, document: Document) -> Result<()> {
        self.ensure_open()?;
        let document = with_id(document, id)?;

        let mut collections = self.collections.write().await;
        let exists = collections
            .get(collection)
            .is_some_and(|target| target.get(id).is_some());
        if !exists {
            return Err(CaptureError::NotFound(id.to_string(), collection.to_string()));
        }
        self.commit(
            WalEntry::Replace {
                collection: collection.to_string(),
                id: id.to_string(),
                document,
            },
            &mut collections,
        )
        .await
    }

    pub async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.ensure_open()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|target| target.get(id))
            .cloned())
    }

    /// Returns clones of every document matching `predicate`, in no particular order.
    pub async fn find<F>(&self, collection: &str, predicate: F) -> Result<Vec<Document>>
    where
        F: Fn(&Document) -> bool,
    {
        self.ensure_open()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|target| {
                target
                    .iter()
                    .filter(|(_, document)| predicate(document))
                    .map(|(_, document)| document.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn count<F>(&self, collection: &str, predicate: F) -> Result<u64>
    where
        F: Fn(&Document) -> bool,
    {
        self.ensure_open()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|target| target.iter().filter(|(_, document)| predicate(document)).count() as u64)
            .unwrap_or(0))
    }

    /// Deletes every document matching `predicate` and returns how many went.
    pub async fn delete_where<F>(&self, collection: &str, predicate: F) -> Result<u64>
    where
        F: Fn(&Document) -> bool,
    {
        self.ensure_open()?;
        let mut collections = self.collections.write().await;
        let ids: Vec<String> = match collections.get(collection) {
            Some(target) => target
                .iter()
                .filter(|(_, document)| predicate(document))
                .map(|(id, _)| id.clone())
                .collect(),
            None => return Ok(0),
        };
        if ids.is_empty() {
            return Ok(0);
        }
        let deleted = ids.len() as u64;
        self.commit(
            WalEntry::Delete {
                collection: collection.to_string(),
                ids,
            },
            &mut collections,
        )
        .await?;
        Ok(deleted)
    }

    /// Drops the whole collection.
    pub async fn clear(&self, collection: &str) -> Result<u64> {
        self.ensure_open()?;
        let mut collections = self.collections.write().await;
        let deleted = collections
            .get(collection)
            .map(|target| target.len() as u64)
            .unwrap_or(0);
        self.commit(
            WalEntry::Clear {
                collection: collection.to_string(),
            },
            &mut collections,
        )
        .await?;
        Ok(deleted)
    }

    /// Forces a snapshot and truncates the WAL.
    pub async fn checkpoint(&self) -> Result<()> {
        self.ensure_open()?;
        let collections = self.collections.read().await;
        if let Some(persistence) = &self.persistence {
            persistence.lock().await.checkpoint(&collections)?;
        }
        Ok(())
    }
}
