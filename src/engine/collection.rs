//! Collection implementation
//!
//! Named group of JSON documents with optional field indices.
//!
//! ## Indices
//! Each indexed field maps the canonical JSON text of a value to the set of
//! document ids holding it. Unique fields are always indexed. Documents that
//! lack a field (or hold `null` there) are not indexed on it and never
//! collide on a unique constraint.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StoreError};

use super::snapshot::CollectionSnapshot;

/// Shared handle to a collection owned by the engine
pub type CollectionHandle = Arc<Collection>;

/// A stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Engine-assigned id, unique within the collection
    pub id: u64,

    /// Document body (always a JSON object)
    pub data: Value,
}

/// Index configuration declared when a collection is created
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionOptions {
    /// Fields with a lookup index
    pub indices: Vec<String>,

    /// Fields whose values must be unique across documents
    pub unique: Vec<String>,
}

impl CollectionOptions {
    /// No indices, no constraints
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an indexed field
    pub fn index(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        if !self.indices.contains(&field) {
            self.indices.push(field);
        }
        self
    }

    /// Add a unique field (implies an index)
    pub fn unique(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        if !self.unique.contains(&field) {
            self.unique.push(field.clone());
        }
        self.index(field)
    }

    /// Whether the collection declares no index at all
    pub fn is_unindexed(&self) -> bool {
        self.indices.is_empty() && self.unique.is_empty()
    }

    /// Every field that carries an index (declared or implied by `unique`)
    fn indexed_fields(&self) -> BTreeSet<String> {
        self.indices
            .iter()
            .chain(self.unique.iter())
            .cloned()
            .collect()
    }
}

/// Index: canonical value text → document ids
type FieldIndex = BTreeMap<String, BTreeSet<u64>>;

struct CollectionData {
    documents: BTreeMap<u64, Value>,
    next_id: u64,
    indices: HashMap<String, FieldIndex>,
}

/// A named collection of documents
///
/// ## Concurrency:
/// - Documents and indices live behind one RwLock so a reader never sees an
///   index out of step with the documents
/// - `dirty` is shared with the owning database and set on every mutation
pub struct Collection {
    name: String,
    options: CollectionOptions,
    data: RwLock<CollectionData>,
    dirty: Arc<AtomicBool>,
}

impl Collection {
    pub(crate) fn new(name: &str, options: CollectionOptions, dirty: Arc<AtomicBool>) -> Self {
        let indices = options
            .indexed_fields()
            .into_iter()
            .map(|field| (field, FieldIndex::new()))
            .collect();

        Self {
            name: name.to_string(),
            options,
            data: RwLock::new(CollectionData {
                documents: BTreeMap::new(),
                next_id: 1,
                indices,
            }),
            dirty,
        }
    }

    /// Rebuild a collection (documents and indices) from a snapshot
    pub(crate) fn restore(snapshot: CollectionSnapshot, dirty: Arc<AtomicBool>) -> Result<Self> {
        let options = CollectionOptions {
            indices: snapshot.indices,
            unique: snapshot.unique,
        };
        let collection = Self::new(&snapshot.name, options, dirty);

        {
            let mut data = collection.data.write();
            for (id, text) in snapshot.documents {
                let body: Value = serde_json::from_str(&text)?;
                index_document(&mut data.indices, id, &body);
                data.documents.insert(id, body);
            }
            let max_id = data.documents.keys().next_back().copied().unwrap_or(0);
            data.next_id = snapshot.next_id.max(max_id + 1);
        }

        Ok(collection)
    }

    /// Capture documents and configuration for persistence
    pub(crate) fn snapshot(&self) -> Result<CollectionSnapshot> {
        let data = self.data.read();
        let documents = data
            .documents
            .iter()
            .map(|(id, body)| Ok((*id, serde_json::to_string(body)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(CollectionSnapshot {
            name: self.name.clone(),
            indices: self.options.indices.clone(),
            unique: self.options.unique.clone(),
            next_id: data.next_id,
            documents,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index configuration the collection was created with
    pub fn options(&self) -> &CollectionOptions {
        &self.options
    }

    /// Number of documents
    pub fn count(&self) -> usize {
        self.data.read().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Whether `field` has a lookup index
    pub fn is_indexed(&self, field: &str) -> bool {
        self.data.read().indices.contains_key(field)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a document by id
    pub fn get(&self, id: u64) -> Option<Document> {
        self.data
            .read()
            .documents
            .get(&id)
            .map(|body| Document { id, data: body.clone() })
    }

    /// All documents whose `field` equals `value`, in id order
    ///
    /// Uses the field index when one exists, otherwise scans. Indices hold no
    /// `null` entries, so a `null` lookup always scans.
    pub fn find_by(&self, field: &str, value: &Value) -> Vec<Document> {
        let data = self.data.read();

        if let Some(index) = data.indices.get(field).filter(|_| !value.is_null()) {
            let key = index_key(value);
            return index
                .get(&key)
                .into_iter()
                .flatten()
                .filter_map(|id| {
                    data.documents
                        .get(id)
                        .map(|body| Document { id: *id, data: body.clone() })
                })
                .collect();
        }

        data.documents
            .iter()
            .filter(|(_, body)| body.get(field) == Some(value))
            .map(|(id, body)| Document { id: *id, data: body.clone() })
            .collect()
    }

    /// First document (lowest id) whose `field` equals `value`
    pub fn find_one_by(&self, field: &str, value: &Value) -> Option<Document> {
        self.find_by(field, value).into_iter().next()
    }

    /// Every document, in id order
    pub fn all(&self) -> Vec<Document> {
        self.data
            .read()
            .documents
            .iter()
            .map(|(id, body)| Document { id: *id, data: body.clone() })
            .collect()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert a document, returning its assigned id
    pub fn insert(&self, body: Value) -> Result<u64> {
        ensure_object(&body)?;

        let mut data = self.data.write();
        self.check_unique(&data, &body, None)?;

        let id = data.next_id;
        data.next_id += 1;
        index_document(&mut data.indices, id, &body);
        data.documents.insert(id, body);
        drop(data);

        self.mark_dirty();
        tracing::trace!(collection = %self.name, id, "document inserted");
        Ok(id)
    }

    /// Replace the body of an existing document
    pub fn update(&self, id: u64, body: Value) -> Result<()> {
        ensure_object(&body)?;

        let mut data = self.data.write();
        let old = match data.documents.get(&id) {
            Some(old) => old.clone(),
            None => return Err(self.not_found(id)),
        };
        self.check_unique(&data, &body, Some(id))?;

        unindex_document(&mut data.indices, id, &old);
        index_document(&mut data.indices, id, &body);
        data.documents.insert(id, body);
        drop(data);

        self.mark_dirty();
        Ok(())
    }

    /// Remove a document, returning it
    pub fn remove(&self, id: u64) -> Result<Document> {
        let mut data = self.data.write();
        let body = match data.documents.remove(&id) {
            Some(body) => body,
            None => return Err(self.not_found(id)),
        };
        unindex_document(&mut data.indices, id, &body);
        drop(data);

        self.mark_dirty();
        Ok(Document { id, data: body })
    }

    /// Remove every document. Ids are not reused afterwards.
    pub fn clear(&self) {
        let mut data = self.data.write();
        if data.documents.is_empty() {
            return;
        }
        data.documents.clear();
        for index in data.indices.values_mut() {
            index.clear();
        }
        drop(data);

        self.mark_dirty();
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn check_unique(&self, data: &CollectionData, body: &Value, own_id: Option<u64>) -> Result<()> {
        for field in &self.options.unique {
            let Some(value) = body.get(field).filter(|v| !v.is_null()) else {
                continue;
            };
            let key = index_key(value);
            let taken = data
                .indices
                .get(field)
                .and_then(|index| index.get(&key))
                .map(|ids| ids.iter().any(|id| Some(*id) != own_id))
                .unwrap_or(false);

            if taken {
                return Err(StoreError::UniqueViolation {
                    collection: self.name.clone(),
                    field: field.clone(),
                    value: key,
                });
            }
        }
        Ok(())
    }

    fn not_found(&self, id: u64) -> StoreError {
        StoreError::DocumentNotFound {
            collection: self.name.clone(),
            id,
        }
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("count", &self.count())
            .finish()
    }
}

/// Canonical index key for a JSON value
fn index_key(value: &Value) -> String {
    value.to_string()
}

fn ensure_object(body: &Value) -> Result<()> {
    if body.is_object() {
        Ok(())
    } else {
        Err(StoreError::InvalidDocument(format!(
            "expected a JSON object, got {}",
            body
        )))
    }
}

fn index_document(indices: &mut HashMap<String, FieldIndex>, id: u64, body: &Value) {
    for (field, index) in indices.iter_mut() {
        if let Some(value) = body.get(field).filter(|v| !v.is_null()) {
            index.entry(index_key(value)).or_default().insert(id);
        }
    }
}

fn unindex_document(indices: &mut HashMap<String, FieldIndex>, id: u64, body: &Value) {
    for (field, index) in indices.iter_mut() {
        if let Some(value) = body.get(field).filter(|v| !v.is_null()) {
            let key = index_key(value);
            if let Some(ids) = index.get_mut(&key) {
                ids.remove(&id);
                if ids.is_empty() {
                    index.remove(&key);
                }
            }
        }
    }
}
