//! Collection Registry
//!
//! Typed access to the four collections the store declares.
//!
//! Collection names are a fixed contract with persisted data: renaming one
//! orphans every document stored under the old name.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::engine::{CollectionHandle, CollectionOptions, StorageEngine};
use crate::error::{Result, StoreError};

/// Field identifying a student in `customers` and `images`
pub const STUDENT_ID_FIELD: &str = "studentId";

/// The collections every store declares at bootstrap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionName {
    /// One document per student, unique on `studentId`
    Customers,

    /// Any number of images per student, indexed on `studentId`
    Images,

    /// Singleton record holding the trained recognizer
    TrainedRecognizer,

    /// Unindexed scratch space
    TemporaryStorage,
}

impl CollectionName {
    /// Every declared collection, in bootstrap order
    pub const ALL: [CollectionName; 4] = [
        CollectionName::Customers,
        CollectionName::Images,
        CollectionName::TrainedRecognizer,
        CollectionName::TemporaryStorage,
    ];

    /// Name the engine stores the collection under
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionName::Customers => "customers",
            CollectionName::Images => "images",
            CollectionName::TrainedRecognizer => "trainedRecognizer",
            CollectionName::TemporaryStorage => "temporaryStorage",
        }
    }

    /// Index configuration declared at creation
    pub fn options(&self) -> CollectionOptions {
        match self {
            CollectionName::Customers => CollectionOptions::new().unique(STUDENT_ID_FIELD),
            CollectionName::Images => CollectionOptions::new().index(STUDENT_ID_FIELD),
            CollectionName::TrainedRecognizer | CollectionName::TemporaryStorage => {
                CollectionOptions::new()
            }
        }
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionName {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        CollectionName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| StoreError::UnknownCollection(s.to_string()))
    }
}

/// Hands out collection handles once the store is ready
///
/// Lookups are synchronous and do not go through the scheduler. Anything
/// that mutates documents should run inside a scheduled unit so it stays
/// ordered with persistence.
#[derive(Clone)]
pub struct CollectionRegistry {
    engine: Arc<dyn StorageEngine>,
    ready: Arc<AtomicBool>,
}

impl CollectionRegistry {
    pub(crate) fn new(engine: Arc<dyn StorageEngine>, ready: Arc<AtomicBool>) -> Self {
        Self { engine, ready }
    }

    /// Look up a declared collection
    ///
    /// Returns `NotReady` until bootstrap has completed.
    pub fn collection(&self, name: CollectionName) -> Result<CollectionHandle> {
        if !self.ready.load(Ordering::Acquire) {
            return Err(StoreError::NotReady);
        }
        self.engine
            .get_collection(name.as_str())
            .ok_or_else(|| StoreError::UnknownCollection(name.as_str().to_string()))
    }

    pub fn customers(&self) -> Result<CollectionHandle> {
        self.collection(CollectionName::Customers)
    }

    pub fn images(&self) -> Result<CollectionHandle> {
        self.collection(CollectionName::Images)
    }

    pub fn trained_recognizer(&self) -> Result<CollectionHandle> {
        self.collection(CollectionName::TrainedRecognizer)
    }

    pub fn temporary_storage(&self) -> Result<CollectionHandle> {
        self.collection(CollectionName::TemporaryStorage)
    }
}
