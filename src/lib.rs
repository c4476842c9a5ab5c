//! # turbostore
//!
//! An embedded, collection-oriented document store with:
//! - An asynchronous initialization barrier: nothing touches collections
//!   before the store has loaded
//! - A single FIFO chain that runs every store operation one at a time
//! - Explicit persistence on top of the engine's periodic autosave
//! - Snapshot files with CRC32 integrity checks
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                               │
//! │      initialize · has_been_init · run · persist · close      │
//! └──────┬──────────────────┬───────────────────┬───────────────┘
//!        │                  │                   │
//!        ▼                  ▼                   ▼
//! ┌─────────────┐   ┌───────────────┐   ┌───────────────┐
//! │  Lifecycle  │   │   Registry    │   │  Persistence  │
//! │ (bootstrap) │   │ (collections) │   │   (persist)   │
//! └──────┬──────┘   └───────┬───────┘   └───────┬───────┘
//!        │                  │                   │
//!        ▼                  │                   ▼
//! ┌─────────────────────────┼───────────────────────────────────┐
//! │                 Scheduler (one chain, FIFO)                  │
//! └─────────────────────────┼───────────────────────────────────┘
//!                           ▼
//!                  ┌─────────────────┐
//!                  │  StorageEngine  │  callback-based
//!                  │  (DocumentDb)   │──► PersistenceAdapter
//!                  └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

mod callback;
pub mod engine;
pub mod scheduler;
pub mod lifecycle;
pub mod registry;
pub mod persistence;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::{Config, FailurePolicy};
pub use engine::{CollectionHandle, Document};
pub use lifecycle::{InitHandle, LifecycleState};
pub use registry::{CollectionName, CollectionRegistry};
pub use scheduler::{Completion, Scheduler};
pub use store::Store;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of turbostore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
