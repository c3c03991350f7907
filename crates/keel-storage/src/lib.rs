//! Keel Storage - object store over a redb key-value backend
//!
//! This crate provides:
//! - KVStore trait for storage abstraction and its redb implementation
//! - Version-agnostic key encoding
//! - ObjectStore: get/list/create/patch/delete/watch with resourceVersion
//!   preconditions, a status subresource and finalizer-aware deletion

pub mod encoding;
pub mod error;
pub mod kv;
pub mod object_store;
pub mod redb_backend;
pub mod selector;

// Re-export commonly used types
pub use encoding::KeyEncoder;
pub use error::{Result, StorageError};
pub use kv::{KVStore, Transaction};
pub use object_store::{KvObjectStore, ObjectStore, PatchParams, StoreConfig, Subresource};
pub use redb_backend::RedbBackend;
pub use selector::LabelSelector;
