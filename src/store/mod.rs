//! Storage abstraction for the layer registry and the serialized tree.
//!
//! The [`Store`] trait is a small async key/value interface over JSON
//! values. The [`LayerIndex`](crate::layer_index::LayerIndex) keeps one
//! entry per layer id; the [`Tree`](crate::tree::Tree) keeps its whole
//! node graph under the single key [`TREE_KEY`].
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! | Backend | Module | Use |
//! |---------|--------|-----|
//! | [`JsonFileStore`] | [`json_file`] | one JSON document on disk, atomic rewrites |
//! | [`InMemoryStore`] | [`memory`] | tests and ephemeral trees |

pub mod json_file;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

pub use json_file::JsonFileStore;
pub use memory::InMemoryStore;

/// Key under which the tree blob is stored.
pub const TREE_KEY: &str = "tree";

/// Abstract key/value backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](Store::get) | Read one value |
/// | [`set`](Store::set) | Insert or overwrite one value, durably |
/// | [`delete`](Store::delete) | Remove one value |
/// | [`entries`](Store::entries) | Read every entry, ordered by key |
#[async_trait]
pub trait Store: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Store `value` under `key`. Returns once the write is durable.
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Remove `key`. Returns whether an entry existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// All entries, ordered by key.
    async fn entries(&self) -> Result<Vec<(String, Value)>, StoreError>;
}
