//! # Context Tree
//!
//! A hierarchical index of reusable, named *layers*. Documents are tagged
//! with every layer on a path such as `/work/acme/devops`, so one layer can
//! sit in many branches without duplicating its identity.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌────────────┐
//! │ Context  │──▶│   Tree   │──▶│ LayerIndex │
//! │ url+lock │   │  arena   │   │ id ↔ name  │
//! └──────────┘   └────┬─────┘   └─────┬──────┘
//!                     │               │
//!                     ▼               ▼
//!                ┌─────────────────────────┐
//!                │   Store (JSON / memory) │
//!                └─────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ctree init                          # create the store files
//! ctree insert work/acme/devops       # create a path, layers included
//! ctree move work/acme archive --recursive
//! ctree paths                         # list leaf paths
//! ctree resolve universe://work/acme  # show the context array
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Layer records and built-ins |
//! | [`error`] | Error types |
//! | [`store`] | Key/value persistence backends |
//! | [`layer_index`] | Layer registry |
//! | [`url`] | Context URL parsing and path sanitization |
//! | [`node`] | Node arena |
//! | [`tree`] | Tree operations and serialization |
//! | [`context`] | Current URL, lock and context array |
//! | [`commands`] | CLI command runners |
//! | [`telemetry`] | Logging setup |

pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod layer_index;
pub mod models;
pub mod node;
pub mod store;
pub mod telemetry;
pub mod tree;
pub mod url;

pub use context::Context;
pub use error::{StoreError, TreeError};
pub use layer_index::LayerIndex;
pub use models::{Layer, LayerId, LayerOptions, LayerPatch, LayerType};
pub use store::{InMemoryStore, JsonFileStore, Store};
pub use tree::{CycleGuard, SharedTree, Tree, TreeOptions};
pub use url::Url;
