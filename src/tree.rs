//! The context tree.
//!
//! [`Tree`] ties together the [`LayerIndex`], the [`NodeArena`] and a tree
//! [`Store`]. Paths are `/`-separated layer names; every segment resolves
//! to a layer by name and then to the child bound to that layer.
//!
//! # Operations
//!
//! | Method | Effect |
//! |--------|--------|
//! | [`insert`](Tree::insert) | create a path, auto-creating layers |
//! | [`remove`](Tree::remove) | splice a node out, or drop its whole subtree |
//! | [`move_node`](Tree::move_node) | shallow move: only the named layer relocates |
//! | [`move_recursive`](Tree::move_recursive) | deep move: the subtree relocates intact |
//! | [`copy_node`](Tree::copy_node) | attach a duplicate (leaf or full subtree) elsewhere |
//! | [`clear`](Tree::clear) | reset to a bare root |
//!
//! Every mutation takes `&mut self`, edits the arena, then persists the
//! whole tree under [`TREE_KEY`]. If the persist fails the arena is restored
//! to its state before the call and the error is returned.
//!
//! # Persisted form
//!
//! ```json
//! { "id": "<root layer id>", "name": "/", "children": [ { "id": "...", "name": "work", "children": [] } ] }
//! ```
//!
//! `name` is only a repair hint: on [`load`](Tree::load), a node whose layer
//! id is unknown is re-bound to the layer with that name, or the layer is
//! recreated under its recorded id.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::{StoreError, TreeError};
use crate::layer_index::LayerIndex;
use crate::models::{Layer, LayerId, LayerOptions, LayerType, ROOT_LAYER_ID, ROOT_LAYER_NAME};
use crate::node::{NodeArena, NodeId, TreeNode};
use crate::store::{JsonFileStore, Store, TREE_KEY};

/// A tree shared between tasks. Mutations take the write lock, so their
/// persists never interleave.
pub type SharedTree = Arc<RwLock<Tree>>;

/// How [`Tree::move_recursive`] detects moves of a subtree into itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleGuard {
    /// Reject when the destination path runs through the source node.
    #[default]
    Ancestor,
    /// Reject when the destination string contains the source layer name.
    Substring,
}

/// Behavioral switches for a [`Tree`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TreeOptions {
    #[serde(default = "default_true")]
    pub auto_create_layers: bool,
    #[serde(default = "default_true")]
    pub auto_repair: bool,
    #[serde(default = "default_true")]
    pub sort_paths: bool,
    #[serde(default)]
    pub cycle_guard: CycleGuard,
}

fn default_true() -> bool {
    true
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            auto_create_layers: true,
            auto_repair: true,
            sort_paths: true,
            cycle_guard: CycleGuard::Ancestor,
        }
    }
}

/// Identity-only node record, the persisted form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexNode {
    pub id: LayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub children: Vec<IndexNode>,
}

/// Full-fidelity node record carrying the layer's display attributes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub id: LayerId,
    #[serde(rename = "type")]
    pub layer_type: LayerType,
    pub name: String,
    pub label: String,
    pub description: String,
    pub color: Option<String>,
    pub locked: bool,
    pub children: Vec<TreeSnapshot>,
}

impl TreeSnapshot {
    fn from_layer(layer: &Layer, children: Vec<TreeSnapshot>) -> Self {
        Self {
            id: layer.id,
            layer_type: layer.layer_type,
            name: layer.name.clone(),
            label: layer.label.clone(),
            description: layer.description.clone(),
            color: layer.color.clone(),
            locked: layer.locked,
            children,
        }
    }
}

/// Common view over the two record formats used when rebuilding the arena.
trait NodeRecord {
    fn layer_id(&self) -> LayerId;
    fn repair_options(&self) -> Option<LayerOptions>;
    fn records(&self) -> &[Self]
    where
        Self: Sized;
}

impl NodeRecord for IndexNode {
    fn layer_id(&self) -> LayerId {
        self.id
    }

    fn repair_options(&self) -> Option<LayerOptions> {
        self.name.as_deref().map(LayerOptions::new)
    }

    fn records(&self) -> &[Self] {
        &self.children
    }
}

impl NodeRecord for TreeSnapshot {
    fn layer_id(&self) -> LayerId {
        self.id
    }

    fn repair_options(&self) -> Option<LayerOptions> {
        let layer_type = if self.layer_type.is_builtin() {
            LayerType::default()
        } else {
            self.layer_type
        };
        let mut options = LayerOptions::new(self.name.clone())
            .with_type(layer_type)
            .with_label(self.label.clone())
            .with_description(self.description.clone());
        options.color = self.color.clone();
        Some(options)
    }

    fn records(&self) -> &[Self] {
        &self.children
    }
}

struct Snapshot {
    arena: NodeArena,
    root: NodeId,
}

pub struct Tree {
    layers: LayerIndex,
    store: Arc<dyn Store>,
    arena: NodeArena,
    root: NodeId,
    options: TreeOptions,
}

impl Tree {
    /// Opens a tree over the given stores, loading a persisted tree if one
    /// exists and starting from a bare root otherwise.
    pub async fn open(
        layer_store: Arc<dyn Store>,
        tree_store: Arc<dyn Store>,
        options: TreeOptions,
    ) -> Result<Self, TreeError> {
        let layers = LayerIndex::open(layer_store).await?;
        if layers.get_layer_by_name(ROOT_LAYER_NAME).is_none() {
            return Err(TreeError::NotFound("root layer".to_string()));
        }

        let mut arena = NodeArena::new();
        let root = arena.alloc(ROOT_LAYER_ID);
        let mut tree = Self {
            layers,
            store: tree_store,
            arena,
            root,
            options,
        };

        if tree.load().await? {
            tracing::info!(nodes = tree.arena.len(), "context tree loaded from store");
        } else {
            tracing::info!("no persisted context tree, starting from bare root");
        }
        Ok(tree)
    }

    /// Opens a tree backed by JSON files.
    pub async fn open_files(
        layers_path: impl AsRef<Path>,
        tree_path: impl AsRef<Path>,
        options: TreeOptions,
    ) -> Result<Self, TreeError> {
        let layer_store = Arc::new(JsonFileStore::open(layers_path).await?);
        let tree_store = Arc::new(JsonFileStore::open(tree_path).await?);
        Self::open(layer_store, tree_store, options).await
    }

    /// Opens the file-backed tree described by `config`.
    pub async fn from_config(config: &Config) -> Result<Self, TreeError> {
        Self::open_files(
            &config.storage.layers_path,
            &config.storage.tree_path,
            config.tree.clone(),
        )
        .await
    }

    pub fn into_shared(self) -> SharedTree {
        Arc::new(RwLock::new(self))
    }

    pub fn layers(&self) -> &LayerIndex {
        &self.layers
    }

    /// Direct access to the registry for layer attribute edits.
    pub fn layers_mut(&mut self) -> &mut LayerIndex {
        &mut self.layers
    }

    pub fn options(&self) -> &TreeOptions {
        &self.options
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn root(&self) -> &TreeNode {
        self.node_ref(self.root)
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.arena.get(id)
    }

    fn node_ref(&self, id: NodeId) -> &TreeNode {
        match self.arena.get(id) {
            Some(node) => node,
            None => panic!("stale node handle {:?}", id),
        }
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.root().has_children()
    }

    /// Name of the layer bound to `node`, falling back to the raw id.
    pub fn node_name(&self, node: &TreeNode) -> String {
        self.layers
            .id_to_name(&node.id())
            .map(str::to_string)
            .unwrap_or_else(|| node.id().to_string())
    }

    /// Resolves `path` to a node handle. `/` and the empty path are the root.
    pub fn locate(&self, path: &str) -> Option<NodeId> {
        let mut current = self.root;
        for name in segments(path) {
            let Some(layer) = self.layers.get_layer_by_name(name) else {
                tracing::debug!(layer = %name, "layer not found in index");
                return None;
            };
            match self.arena.get(current).and_then(|n| n.child(&layer.id)) {
                Some(child) => current = child,
                None => {
                    tracing::debug!(path = %path, "target path does not exist");
                    return None;
                }
            }
        }
        Some(current)
    }

    pub fn get_node(&self, path: &str) -> Option<&TreeNode> {
        self.locate(path).and_then(|id| self.arena.get(id))
    }

    pub fn path_exists(&self, path: &str) -> bool {
        self.locate(path).is_some()
    }

    /// Layer ids along `path`, from the first segment to the target.
    /// Empty for the root, `None` if the path does not exist.
    pub fn context_array(&self, path: &str) -> Option<Vec<LayerId>> {
        let target = self.locate(path)?;
        let mut chain = self.arena.layer_chain(target);
        chain.remove(0);
        Some(chain)
    }

    /// True if any node below the root is bound to `layer`.
    pub fn layer_in_use(&self, layer: &LayerId) -> bool {
        let mut stack: Vec<NodeId> = self.root().children().collect();
        while let Some(id) = stack.pop() {
            let node = self.node_ref(id);
            if node.id() == *layer {
                return true;
            }
            stack.extend(node.children());
        }
        false
    }

    /// Inserts `path` using the configured auto-create policy.
    pub async fn insert_path(&mut self, path: &str) -> Result<bool, TreeError> {
        let auto_create = self.options.auto_create_layers;
        self.insert(path, None, auto_create).await
    }

    /// Creates every node along `path`.
    ///
    /// With `node`, a leaf bound to that layer is also attached under the
    /// final node unless one is already there. Returns `Ok(false)` without
    /// changing anything when a layer is missing and `auto_create_layers`
    /// is off.
    pub async fn insert(
        &mut self,
        path: &str,
        node: Option<LayerId>,
        auto_create_layers: bool,
    ) -> Result<bool, TreeError> {
        tracing::debug!(path = %path, "inserting path");
        if segments(path).is_empty() && node.is_none() {
            return Ok(true);
        }
        if let Some(layer) = node {
            if self.layers.is_internal_layer_id(&layer) {
                return Err(TreeError::ProtectedName(
                    self.layers.id_to_name(&layer).unwrap_or_default().to_string(),
                ));
            }
            if !self.layers.has_layer_id(&layer) {
                return Err(TreeError::NotFound(format!("layer {}", layer)));
            }
        }

        let Some(ids) = self.resolve_layers(path, auto_create_layers).await? else {
            return Ok(false);
        };

        let snapshot = self.snapshot();
        let target = self.descend(&ids);
        if let Some(layer) = node {
            self.arena.ensure_child(target, layer);
        }
        self.commit(snapshot).await?;
        tracing::debug!(path = %path, "path inserted");
        Ok(true)
    }

    /// Removes the node at `path`.
    ///
    /// Without `recursive`, the node's children are promoted onto its
    /// former parent, so every descendant stays reachable with the removed
    /// layer dropped from its path. With `recursive`, the whole subtree goes.
    pub async fn remove(&mut self, path: &str, recursive: bool) -> Result<bool, TreeError> {
        let Some(target) = self.locate(path) else {
            tracing::debug!(path = %path, "unable to remove, node not found");
            return Ok(false);
        };
        if target == self.root {
            return Err(TreeError::ProtectedName(ROOT_LAYER_NAME.to_string()));
        }
        if self.node_ref(target).parent().is_none() {
            return Err(TreeError::NotFound(format!("parent of \"{}\"", path)));
        }

        let snapshot = self.snapshot();
        if recursive {
            self.arena.detach(target);
            self.arena.free_subtree(target);
        } else {
            self.arena.splice(target);
        }
        self.commit(snapshot).await?;
        tracing::debug!(path = %path, recursive, "node removed");
        Ok(true)
    }

    /// Moves the layer at `from` under `to`.
    ///
    /// Without `recursive` this is a shallow move: a fresh node for the same
    /// layer is attached under `to`, while the original node is spliced out
    /// and its children stay behind at its former parent. With `recursive`
    /// it delegates to [`move_recursive`](Tree::move_recursive).
    pub async fn move_node(
        &mut self,
        from: &str,
        to: &str,
        recursive: bool,
    ) -> Result<bool, TreeError> {
        if recursive {
            return self.move_recursive(from, to).await;
        }
        tracing::debug!(from = %from, to = %to, "moving layer");

        let Some(source) = self.locate(from) else {
            tracing::debug!(path = %from, "unable to move, source node not found");
            return Ok(false);
        };
        if source == self.root {
            return Err(TreeError::ProtectedName(ROOT_LAYER_NAME.to_string()));
        }
        let layer = self.node_ref(source).id();
        let Some(ids) = self.resolve_layers(to, true).await? else {
            return Ok(false);
        };

        let snapshot = self.snapshot();
        let mut dest = self.descend(&ids);
        // Splicing may merge the destination away; re-walk it from the parent.
        let below_source = self.arena.layers_below(source, dest);
        let Some(parent) = self.arena.splice(source) else {
            self.restore(snapshot);
            return Err(TreeError::NotFound(format!("parent of \"{}\"", from)));
        };
        if let Some(relative) = below_source {
            dest = relative
                .iter()
                .fold(parent, |current, id| self.arena.ensure_child(current, *id));
        }
        let leaf = self.arena.alloc(layer);
        self.arena.attach(dest, leaf);
        self.commit(snapshot).await?;
        Ok(true)
    }

    /// Moves the node at `from`, children included, under `to`.
    pub async fn move_recursive(&mut self, from: &str, to: &str) -> Result<bool, TreeError> {
        tracing::debug!(from = %from, to = %to, "moving subtree");

        let Some(source) = self.locate(from) else {
            tracing::debug!(path = %from, "unable to move, source node not found");
            return Ok(false);
        };
        if source == self.root {
            return Err(TreeError::ProtectedName(ROOT_LAYER_NAME.to_string()));
        }
        let cycle = || TreeError::CycleGuard {
            from: from.to_string(),
            to: to.to_string(),
        };
        let guarded = match self.options.cycle_guard {
            CycleGuard::Substring => to.contains(&self.node_name(self.node_ref(source))),
            CycleGuard::Ancestor => self.path_runs_through(to, source),
        };
        if guarded {
            return Err(cycle());
        }

        let Some(ids) = self.resolve_layers(to, true).await? else {
            return Ok(false);
        };
        let snapshot = self.snapshot();
        let dest = self.descend(&ids);
        if self.arena.is_ancestor_or_self(source, dest) {
            self.restore(snapshot);
            return Err(cycle());
        }
        self.arena.detach(source);
        self.arena.attach(dest, source);
        self.commit(snapshot).await?;
        Ok(true)
    }

    /// Attaches a copy of the node at `from` under `to`. The source is left
    /// untouched. Without `recursive` only a leaf for the same layer is
    /// attached; with it the whole subtree is duplicated.
    pub async fn copy_node(
        &mut self,
        from: &str,
        to: &str,
        recursive: bool,
    ) -> Result<bool, TreeError> {
        tracing::debug!(from = %from, to = %to, recursive, "copying layer");

        let Some(source) = self.locate(from) else {
            tracing::debug!(path = %from, "unable to copy, source node not found");
            return Ok(false);
        };
        if source == self.root {
            return Err(TreeError::ProtectedName(ROOT_LAYER_NAME.to_string()));
        }
        let Some(ids) = self.resolve_layers(to, true).await? else {
            return Ok(false);
        };

        let snapshot = self.snapshot();
        let copy = if recursive {
            self.arena.deep_clone(source)
        } else {
            self.arena.alloc(self.node_ref(source).id())
        };
        let dest = self.descend(&ids);
        self.arena.attach(dest, copy);
        self.commit(snapshot).await?;
        Ok(true)
    }

    pub async fn copy_recursive(&mut self, from: &str, to: &str) -> Result<bool, TreeError> {
        self.copy_node(from, to, true).await
    }

    /// Drops every node below the root.
    pub async fn clear(&mut self) -> Result<(), TreeError> {
        tracing::debug!("clearing context tree");
        let snapshot = self.snapshot();
        let children: Vec<NodeId> = self.root().children().collect();
        for child in children {
            self.arena.detach(child);
            self.arena.free_subtree(child);
        }
        self.commit(snapshot).await
    }

    /// Renames a layer everywhere it appears in the tree.
    pub async fn rename_layer(&mut self, name: &str, new_name: &str) -> Result<(), TreeError> {
        self.layers.rename_layer(name, new_name).await?;
        self.save().await
    }

    /// Writes the identity-only tree under [`TREE_KEY`].
    pub async fn save(&self) -> Result<(), TreeError> {
        let value = serde_json::to_value(self.index_tree()).map_err(StoreError::from)?;
        if let Err(err) = self.store.set(TREE_KEY, value).await {
            tracing::warn!("error saving tree to store: {}", err);
            return Err(err.into());
        }
        tracing::debug!(nodes = self.arena.len(), "tree saved");
        Ok(())
    }

    /// Replaces the in-memory tree with the persisted one.
    /// Returns `Ok(false)` if nothing has been persisted yet.
    pub async fn load(&mut self) -> Result<bool, TreeError> {
        let Some(value) = self.store.get(TREE_KEY).await? else {
            tracing::debug!("no persisted tree found");
            return Ok(false);
        };
        let data: IndexNode = serde_json::from_value(value).map_err(StoreError::from)?;
        let (arena, root) = self.rebuild(&data).await?;
        self.arena = arena;
        self.root = root;
        Ok(true)
    }

    /// The identity-only form written by [`save`](Tree::save).
    pub fn index_tree(&self) -> IndexNode {
        self.index_node(self.root)
    }

    fn index_node(&self, id: NodeId) -> IndexNode {
        let node = self.node_ref(id);
        IndexNode {
            id: node.id(),
            name: self.layers.id_to_name(&node.id()).map(str::to_string),
            children: node.children().map(|c| self.index_node(c)).collect(),
        }
    }

    /// Full-fidelity snapshot including layer display attributes.
    pub fn to_json(&self) -> TreeSnapshot {
        self.snapshot_node(self.root)
    }

    fn snapshot_node(&self, id: NodeId) -> TreeSnapshot {
        let node = self.node_ref(id);
        let children = node.children().map(|c| self.snapshot_node(c)).collect();
        match self.layers.get_layer_by_id(&node.id()) {
            Some(layer) => TreeSnapshot::from_layer(layer, children),
            None => TreeSnapshot {
                id: node.id(),
                layer_type: LayerType::default(),
                name: node.id().to_string(),
                label: String::new(),
                description: String::new(),
                color: None,
                locked: false,
                children,
            },
        }
    }

    /// Replaces the tree with `snapshot`, recreating missing layers from
    /// the snapshot's attributes, and persists it.
    pub async fn from_json(&mut self, snapshot: &TreeSnapshot) -> Result<(), TreeError> {
        let (arena, root) = self.rebuild(snapshot).await?;
        let previous = self.snapshot();
        self.arena = arena;
        self.root = root;
        self.commit(previous).await
    }

    /// Leaf paths built from layer names, sorted unless configured otherwise.
    /// A bare root yields `["/"]`.
    pub fn paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.collect_paths(self.root, "", &mut paths);
        if self.options.sort_paths {
            paths.sort();
        }
        paths
    }

    fn collect_paths(&self, id: NodeId, prefix: &str, out: &mut Vec<String>) {
        let node = self.node_ref(id);
        let path = if id == self.root {
            "/".to_string()
        } else {
            format!("{}/{}", prefix, self.node_name(node))
        };
        if node.has_children() {
            for child in node.children() {
                self.collect_paths(child, &path, out);
            }
        } else {
            out.push(path.replace("//", "/"));
        }
    }

    /// Resolves every segment of `path` to a layer id, creating missing
    /// layers when allowed. Nothing is created unless every segment can be
    /// resolved.
    async fn resolve_layers(
        &mut self,
        path: &str,
        auto_create: bool,
    ) -> Result<Option<Vec<LayerId>>, TreeError> {
        let names = segments(path);
        if let Some(name) = names.iter().find(|n| self.layers.is_internal_layer_name(n)) {
            return Err(TreeError::ProtectedName(name.to_string()));
        }
        if !auto_create {
            if let Some(missing) = names.iter().find(|n| !self.layers.has_layer_name(n)) {
                tracing::debug!(
                    layer = %missing,
                    path = %path,
                    "layer not found and auto-create is disabled"
                );
                return Ok(None);
            }
        }

        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let id = match self.layers.name_to_id(name) {
                Some(id) => id,
                None => self
                    .layers
                    .create_layer(name)
                    .await?
                    .map(|layer| layer.id)
                    .ok_or_else(|| TreeError::NotFound(format!("layer \"{}\"", name)))?,
            };
            ids.push(id);
        }
        Ok(Some(ids))
    }

    /// Walks `ids` from the root, creating missing children.
    fn descend(&mut self, ids: &[LayerId]) -> NodeId {
        ids.iter()
            .fold(self.root, |current, id| self.arena.ensure_child(current, *id))
    }

    /// True if the existing prefix of `path` visits `node`.
    fn path_runs_through(&self, path: &str, node: NodeId) -> bool {
        let mut current = self.root;
        for name in segments(path) {
            let Some(layer) = self.layers.get_layer_by_name(name) else {
                return false;
            };
            match self.node_ref(current).child(&layer.id) {
                Some(child) if child == node => return true,
                Some(child) => current = child,
                None => return false,
            }
        }
        false
    }

    /// Builds a fresh arena from a record tree, repairing unknown layers.
    async fn rebuild<N: NodeRecord>(&mut self, record: &N) -> Result<(NodeArena, NodeId), TreeError> {
        if record.layer_id() != ROOT_LAYER_ID {
            tracing::warn!(id = %record.layer_id(), "persisted root is not bound to the root layer");
        }
        let remap = self.repair_layers(record).await?;

        let mut arena = NodeArena::new();
        let root = arena.alloc(ROOT_LAYER_ID);
        for child in record.records() {
            build_into(&mut arena, root, child, &remap);
        }
        Ok((arena, root))
    }

    async fn repair_layers<N: NodeRecord>(
        &mut self,
        record: &N,
    ) -> Result<HashMap<LayerId, LayerId>, TreeError> {
        let mut missing = Vec::new();
        for child in record.records() {
            collect_missing(child, &self.layers, &mut missing);
        }

        let mut remap = HashMap::new();
        for (old, options) in missing {
            if remap.contains_key(&old) {
                continue;
            }
            let Some(mut options) = options.filter(|_| self.options.auto_repair) else {
                return Err(TreeError::NotFound(format!(
                    "layer {} referenced by the tree",
                    old
                )));
            };
            let id = match self.layers.name_to_id(&options.name) {
                Some(existing) => {
                    tracing::warn!(id = %old, name = %options.name, "re-binding node to existing layer");
                    existing
                }
                None => {
                    tracing::warn!(id = %old, name = %options.name, "recreating missing layer");
                    options.id = Some(old);
                    self.layers
                        .create_layer(options)
                        .await?
                        .map(|layer| layer.id)
                        .ok_or_else(|| TreeError::NotFound(format!("layer {}", old)))?
                }
            };
            remap.insert(old, id);
        }
        Ok(remap)
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            arena: self.arena.clone(),
            root: self.root,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.arena = snapshot.arena;
        self.root = snapshot.root;
    }

    /// Persists the current tree, restoring `snapshot` if that fails.
    async fn commit(&mut self, snapshot: Snapshot) -> Result<(), TreeError> {
        if let Err(err) = self.save().await {
            tracing::warn!("restoring in-memory tree after failed persist");
            self.restore(snapshot);
            return Err(err);
        }
        Ok(())
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn collect_missing<N: NodeRecord>(
    record: &N,
    layers: &LayerIndex,
    out: &mut Vec<(LayerId, Option<LayerOptions>)>,
) {
    if !layers.has_layer_id(&record.layer_id()) {
        out.push((record.layer_id(), record.repair_options()));
    }
    for child in record.records() {
        collect_missing(child, layers, out);
    }
}

fn build_into<N: NodeRecord>(
    arena: &mut NodeArena,
    parent: NodeId,
    record: &N,
    remap: &HashMap<LayerId, LayerId>,
) {
    let layer = remap
        .get(&record.layer_id())
        .copied()
        .unwrap_or_else(|| record.layer_id());
    let node = arena.alloc(layer);
    let linked = arena.attach(parent, node);
    for child in record.records() {
        build_into(arena, linked, child, remap);
    }
}
