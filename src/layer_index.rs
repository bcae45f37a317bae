//! Durable registry of [`Layer`]s.
//!
//! Layers are keyed by their stable [`LayerId`] in the backing [`Store`]
//! (one entry per layer) and additionally indexed by name in memory. The
//! name index is rebuilt from the primary map on every open.
//!
//! Built-in layers ([`builtin_layers`]) are seeded on open, always locked,
//! and never written to the store.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::TreeError;
use crate::models::{builtin_layers, is_builtin_id, is_builtin_name, Layer, LayerId, LayerOptions, LayerPatch};
use crate::store::Store;

pub struct LayerIndex {
    store: Arc<dyn Store>,
    layers: HashMap<LayerId, Layer>,
    names: HashMap<String, LayerId>,
}

impl LayerIndex {
    /// Loads every stored layer and seeds the built-ins.
    ///
    /// Stored entries that collide with a built-in id or name, or that
    /// duplicate an already-loaded name, are skipped with a warning.
    pub async fn open(store: Arc<dyn Store>) -> Result<Self, TreeError> {
        let mut index = Self {
            store,
            layers: HashMap::new(),
            names: HashMap::new(),
        };

        for layer in builtin_layers() {
            index.register(layer);
        }

        for (key, value) in index.store.entries().await? {
            let layer: Layer = match serde_json::from_value(value) {
                Ok(layer) => layer,
                Err(err) => {
                    tracing::warn!(key = %key, "skipping unreadable layer entry: {}", err);
                    continue;
                }
            };
            if is_builtin_id(&layer.id) || is_builtin_name(&layer.name) {
                tracing::warn!(name = %layer.name, "skipping stored entry shadowing a built-in layer");
                continue;
            }
            if index.names.contains_key(&layer.name) {
                tracing::warn!(name = %layer.name, id = %layer.id, "skipping duplicate layer name");
                continue;
            }
            index.register(layer);
        }

        tracing::debug!(layers = index.layers.len(), "layer index initialized");
        Ok(index)
    }

    fn register(&mut self, layer: Layer) {
        self.names.insert(layer.name.clone(), layer.id);
        self.layers.insert(layer.id, layer);
    }

    async fn persist(&self, id: &LayerId) -> Result<(), TreeError> {
        if is_builtin_id(id) {
            return Ok(());
        }
        if let Some(layer) = self.layers.get(id) {
            let value = serde_json::to_value(layer).map_err(crate::error::StoreError::from)?;
            self.store.set(&id.to_string(), value).await?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn has_layer_id(&self, id: &LayerId) -> bool {
        self.layers.contains_key(id)
    }

    pub fn has_layer_name(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// True iff `name` is a built-in layer name.
    pub fn is_internal_layer_name(&self, name: &str) -> bool {
        is_builtin_name(name) && self.has_layer_name(name)
    }

    /// True iff `id` is a built-in layer id.
    pub fn is_internal_layer_id(&self, id: &LayerId) -> bool {
        is_builtin_id(id) && self.has_layer_id(id)
    }

    /// All layers, sorted by name.
    pub fn list(&self) -> Vec<&Layer> {
        let mut layers: Vec<&Layer> = self.layers.values().collect();
        layers.sort_by(|a, b| a.name.cmp(&b.name));
        layers
    }

    pub fn get_layer_by_id(&self, id: &LayerId) -> Option<&Layer> {
        self.layers.get(id)
    }

    pub fn get_layer_by_name(&self, name: &str) -> Option<&Layer> {
        self.names.get(name).and_then(|id| self.layers.get(id))
    }

    pub fn name_to_id(&self, name: &str) -> Option<LayerId> {
        self.names.get(name).copied()
    }

    pub fn id_to_name(&self, id: &LayerId) -> Option<&str> {
        self.layers.get(id).map(|l| l.name.as_str())
    }

    /// Creates and persists a layer.
    ///
    /// Returns `Ok(None)` without touching the registry when the name is
    /// already taken (including built-in names) or the requested id is in use.
    pub async fn create_layer(
        &mut self,
        options: impl Into<LayerOptions>,
    ) -> Result<Option<Layer>, TreeError> {
        let options = options.into();
        if self.has_layer_name(&options.name) {
            tracing::debug!(name = %options.name, "layer already exists");
            return Ok(None);
        }
        validate_name(&options.name)?;
        if options.layer_type.is_builtin() {
            return Err(TreeError::ProtectedName(options.name));
        }
        if let Some(id) = options.id {
            if self.has_layer_id(&id) {
                return Ok(None);
            }
        }

        let layer = options.build();
        let id = layer.id;
        tracing::debug!(name = %layer.name, id = %id, "creating layer");
        self.register(layer);
        if let Err(err) = self.persist(&id).await {
            self.unregister(&id);
            return Err(err);
        }
        Ok(self.layers.get(&id).cloned())
    }

    /// Applies `patch` to the named layer. `Ok(false)` if it does not exist.
    pub async fn update_layer(&mut self, name: &str, patch: LayerPatch) -> Result<bool, TreeError> {
        let Some(id) = self.name_to_id(name) else {
            return Ok(false);
        };
        let layer = self.writable(&id)?;
        if patch.layer_type.is_some_and(|t| t.is_builtin()) {
            return Err(TreeError::ProtectedName(name.to_string()));
        }
        let previous = layer.clone();
        layer.apply(patch);
        if let Err(err) = self.persist(&id).await {
            self.layers.insert(id, previous);
            return Err(err);
        }
        Ok(true)
    }

    /// Renames a layer, re-keying the name index.
    pub async fn rename_layer(&mut self, name: &str, new_name: &str) -> Result<(), TreeError> {
        let id = self
            .name_to_id(name)
            .ok_or_else(|| TreeError::NotFound(format!("layer \"{}\"", name)))?;
        self.writable(&id)?;
        if name == new_name {
            return Ok(());
        }
        if self.has_layer_name(new_name) {
            return Err(TreeError::NameConflict(new_name.to_string()));
        }
        validate_name(new_name)?;

        self.set_name(&id, name, new_name);
        if let Err(err) = self.persist(&id).await {
            self.set_name(&id, new_name, name);
            return Err(err);
        }
        tracing::debug!(from = %name, to = %new_name, "renamed layer");
        Ok(())
    }

    fn set_name(&mut self, id: &LayerId, old: &str, new: &str) {
        if let Some(layer) = self.layers.get_mut(id) {
            layer.name = new.to_string();
        }
        self.names.remove(old);
        self.names.insert(new.to_string(), *id);
    }

    /// Removes a layer from the registry and the store.
    pub async fn remove_layer(&mut self, layer: &Layer) -> Result<bool, TreeError> {
        self.remove_layer_by_id(&layer.id).await
    }

    pub async fn remove_layer_by_id(&mut self, id: &LayerId) -> Result<bool, TreeError> {
        if !self.has_layer_id(id) {
            return Ok(false);
        }
        self.writable(id)?;
        self.store.delete(&id.to_string()).await?;
        self.unregister(id);
        Ok(true)
    }

    pub async fn remove_layer_by_name(&mut self, name: &str) -> Result<bool, TreeError> {
        match self.name_to_id(name) {
            Some(id) => self.remove_layer_by_id(&id).await,
            None => Ok(false),
        }
    }

    fn unregister(&mut self, id: &LayerId) {
        if let Some(layer) = self.layers.remove(id) {
            self.names.remove(&layer.name);
        }
    }

    fn writable(&mut self, id: &LayerId) -> Result<&mut Layer, TreeError> {
        let layer = self
            .layers
            .get_mut(id)
            .ok_or_else(|| TreeError::NotFound(format!("layer {}", id)))?;
        if layer.locked {
            return Err(TreeError::ProtectedName(layer.name.clone()));
        }
        Ok(layer)
    }
}

/// A layer name is exactly one path segment.
fn validate_name(name: &str) -> Result<(), TreeError> {
    if name.trim().is_empty() {
        return Err(TreeError::invalid_path(name, "layer name must not be empty"));
    }
    if name.contains('/') {
        return Err(TreeError::invalid_path(name, "layer name must not contain '/'"));
    }
    Ok(())
}
