//! Core data models used throughout the context tree.
//!
//! A [`Layer`] is the named, reusable tag that every tree node binds to.
//! The same layer may appear at many places in the tree; its identity is
//! the [`LayerId`], its path segment is the name.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the root layer.
pub const ROOT_LAYER_NAME: &str = "/";

/// Name of the built-in trash layer.
pub const TRASH_LAYER_NAME: &str = ".trash";

/// Stable identifier of a layer. Never reused once assigned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(Uuid);

impl LayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Layer kinds. `Universe` and `System` are reserved for built-ins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Universe,
    System,
    #[default]
    Context,
    Label,
    Canvas,
    Workspace,
}

impl LayerType {
    pub fn is_builtin(&self) -> bool {
        matches!(self, LayerType::Universe | LayerType::System)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LayerType::Universe => "universe",
            LayerType::System => "system",
            LayerType::Context => "context",
            LayerType::Label => "label",
            LayerType::Canvas => "canvas",
            LayerType::Workspace => "workspace",
        }
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "universe" => Ok(LayerType::Universe),
            "system" => Ok(LayerType::System),
            "context" => Ok(LayerType::Context),
            "label" => Ok(LayerType::Label),
            "canvas" => Ok(LayerType::Canvas),
            "workspace" => Ok(LayerType::Workspace),
            other => Err(format!("unknown layer type: '{}'", other)),
        }
    }
}

/// A named, typed tag record.
///
/// `feature_bitmaps` and `filter_bitmaps` are opaque ids owned by the
/// document store; the tree never looks inside them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    #[serde(rename = "type", default)]
    pub layer_type: LayerType,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub feature_bitmaps: Vec<String>,
    #[serde(default)]
    pub filter_bitmaps: Vec<String>,
}

impl Layer {
    fn builtin(id: LayerId, name: &str, layer_type: LayerType, label: &str, description: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            layer_type,
            label: label.to_string(),
            description: description.to_string(),
            color: None,
            locked: true,
            feature_bitmaps: Vec::new(),
            filter_bitmaps: Vec::new(),
        }
    }

    pub(crate) fn apply(&mut self, patch: LayerPatch) {
        if let Some(layer_type) = patch.layer_type {
            self.layer_type = layer_type;
        }
        if let Some(label) = patch.label {
            self.label = label;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(color) = patch.color {
            self.color = Some(color);
        }
        if let Some(features) = patch.feature_bitmaps {
            self.feature_bitmaps = features;
        }
        if let Some(filters) = patch.filter_bitmaps {
            self.filter_bitmaps = filters;
        }
    }
}

/// Parameters for [`LayerIndex::create_layer`](crate::layer_index::LayerIndex::create_layer).
#[derive(Clone, Debug, Default)]
pub struct LayerOptions {
    pub name: String,
    pub id: Option<LayerId>,
    pub layer_type: LayerType,
    pub label: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub feature_bitmaps: Vec<String>,
    pub filter_bitmaps: Vec<String>,
}

impl LayerOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, layer_type: LayerType) -> Self {
        self.layer_type = layer_type;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub(crate) fn build(self) -> Layer {
        let label = self.label.unwrap_or_else(|| self.name.clone());
        Layer {
            id: self.id.unwrap_or_default(),
            name: self.name,
            layer_type: self.layer_type,
            label,
            description: self.description.unwrap_or_default(),
            color: self.color,
            locked: false,
            feature_bitmaps: self.feature_bitmaps,
            filter_bitmaps: self.filter_bitmaps,
        }
    }
}

impl From<&str> for LayerOptions {
    fn from(name: &str) -> Self {
        LayerOptions::new(name)
    }
}

/// Partial update for an existing layer. `None` fields are left as they are.
#[derive(Clone, Debug, Default)]
pub struct LayerPatch {
    pub layer_type: Option<LayerType>,
    pub label: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub feature_bitmaps: Option<Vec<String>>,
    pub filter_bitmaps: Option<Vec<String>>,
}

impl LayerPatch {
    pub fn is_empty(&self) -> bool {
        self.layer_type.is_none()
            && self.label.is_none()
            && self.description.is_none()
            && self.color.is_none()
            && self.feature_bitmaps.is_none()
            && self.filter_bitmaps.is_none()
    }
}

/// Well-known id of the root layer.
pub const ROOT_LAYER_ID: LayerId = LayerId::from_u128(0);

/// Well-known id of the trash layer.
pub const TRASH_LAYER_ID: LayerId = LayerId::from_u128(1);

/// The protected layers seeded into every index.
pub fn builtin_layers() -> Vec<Layer> {
    vec![
        Layer::builtin(
            ROOT_LAYER_ID,
            ROOT_LAYER_NAME,
            LayerType::Universe,
            "Universe",
            "Root of the context tree",
        ),
        Layer::builtin(
            TRASH_LAYER_ID,
            TRASH_LAYER_NAME,
            LayerType::System,
            "Trash",
            "Holding area for discarded contexts",
        ),
    ]
}

/// Returns true if `name` belongs to a built-in layer.
pub fn is_builtin_name(name: &str) -> bool {
    name == ROOT_LAYER_NAME || name == TRASH_LAYER_NAME
}

/// Returns true if `id` belongs to a built-in layer.
pub fn is_builtin_id(id: &LayerId) -> bool {
    *id == ROOT_LAYER_ID || *id == TRASH_LAYER_ID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_serializes_camel_case() {
        let layer = LayerOptions::new("work").with_color("#ff0000").build();
        let json = serde_json::to_value(&layer).unwrap();
        assert_eq!(json["name"], "work");
        assert_eq!(json["type"], "context");
        assert_eq!(json["label"], "work");
        assert!(json.get("featureBitmaps").is_some());
        assert!(json.get("filterBitmaps").is_some());
    }

    #[test]
    fn test_layer_deserializes_with_defaults() {
        let id = LayerId::new();
        let json = serde_json::json!({ "id": id.to_string(), "name": "notes" });
        let layer: Layer = serde_json::from_value(json).unwrap();
        assert_eq!(layer.id, id);
        assert_eq!(layer.layer_type, LayerType::Context);
        assert!(!layer.locked);
        assert!(layer.feature_bitmaps.is_empty());
    }

    #[test]
    fn test_builtins_are_locked() {
        for layer in builtin_layers() {
            assert!(layer.locked);
            assert!(layer.layer_type.is_builtin());
            assert!(is_builtin_name(&layer.name));
            assert!(is_builtin_id(&layer.id));
        }
    }

    #[test]
    fn test_patch_leaves_unset_fields() {
        let mut layer = LayerOptions::new("work").with_description("day job").build();
        layer.apply(LayerPatch {
            color: Some("blue".to_string()),
            ..LayerPatch::default()
        });
        assert_eq!(layer.color.as_deref(), Some("blue"));
        assert_eq!(layer.description, "day job");
        assert_eq!(layer.label, "work");
    }

    #[test]
    fn test_layer_type_parse() {
        assert_eq!("Label".parse::<LayerType>().unwrap(), LayerType::Label);
        assert!("folder".parse::<LayerType>().is_err());
    }
}
