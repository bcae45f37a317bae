//! Command runners behind the `ctree` binary.
//!
//! Each `run_*` function opens the file-backed tree described by the
//! config, performs one operation and prints its result to stdout. Raw
//! paths from the command line are validated and normalized with
//! [`Url`] before they reach the tree.

use anyhow::{bail, Context as _, Result};

use crate::config::Config;
use crate::context::Context;
use crate::models::{is_builtin_name, LayerOptions, LayerPatch, LayerType};
use crate::tree::Tree;
use crate::url::Url;

/// Attribute flags shared by `layer create` and `layer update`.
#[derive(Debug, Clone, Default)]
pub struct LayerArgs {
    pub layer_type: Option<String>,
    pub label: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

impl LayerArgs {
    fn parsed_type(&self) -> Result<Option<LayerType>> {
        self.layer_type
            .as_deref()
            .map(|t| t.parse::<LayerType>().map_err(anyhow::Error::msg))
            .transpose()
    }
}

async fn open(config: &Config) -> Result<Tree> {
    Tree::from_config(config).await.with_context(|| {
        format!(
            "Failed to open context tree ({}, {})",
            config.storage.layers_path.display(),
            config.storage.tree_path.display()
        )
    })
}

fn normalize(raw: &str) -> Result<String> {
    Ok(Url::parse(raw)?.path().to_string())
}

/// Layer names go through the same sanitizing as path segments, so a name
/// typed on the command line matches the segment `insert` would create.
fn normalize_name(raw: &str) -> Result<String> {
    Url::validate(raw)?;
    if is_builtin_name(raw.trim()) {
        return Ok(raw.trim().to_string());
    }
    let normalized = Url::normalize_path(raw);
    let name = normalized.trim_start_matches('/');
    if name.is_empty() || name.contains('/') {
        bail!("invalid layer name \"{}\": expected a single path segment", raw);
    }
    Ok(name.to_string())
}

pub async fn run_init(config: &Config) -> Result<()> {
    let tree = open(config).await?;
    tree.save().await?;
    println!(
        "Context tree initialized at {} ({} layers, {} nodes).",
        config.storage.tree_path.display(),
        tree.layers().len(),
        tree.len()
    );
    Ok(())
}

pub async fn run_paths(config: &Config) -> Result<()> {
    let tree = open(config).await?;
    for path in tree.paths() {
        println!("{}", path);
    }
    Ok(())
}

pub async fn run_tree(config: &Config, index: bool) -> Result<()> {
    let tree = open(config).await?;
    let json = if index {
        serde_json::to_string_pretty(&tree.index_tree())?
    } else {
        serde_json::to_string_pretty(&tree.to_json())?
    };
    println!("{}", json);
    Ok(())
}

pub async fn run_insert(config: &Config, path: &str, no_create: bool) -> Result<()> {
    let path = normalize(path)?;
    let mut tree = open(config).await?;
    let auto_create = !no_create && tree.options().auto_create_layers;
    if !tree.insert(&path, None, auto_create).await? {
        bail!(
            "path not inserted: {} names a missing layer and auto-create is disabled",
            path
        );
    }
    println!("Inserted {}", path);
    Ok(())
}

pub async fn run_remove(config: &Config, path: &str, recursive: bool) -> Result<()> {
    let path = normalize(path)?;
    let mut tree = open(config).await?;
    if !tree.remove(&path, recursive).await? {
        bail!("path not found: {}", path);
    }
    println!("Removed {}", path);
    Ok(())
}

pub async fn run_move(config: &Config, from: &str, to: &str, recursive: bool) -> Result<()> {
    let (from, to) = (normalize(from)?, normalize(to)?);
    let mut tree = open(config).await?;
    if !tree.move_node(&from, &to, recursive).await? {
        bail!("path not found: {}", from);
    }
    println!("Moved {} -> {}", from, to);
    Ok(())
}

pub async fn run_copy(config: &Config, from: &str, to: &str, recursive: bool) -> Result<()> {
    let (from, to) = (normalize(from)?, normalize(to)?);
    let mut tree = open(config).await?;
    if !tree.copy_node(&from, &to, recursive).await? {
        bail!("path not found: {}", from);
    }
    println!("Copied {} -> {}", from, to);
    Ok(())
}

pub async fn run_clear(config: &Config) -> Result<()> {
    let mut tree = open(config).await?;
    tree.clear().await?;
    println!("Context tree cleared.");
    Ok(())
}

/// Navigates a throwaway context to `url` and prints what it resolves to.
pub async fn run_resolve(config: &Config, url: &str) -> Result<()> {
    let mut tree = open(config).await?;
    let mut context = Context::new("cli");
    let resolved = context.set_url(&mut tree, url).await?.clone();

    println!("URL:        {}", resolved);
    println!("Path:       {}", resolved.path());
    println!("Workspace:  {}", resolved.workspace());
    if let Some(session) = resolved.session() {
        println!("Session:    {}", session);
    }
    println!("Context:");
    for id in context.context_array() {
        let name = tree.layers().id_to_name(id).unwrap_or("?");
        println!("  {}  {}", id, name);
    }
    println!(
        "Bitmaps:    {}",
        serde_json::to_string(context.bitmap_arrays())?
    );
    Ok(())
}

pub async fn run_layer_list(config: &Config) -> Result<()> {
    let tree = open(config).await?;
    println!("{:<24} {:<10} {:<38} LABEL", "NAME", "TYPE", "ID");
    for layer in tree.layers().list() {
        println!(
            "{:<24} {:<10} {:<38} {}",
            layer.name, layer.layer_type, layer.id, layer.label
        );
    }
    Ok(())
}

pub async fn run_layer_show(config: &Config, name: &str) -> Result<()> {
    let name = normalize_name(name)?;
    let tree = open(config).await?;
    let Some(layer) = tree.layers().get_layer_by_name(&name) else {
        bail!("layer not found: {}", name);
    };
    println!("{}", serde_json::to_string_pretty(layer)?);
    Ok(())
}

pub async fn run_layer_create(config: &Config, name: &str, args: &LayerArgs) -> Result<()> {
    let name = normalize_name(name)?;
    let mut tree = open(config).await?;
    let mut options = LayerOptions::new(&name);
    if let Some(layer_type) = args.parsed_type()? {
        options = options.with_type(layer_type);
    }
    options.label = args.label.clone();
    options.description = args.description.clone();
    options.color = args.color.clone();

    match tree.layers_mut().create_layer(options).await? {
        Some(layer) => println!("Created layer {} ({})", layer.name, layer.id),
        None => bail!("layer already exists: {}", name),
    }
    Ok(())
}

pub async fn run_layer_update(config: &Config, name: &str, args: &LayerArgs) -> Result<()> {
    let patch = LayerPatch {
        layer_type: args.parsed_type()?,
        label: args.label.clone(),
        description: args.description.clone(),
        color: args.color.clone(),
        ..LayerPatch::default()
    };
    if patch.is_empty() {
        bail!("nothing to update: pass at least one of --type, --label, --description, --color");
    }
    let name = normalize_name(name)?;
    let mut tree = open(config).await?;
    if !tree.layers_mut().update_layer(&name, patch).await? {
        bail!("layer not found: {}", name);
    }
    println!("Updated layer {}", name);
    Ok(())
}

pub async fn run_layer_rename(config: &Config, name: &str, new_name: &str) -> Result<()> {
    let name = normalize_name(name)?;
    let new_name = normalize_name(new_name)?;
    let mut tree = open(config).await?;
    tree.rename_layer(&name, &new_name).await?;
    println!("Renamed layer {} -> {}", name, new_name);
    Ok(())
}

pub async fn run_layer_remove(config: &Config, name: &str) -> Result<()> {
    let name = normalize_name(name)?;
    let mut tree = open(config).await?;
    let Some(id) = tree.layers().name_to_id(&name) else {
        bail!("layer not found: {}", name);
    };
    if tree.layer_in_use(&id) {
        bail!("layer {} is still part of the tree; remove its nodes first", name);
    }
    tree.layers_mut().remove_layer_by_id(&id).await?;
    println!("Removed layer {}", name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("universe://Work/Acme").unwrap(), "/work/acme");
        assert_eq!(normalize("/").unwrap(), "/");
        assert!(normalize("bad$path").is_err());
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("ACME").unwrap(), "acme");
        assert_eq!(normalize_name("Dev Ops").unwrap(), "dev_ops");
        assert_eq!(normalize_name(".hidden").unwrap(), "hidden");
        assert_eq!(normalize_name(".trash").unwrap(), ".trash");
        assert!(normalize_name("work/acme").is_err());
        assert_eq!(normalize_name("/").unwrap(), "/");
        assert!(normalize_name("//").is_err());
        assert!(normalize_name("").is_err());
        assert!(normalize_name("bad$name").is_err());
    }

    #[test]
    fn test_layer_args_type() {
        let args = LayerArgs {
            layer_type: Some("label".to_string()),
            ..LayerArgs::default()
        };
        assert_eq!(args.parsed_type().unwrap(), Some(LayerType::Label));
        let bad = LayerArgs {
            layer_type: Some("folder".to_string()),
            ..LayerArgs::default()
        };
        assert!(bad.parsed_type().is_err());
        assert_eq!(LayerArgs::default().parsed_type().unwrap(), None);
    }
}
