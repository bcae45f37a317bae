//! # Context Tree CLI (`ctree`)
//!
//! Inspect and edit a file-backed context tree.
//!
//! ## Usage
//!
//! ```bash
//! ctree --config ./config/ctree.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ctree init` | Create the store files |
//! | `ctree paths` | List leaf paths |
//! | `ctree tree [--index]` | Print the tree as JSON |
//! | `ctree insert <path>` | Create a path, auto-creating layers |
//! | `ctree remove <path>` | Remove a node, promoting its children |
//! | `ctree move <from> <to>` | Move a layer (or a subtree with `--recursive`) |
//! | `ctree copy <from> <to>` | Copy a layer (or a subtree with `--recursive`) |
//! | `ctree clear` | Reset to a bare root |
//! | `ctree resolve <url>` | Navigate to a URL and print its context array |
//! | `ctree layer ...` | Manage layers |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use context_tree::commands::{self, LayerArgs};
use context_tree::config::{self, DEFAULT_CONFIG_PATH};
use context_tree::telemetry;

/// Context Tree CLI.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Defaults apply when the file does not exist.
#[derive(Parser)]
#[command(
    name = "ctree",
    about = "Context Tree: a hierarchical index of reusable layers",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store files. Idempotent.
    Init,

    /// List leaf paths.
    Paths,

    /// Print the tree as JSON.
    Tree {
        /// Print the identity-only form that is persisted.
        #[arg(long)]
        index: bool,
    },

    /// Create every node along a path.
    Insert {
        path: String,

        /// Fail instead of creating missing layers.
        #[arg(long)]
        no_create: bool,
    },

    /// Remove a node. Its children move up unless `--recursive` is given.
    Remove {
        path: String,

        /// Remove the whole subtree.
        #[arg(long, short)]
        recursive: bool,
    },

    /// Move a layer under another path.
    Move {
        from: String,
        to: String,

        /// Move the whole subtree instead of only the layer.
        #[arg(long, short)]
        recursive: bool,
    },

    /// Copy a layer under another path.
    Copy {
        from: String,
        to: String,

        /// Copy the whole subtree instead of only the layer.
        #[arg(long, short)]
        recursive: bool,
    },

    /// Drop every node below the root.
    Clear,

    /// Navigate to a context URL and print its context array.
    Resolve {
        /// `[session@]workspace://path` or a plain path.
        url: String,
    },

    /// Manage layers.
    Layer {
        #[command(subcommand)]
        action: LayerAction,
    },
}

#[derive(Subcommand)]
enum LayerAction {
    /// List all layers.
    List,
    /// Print one layer as JSON.
    Show { name: String },
    /// Create a layer.
    Create {
        name: String,
        #[command(flatten)]
        attrs: LayerAttrs,
    },
    /// Change a layer's attributes.
    Update {
        name: String,
        #[command(flatten)]
        attrs: LayerAttrs,
    },
    /// Rename a layer everywhere it appears.
    Rename { name: String, new_name: String },
    /// Remove a layer that is no longer in the tree.
    Remove { name: String },
}

#[derive(clap::Args)]
struct LayerAttrs {
    /// One of context, label, canvas, workspace.
    #[arg(long = "type")]
    layer_type: Option<String>,
    #[arg(long)]
    label: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    color: Option<String>,
}

impl From<LayerAttrs> for LayerArgs {
    fn from(attrs: LayerAttrs) -> Self {
        LayerArgs {
            layer_type: attrs.layer_type,
            label: attrs.label,
            description: attrs.description,
            color: attrs.color,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_or_default(&cli.config)?;
    telemetry::init(&cfg.logging);

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Paths => commands::run_paths(&cfg).await?,
        Commands::Tree { index } => commands::run_tree(&cfg, index).await?,
        Commands::Insert { path, no_create } => {
            commands::run_insert(&cfg, &path, no_create).await?;
        }
        Commands::Remove { path, recursive } => {
            commands::run_remove(&cfg, &path, recursive).await?;
        }
        Commands::Move {
            from,
            to,
            recursive,
        } => {
            commands::run_move(&cfg, &from, &to, recursive).await?;
        }
        Commands::Copy {
            from,
            to,
            recursive,
        } => {
            commands::run_copy(&cfg, &from, &to, recursive).await?;
        }
        Commands::Clear => commands::run_clear(&cfg).await?,
        Commands::Resolve { url } => commands::run_resolve(&cfg, &url).await?,
        Commands::Layer { action } => match action {
            LayerAction::List => commands::run_layer_list(&cfg).await?,
            LayerAction::Show { name } => commands::run_layer_show(&cfg, &name).await?,
            LayerAction::Create { name, attrs } => {
                commands::run_layer_create(&cfg, &name, &LayerArgs::from(attrs)).await?;
            }
            LayerAction::Update { name, attrs } => {
                commands::run_layer_update(&cfg, &name, &LayerArgs::from(attrs)).await?;
            }
            LayerAction::Rename { name, new_name } => {
                commands::run_layer_rename(&cfg, &name, &new_name).await?;
            }
            LayerAction::Remove { name } => commands::run_layer_remove(&cfg, &name).await?,
        },
    }

    Ok(())
}
