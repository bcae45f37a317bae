//! A user-facing context: a current URL bound to a path in the tree.
//!
//! Setting the URL inserts its path into the [`Tree`] and recomputes the
//! context array (the layer ids along the path) together with the bitmap
//! ids that scope document queries:
//!
//! - `context`: one `context/<layer id>` entry per layer on the path
//! - `feature`: union of the layers' feature bitmaps, first occurrence wins
//! - `filter`: union of the layers' filter bitmaps, first occurrence wins
//!
//! A context may be locked against URL changes and may be constrained to a
//! base URL; both are checked before the tree is touched.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::TreeError;
use crate::models::LayerId;
use crate::tree::Tree;
use crate::url::Url;

/// Prefix of the per-layer context bitmap ids.
pub const CONTEXT_BITMAP_PREFIX: &str = "context/";

/// Bitmap ids derived from the current path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BitmapArrays {
    pub context: Vec<String>,
    pub feature: Vec<String>,
    pub filter: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct Context {
    id: Uuid,
    name: String,
    url: Option<Url>,
    base_url: Option<Url>,
    locked: bool,
    context_array: Vec<LayerId>,
    bitmaps: BitmapArrays,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Context {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            url: None,
            base_url: None,
            locked: false,
            context_array: Vec::new(),
            bitmaps: BitmapArrays::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Layer ids along the current path, outermost first.
    pub fn context_array(&self) -> &[LayerId] {
        &self.context_array
    }

    pub fn bitmap_arrays(&self) -> &BitmapArrays {
        &self.bitmaps
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Navigates to `raw`, creating its path in `tree` as needed.
    ///
    /// Fails with [`TreeError::ContextLocked`] while locked and with
    /// [`TreeError::OutsideBaseUrl`] if the path leaves the base URL. If the
    /// path cannot be created because layer auto-creation is disabled the
    /// result is [`TreeError::NotFound`]. On any error the context keeps
    /// its previous URL.
    pub async fn set_url(&mut self, tree: &mut Tree, raw: &str) -> Result<&Url, TreeError> {
        if self.locked {
            return Err(TreeError::ContextLocked);
        }
        let url = Url::parse(raw)?;
        if let Some(base) = &self.base_url {
            if !url.is_within(base) {
                return Err(TreeError::OutsideBaseUrl {
                    url: url.to_string(),
                    base: base.to_string(),
                });
            }
        }

        if !tree.insert_path(url.path()).await? {
            return Err(TreeError::NotFound(format!("path \"{}\"", url.path())));
        }
        let context_array = tree
            .context_array(url.path())
            .ok_or_else(|| TreeError::NotFound(format!("path \"{}\"", url.path())))?;

        tracing::debug!(context = %self.id, url = %url, "context url changed");
        self.bitmaps = collect_bitmaps(tree, &context_array);
        self.context_array = context_array;
        self.updated_at = Utc::now();
        Ok(self.url.insert(url))
    }

    /// Constrains future URLs to `raw` and its descendants. `/` removes
    /// the constraint. The current URL must already lie within the new base.
    pub fn set_base_url(&mut self, raw: &str) -> Result<(), TreeError> {
        if self.locked {
            return Err(TreeError::ContextLocked);
        }
        let base = Url::parse(raw)?;
        if base.is_root() {
            self.base_url = None;
            self.updated_at = Utc::now();
            return Ok(());
        }
        if let Some(current) = &self.url {
            if !current.is_within(&base) {
                return Err(TreeError::OutsideBaseUrl {
                    url: current.to_string(),
                    base: base.to_string(),
                });
            }
        }
        tracing::debug!(context = %self.id, base = %base, "context base url changed");
        self.base_url = Some(base);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn lock(&mut self) {
        self.locked = true;
        self.updated_at = Utc::now();
    }

    pub fn unlock(&mut self) {
        self.locked = false;
        self.updated_at = Utc::now();
    }
}

fn collect_bitmaps(tree: &Tree, context_array: &[LayerId]) -> BitmapArrays {
    let mut bitmaps = BitmapArrays {
        context: context_array
            .iter()
            .map(|id| format!("{}{}", CONTEXT_BITMAP_PREFIX, id))
            .collect(),
        ..BitmapArrays::default()
    };
    for layer in context_array
        .iter()
        .filter_map(|id| tree.layers().get_layer_by_id(id))
    {
        push_unique(&mut bitmaps.feature, &layer.feature_bitmaps);
        push_unique(&mut bitmaps.filter, &layer.filter_bitmaps);
    }
    bitmaps
}

fn push_unique(out: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LayerPatch;
    use crate::store::InMemoryStore;
    use crate::tree::TreeOptions;
    use std::sync::Arc;

    async fn open_tree(options: TreeOptions) -> Tree {
        Tree::open(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryStore::new()),
            options,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_set_url_builds_context_array() {
        let mut tree = open_tree(TreeOptions::default()).await;
        let mut ctx = Context::new("default");

        let url = ctx
            .set_url(&mut tree, "universe://Work/Acme")
            .await
            .unwrap()
            .clone();
        assert_eq!(url.path(), "/work/acme");
        assert!(tree.path_exists("/work/acme"));

        let work = tree.layers().name_to_id("work").unwrap();
        let acme = tree.layers().name_to_id("acme").unwrap();
        assert_eq!(ctx.context_array(), &[work, acme]);
        assert_eq!(
            ctx.bitmap_arrays().context,
            vec![format!("context/{}", work), format!("context/{}", acme)]
        );
        assert!(ctx.updated_at() >= ctx.created_at());
    }

    #[tokio::test]
    async fn test_bitmaps_are_merged_in_order() {
        let mut tree = open_tree(TreeOptions::default()).await;
        tree.insert_path("work/acme").await.unwrap();
        tree.layers_mut()
            .update_layer(
                "work",
                LayerPatch {
                    feature_bitmaps: Some(vec!["data/abstraction/note".into()]),
                    filter_bitmaps: Some(vec!["filter/recent".into()]),
                    ..LayerPatch::default()
                },
            )
            .await
            .unwrap();
        tree.layers_mut()
            .update_layer(
                "acme",
                LayerPatch {
                    feature_bitmaps: Some(vec![
                        "data/abstraction/tab".into(),
                        "data/abstraction/note".into(),
                    ]),
                    ..LayerPatch::default()
                },
            )
            .await
            .unwrap();

        let mut ctx = Context::new("default");
        ctx.set_url(&mut tree, "/work/acme").await.unwrap();
        assert_eq!(
            ctx.bitmap_arrays().feature,
            vec!["data/abstraction/note", "data/abstraction/tab"]
        );
        assert_eq!(ctx.bitmap_arrays().filter, vec!["filter/recent"]);
    }

    #[tokio::test]
    async fn test_locked_context_rejects_changes() {
        let mut tree = open_tree(TreeOptions::default()).await;
        let mut ctx = Context::new("default");
        ctx.set_url(&mut tree, "/work").await.unwrap();
        ctx.lock();

        assert!(matches!(
            ctx.set_url(&mut tree, "/home").await,
            Err(TreeError::ContextLocked)
        ));
        assert!(matches!(ctx.set_base_url("/work"), Err(TreeError::ContextLocked)));
        assert!(!tree.path_exists("/home"));
        assert_eq!(ctx.url().unwrap().path(), "/work");

        ctx.unlock();
        ctx.set_url(&mut tree, "/home").await.unwrap();
        assert_eq!(ctx.url().unwrap().path(), "/home");
    }

    #[tokio::test]
    async fn test_base_url_constraint() {
        let mut tree = open_tree(TreeOptions::default()).await;
        let mut ctx = Context::new("default");
        ctx.set_url(&mut tree, "/work/acme").await.unwrap();

        assert!(matches!(
            ctx.set_base_url("/home"),
            Err(TreeError::OutsideBaseUrl { .. })
        ));
        ctx.set_base_url("/work").unwrap();
        assert_eq!(ctx.base_url().unwrap().path(), "/work");

        assert!(matches!(
            ctx.set_url(&mut tree, "/workshop").await,
            Err(TreeError::OutsideBaseUrl { .. })
        ));
        assert!(!tree.layers().has_layer_name("workshop"));
        ctx.set_url(&mut tree, "/work/devops").await.unwrap();

        ctx.set_base_url("/").unwrap();
        assert!(ctx.base_url().is_none());
        ctx.set_url(&mut tree, "/home").await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_layer_without_autocreate() {
        let mut tree = open_tree(TreeOptions {
            auto_create_layers: false,
            ..TreeOptions::default()
        })
        .await;
        let mut ctx = Context::new("default");
        assert!(matches!(
            ctx.set_url(&mut tree, "/nowhere").await,
            Err(TreeError::NotFound(_))
        ));
        assert!(ctx.url().is_none());
        assert!(ctx.context_array().is_empty());
    }

    #[tokio::test]
    async fn test_root_url_has_empty_context_array() {
        let mut tree = open_tree(TreeOptions::default()).await;
        let mut ctx = Context::new("default");
        let url = ctx.set_url(&mut tree, "universe://").await.unwrap();
        assert!(url.is_root());
        assert!(ctx.context_array().is_empty());
        assert!(ctx.bitmap_arrays().context.is_empty());
    }
}
