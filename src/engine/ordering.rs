//! engine::ordering
//!
//! Per-collection display order, kept in `_<collection>/collection.yml`.
//!
//! # Design
//!
//! Git lists a directory alphabetically; the manifest's `order` list is the
//! order readers see. Every mutator is a read-modify-write of that one file
//! through [`FileService`], presenting the hash it read, so two concurrent
//! editors of the same manifest conflict instead of overwriting each other.
//! No mutator takes the repository lock; callers that pair a content change
//! with an index change take it themselves (see
//! [`CollectionService`](super::collections::CollectionService)).
//!
//! # Insertion rule
//!
//! Items are paths relative to the collection. An item's subfolder is its
//! first segment (`2023/recap.md` is in `2023`).
//!
//! - explicit index: insert there (clamped to the end)
//! - top-level item: append
//! - subfolder item whose subfolder already appears: insert after the last
//!   item of that subfolder, keeping the group contiguous
//! - subfolder item of a new subfolder: insert at the front

use tracing::debug;

use super::files::FileService;
use super::manifest::{CollectionManifest, OrderedIndex};
use super::EngineError;
use crate::core::paths::SiteLayout;
use crate::core::types::{Oid, RepoPath, TypeError};

/// First segment of a nested item, if it has one.
pub fn subfolder_of(item: &str) -> Option<&str> {
    item.split_once('/').map(|(sub, _)| sub)
}

fn in_subfolder(item: &str, sub: &str) -> bool {
    subfolder_of(item) == Some(sub)
}

/// Position at which `item` is inserted into `order`.
pub fn insertion_index(order: &[String], item: &str, index: Option<usize>) -> usize {
    if let Some(index) = index {
        return index.min(order.len());
    }
    match subfolder_of(item) {
        None => order.len(),
        Some(sub) => order
            .iter()
            .rposition(|existing| in_subfolder(existing, sub))
            .map(|last| last + 1)
            .unwrap_or(0),
    }
}

/// Ordered manifests of a site's collections.
#[derive(Debug, Clone)]
pub struct OrderService {
    files: FileService,
    layout: SiteLayout,
}

impl OrderService {
    pub fn new(files: FileService, layout: SiteLayout) -> Self {
        Self { files, layout }
    }

    /// Write a fresh manifest for `collection`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Conflict`] if the manifest already exists
    pub async fn create(&self, collection: &str, order: Vec<String>) -> Result<Oid, EngineError> {
        for item in &order {
            RepoPath::new(item.as_str())?;
        }
        let path = self.layout.manifest_path(collection)?;
        let yaml = CollectionManifest::new(collection, order).to_yaml()?;
        self.files.create(&path, yaml.as_bytes()).await
    }

    /// Read the order of `collection`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if the manifest is missing or malformed
    pub async fn read(&self, collection: &str) -> Result<OrderedIndex, EngineError> {
        let (manifest, _) = self.load(collection).await?;
        manifest
            .index(collection)
            .ok_or_else(|| EngineError::NotFound(collection.to_string()))
    }

    /// Insert `item`; see the module docs for where it lands.
    pub async fn add_item(
        &self,
        collection: &str,
        item: &str,
        index: Option<usize>,
    ) -> Result<(), EngineError> {
        RepoPath::new(item)?;
        self.edit(collection, |order| {
            let at = insertion_index(order, item, index);
            order.insert(at, item.to_string());
            true
        })
        .await
    }

    /// Remove the first occurrence of `item`. Absent items write nothing.
    pub async fn delete_item(&self, collection: &str, item: &str) -> Result<(), EngineError> {
        self.edit(collection, |order| match order.iter().position(|i| i == item) {
            Some(at) => {
                order.remove(at);
                true
            }
            None => false,
        })
        .await
    }

    /// Replace `old` with `new` in place.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if `old` is not in the order
    pub async fn update_item(&self, collection: &str, old: &str, new: &str) -> Result<(), EngineError> {
        RepoPath::new(new)?;
        let mut found = false;
        self.edit(collection, |order| match order.iter().position(|i| i == old) {
            Some(at) => {
                order[at] = new.to_string();
                found = true;
                true
            }
            None => false,
        })
        .await?;
        if found {
            Ok(())
        } else {
            Err(EngineError::NotFound(format!("{} in order of '{}'", old, collection)))
        }
    }

    /// Remove every item under `sub/`.
    pub async fn delete_subfolder(&self, collection: &str, sub: &str) -> Result<(), EngineError> {
        self.edit(collection, |order| {
            let before = order.len();
            order.retain(|item| !in_subfolder(item, sub));
            order.len() != before
        })
        .await
    }

    /// Move every item under `old/` to `new/`, keeping positions.
    pub async fn rename_subfolder(&self, collection: &str, old: &str, new: &str) -> Result<(), EngineError> {
        let target = RepoPath::new(new)?;
        if target.depth() != 1 {
            return Err(EngineError::InvalidPath(TypeError::InvalidPath(format!(
                "subfolder must be a single segment: {new:?}"
            ))));
        }
        self.edit(collection, |order| {
            let mut changed = false;
            for item in order.iter_mut() {
                if in_subfolder(item, old) {
                    let rest = &item[old.len() + 1..];
                    *item = format!("{}/{}", new, rest);
                    changed = true;
                }
            }
            changed
        })
        .await
    }

    async fn load(&self, collection: &str) -> Result<(CollectionManifest, Oid), EngineError> {
        let path = self.layout.manifest_path(collection)?;
        let file = self.files.read(&path).await?;
        let manifest = CollectionManifest::parse(collection, &file.content)?;
        Ok((manifest, file.oid))
    }

    /// Read the manifest, let `change` edit the order, and write it back
    /// only if `change` reports an edit.
    async fn edit<F>(&self, collection: &str, change: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut Vec<String>) -> bool,
    {
        let (mut manifest, oid) = self.load(collection).await?;
        let order = manifest
            .order_mut(collection)
            .ok_or_else(|| EngineError::NotFound(collection.to_string()))?;
        if !change(order) {
            debug!(collection, "order unchanged, nothing to write");
            return Ok(());
        }
        let path = self.layout.manifest_path(collection)?;
        let yaml = manifest.to_yaml()?;
        self.files.update(&path, yaml.as_bytes(), Some(&oid)).await?;
        Ok(())
    }
}
