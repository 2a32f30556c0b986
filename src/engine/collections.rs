//! engine::collections
//!
//! Collection members whose content and order change together.
//!
//! Creating, deleting or renaming a collection member touches two files: the
//! member itself and the collection manifest. Each step is its own commit, so
//! the pair runs under the repository lock; other lock holders never observe
//! the content change without the index change.

use tracing::warn;

use super::directories::Locker;
use super::files::FileService;
use super::ordering::OrderService;
use super::EngineError;
use crate::core::paths::{SiteLayout, KEEP_FILE};
use crate::core::types::Oid;

/// Paired content and order edits for a site's collections.
#[derive(Debug, Clone)]
pub struct CollectionService {
    files: FileService,
    orders: OrderService,
    layout: SiteLayout,
    locker: Locker,
}

impl CollectionService {
    pub fn new(files: FileService, layout: SiteLayout, locker: Locker) -> Self {
        Self {
            orders: OrderService::new(files.clone(), layout.clone()),
            files,
            layout,
            locker,
        }
    }

    pub fn orders(&self) -> &OrderService {
        &self.orders
    }

    /// Create a member and add it to the order.
    pub async fn create_item(
        &self,
        collection: &str,
        item: &str,
        content: &[u8],
        index: Option<usize>,
    ) -> Result<Oid, EngineError> {
        let _lock = self.locker.acquire()?;
        let path = self.layout.collection_item(collection, item)?;
        let oid = self.files.create(&path, content).await?;
        self.index_step(collection, self.orders.add_item(collection, item, index).await)?;
        Ok(oid)
    }

    /// Start a subfolder with a placeholder member, surfaced first in the order.
    pub async fn create_subfolder(&self, collection: &str, sub: &str) -> Result<Oid, EngineError> {
        let item = format!("{}/{}", sub, KEEP_FILE);
        self.create_item(collection, &item, b"", None).await
    }

    /// Delete a member and drop it from the order.
    pub async fn delete_item(
        &self,
        collection: &str,
        item: &str,
        expected: Option<&Oid>,
    ) -> Result<(), EngineError> {
        let _lock = self.locker.acquire()?;
        let path = self.layout.collection_item(collection, item)?;
        self.files.delete(&path, expected).await?;
        self.index_step(collection, self.orders.delete_item(collection, item).await)
    }

    /// Rename a member, keeping its position in the order.
    pub async fn rename_item(
        &self,
        collection: &str,
        old: &str,
        new: &str,
        content: &[u8],
        expected: Option<&Oid>,
    ) -> Result<Oid, EngineError> {
        let _lock = self.locker.acquire()?;
        let old_path = self.layout.collection_item(collection, old)?;
        let new_path = self.layout.collection_item(collection, new)?;
        let oid = self.files.rename(&old_path, &new_path, content, expected).await?;
        self.index_step(collection, self.orders.update_item(collection, old, new).await)?;
        Ok(oid)
    }

    /// Log when the content commit landed but the order did not follow.
    fn index_step(&self, collection: &str, result: Result<(), EngineError>) -> Result<(), EngineError> {
        if let Err(e) = &result {
            warn!(collection, error = %e, "content committed but order not updated");
        }
        result
    }
}
