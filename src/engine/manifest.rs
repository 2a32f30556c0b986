//! engine::manifest
//!
//! Typed schema of a collection's `collection.yml`.
//!
//! # Format
//!
//! ```yaml
//! collections:
//!   news:
//!     output: true
//!     order:
//!       - first-post.md
//!       - 2023/.keep
//!       - 2023/recap.md
//! ```
//!
//! Keys this crate does not use are preserved through a read-modify-write.
//! A manifest that fails to parse, or lacks the collection's section, is
//! treated as absent.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::EngineError;
use crate::store::StoreError;

/// Root of a `collection.yml` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionManifest {
    pub collections: BTreeMap<String, CollectionSection>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// One collection's settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSection {
    #[serde(default = "default_output")]
    pub output: bool,

    #[serde(default)]
    pub order: Vec<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

fn default_output() -> bool {
    true
}

/// The display order of a collection's children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderedIndex {
    pub collection: String,
    pub order: Vec<String>,
}

impl CollectionManifest {
    /// A manifest holding a single collection.
    pub fn new(collection: &str, order: Vec<String>) -> Self {
        let mut collections = BTreeMap::new();
        collections.insert(
            collection.to_string(),
            CollectionSection {
                output: true,
                order,
                extra: BTreeMap::new(),
            },
        );
        Self {
            collections,
            extra: BTreeMap::new(),
        }
    }

    /// Parse manifest bytes; anything malformed reads as absent.
    pub fn parse(collection: &str, content: &[u8]) -> Result<Self, EngineError> {
        let manifest: Self = serde_yaml::from_slice(content).map_err(|e| {
            EngineError::NotFound(format!("malformed manifest for '{}': {}", collection, e))
        })?;
        if !manifest.collections.contains_key(collection) {
            return Err(EngineError::NotFound(format!(
                "manifest has no section for '{}'",
                collection
            )));
        }
        Ok(manifest)
    }

    pub fn to_yaml(&self) -> Result<String, EngineError> {
        serde_yaml::to_string(self)
            .map_err(|e| EngineError::Store(StoreError::Backend(format!("cannot serialize manifest: {}", e))))
    }

    pub fn order(&self, collection: &str) -> Option<&Vec<String>> {
        self.collections.get(collection).map(|s| &s.order)
    }

    pub fn order_mut(&mut self, collection: &str) -> Option<&mut Vec<String>> {
        self.collections.get_mut(collection).map(|s| &mut s.order)
    }

    pub fn index(&self, collection: &str) -> Option<OrderedIndex> {
        self.order(collection).map(|order| OrderedIndex {
            collection: collection.to_string(),
            order: order.clone(),
        })
    }
}
