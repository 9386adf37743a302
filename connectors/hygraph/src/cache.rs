//! Content cache collaborator.
//!
//! The source writes fetched content through [`ContentCache`] and reads the
//! cached copy back when reconciling a change notification.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::document::RemoteDocument;
use crate::schema::{SchemaModel, TypeDescriptor};

/// A batch of cache writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentUpdate {
    /// Documents to insert or replace.
    pub documents: Vec<RemoteDocument>,
    /// Assets to insert or replace.
    pub assets: Vec<RemoteDocument>,
    /// Document ids to remove.
    pub deleted_document_ids: Vec<String>,
    /// Asset ids to remove.
    pub deleted_asset_ids: Vec<String>,
}

impl ContentUpdate {
    /// Update carrying one item, routed by typename.
    pub fn with_item(item: RemoteDocument) -> Self {
        let mut update = Self::default();
        update.push(item);
        update
    }

    /// Route an item to `documents` or `assets`.
    pub fn push(&mut self, item: RemoteDocument) {
        if item.is_asset() {
            self.assets.push(item);
        } else {
            self.documents.push(item);
        }
    }

    /// `true` when nothing would change.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
            && self.assets.is_empty()
            && self.deleted_document_ids.is_empty()
            && self.deleted_asset_ids.is_empty()
    }
}

/// Storage for synced content.
pub trait ContentCache: Send + Sync {
    /// Cached schema, if loaded.
    fn schema(&self) -> Option<Arc<SchemaModel>>;

    /// Replace the cached schema.
    fn store_schema(&self, schema: Arc<SchemaModel>);

    /// Type descriptor from the cached schema.
    fn model_by_name(&self, name: &str) -> Option<TypeDescriptor> {
        self.schema()?.get(name).cloned()
    }

    /// Cached document.
    fn document_by_id(&self, id: &str) -> Option<RemoteDocument>;

    /// Cached asset.
    fn asset_by_id(&self, id: &str) -> Option<RemoteDocument>;

    /// Apply a batch of writes.
    fn update_content(&self, update: ContentUpdate);
}

#[derive(Debug, Default)]
struct CacheState {
    schema: Option<Arc<SchemaModel>>,
    documents: IndexMap<String, RemoteDocument>,
    assets: IndexMap<String, RemoteDocument>,
}

/// In-memory [`ContentCache`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    state: RwLock<CacheState>,
}

impl MemoryCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached documents.
    pub fn document_count(&self) -> usize {
        self.state.read().documents.len()
    }

    /// Number of cached assets.
    pub fn asset_count(&self) -> usize {
        self.state.read().assets.len()
    }
}

impl ContentCache for MemoryCache {
    fn schema(&self) -> Option<Arc<SchemaModel>> {
        self.state.read().schema.clone()
    }

    fn store_schema(&self, schema: Arc<SchemaModel>) {
        self.state.write().schema = Some(schema);
    }

    fn document_by_id(&self, id: &str) -> Option<RemoteDocument> {
        self.state.read().documents.get(id).cloned()
    }

    fn asset_by_id(&self, id: &str) -> Option<RemoteDocument> {
        self.state.read().assets.get(id).cloned()
    }

    fn update_content(&self, update: ContentUpdate) {
        let mut state = self.state.write();
        for document in update.documents {
            state.documents.insert(document.id.clone(), document);
        }
        for asset in update.assets {
            state.assets.insert(asset.id.clone(), asset);
        }
        for id in &update.deleted_document_ids {
            state.documents.shift_remove(id);
        }
        for id in &update.deleted_asset_ids {
            state.assets.shift_remove(id);
        }
    }
}
