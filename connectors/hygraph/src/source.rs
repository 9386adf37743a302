//! Content source: keeps a [`ContentCache`] in sync with Hygraph.

use std::collections::HashMap;
use std::sync::Arc;

use cms_webhook::WebhookHandler;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::api::{HygraphApi, SchemaFetcher, WebhookSetup};
use crate::cache::{ContentCache, ContentUpdate};
use crate::config::HygraphConfig;
use crate::document::{ASSET_TYPENAME, DocumentRef, RemoteDocument};
use crate::error::{HygraphError, HygraphResult};
use crate::notification::{ChangeNotification, NotificationOperation};
use crate::reconcile::{Delay, Reconciler, TokioDelay};
use crate::schema::SchemaModel;

/// Hygraph content source.
pub struct HygraphContentSource<C: ContentCache, D: Delay = TokioDelay> {
    api: HygraphApi,
    cache: Arc<C>,
    webhooks: WebhookHandler,
    reconciler: Reconciler<D>,
}

impl<C: ContentCache> HygraphContentSource<C> {
    /// Create a source writing into `cache`.
    pub fn new(config: HygraphConfig, cache: Arc<C>) -> HygraphResult<Self> {
        let webhooks = WebhookHandler::new(
            config.webhook_secret.as_deref(),
            config.webhook.to_handler_config(),
        );
        let reconciler = Reconciler::new(&config.reconcile);
        let api = HygraphApi::new(config)?;

        Ok(Self {
            api,
            cache,
            webhooks,
            reconciler,
        })
    }
}

impl<C: ContentCache, D: Delay> HygraphContentSource<C, D> {
    /// Replace the reconciler.
    pub fn with_reconciler<E: Delay>(self, reconciler: Reconciler<E>) -> HygraphContentSource<C, E> {
        HygraphContentSource {
            api: self.api,
            cache: self.cache,
            webhooks: self.webhooks,
            reconciler,
        }
    }

    /// API facade.
    pub const fn api(&self) -> &HygraphApi {
        &self.api
    }

    /// Cache collaborator.
    pub const fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    /// Cached schema, loading it on first use.
    pub async fn schema(&self) -> Arc<SchemaModel> {
        if let Some(schema) = self.cache.schema() {
            return schema;
        }
        self.refresh_schema().await
    }

    /// Reload the schema from the management API.
    pub async fn refresh_schema(&self) -> Arc<SchemaModel> {
        let schema = Arc::new(self.api.fetch_schema().await);
        if !schema.is_empty() {
            self.cache.store_schema(Arc::clone(&schema));
        }
        schema
    }

    /// Fetch all content and write it to the cache.
    #[instrument(skip(self))]
    pub async fn sync_all(&self) -> ContentUpdate {
        let schema = self.schema().await;
        let update = self.api.fetch_all_content(&schema).await;
        if !update.is_empty() {
            self.cache.update_content(update.clone());
        }
        update
    }

    /// Register the change webhook if configured.
    pub async fn ensure_webhook(&self) -> WebhookSetup {
        self.api.ensure_webhook().await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Webhook intake
    // ─────────────────────────────────────────────────────────────────────────

    /// Verify a webhook request and apply the notification it carries.
    ///
    /// Returns the update written to the cache, or `None` when the item
    /// could not be read.
    #[instrument(skip(self, headers, body), fields(size = body.len()))]
    pub async fn handle_webhook(
        &self,
        headers: &HashMap<String, String>,
        body: &[u8],
    ) -> HygraphResult<Option<ContentUpdate>> {
        let event = self.webhooks.verify_and_parse(headers, body)?;
        debug!(event_id = %event.id, environment = ?event.environment, "webhook accepted");
        let notification = ChangeNotification::from_value(event.payload)?;
        self.apply_notification(notification).await
    }

    /// Apply a decoded change notification.
    pub async fn apply_notification(
        &self,
        notification: ChangeNotification,
    ) -> HygraphResult<Option<ContentUpdate>> {
        let operation = notification.operation;
        let typename = notification.data.typename.as_str();
        let id = notification.data.id.as_str();

        if operation == NotificationOperation::Delete {
            let mut update = ContentUpdate::default();
            if notification.is_asset() {
                update.deleted_asset_ids.push(id.to_string());
            } else {
                update.deleted_document_ids.push(id.to_string());
            }
            info!(typename, id, "removing deleted item");
            self.cache.update_content(update.clone());
            return Ok(Some(update));
        }

        let schema = self.schema().await;
        let cached = if notification.is_asset() {
            self.cache.asset_by_id(id)
        } else {
            let is_model = self
                .cache
                .model_by_name(typename)
                .or_else(|| schema.get(typename).cloned())
                .is_some_and(|descriptor| descriptor.is_model());
            if !is_model {
                return Err(HygraphError::UnknownModel(typename.to_string()));
            }
            self.cache.document_by_id(id)
        };

        let fetcher = SchemaFetcher {
            api: &self.api,
            schema: &schema,
        };
        let outcome = self
            .reconciler
            .reconcile(&fetcher, typename, id, operation, cached.as_ref())
            .await;

        let Some(item) = outcome.into_item() else {
            debug!(typename, id, %operation, "nothing to write");
            return Ok(None);
        };
        let update = ContentUpdate::with_item(item);
        self.cache.update_content(update.clone());
        Ok(Some(update))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a document and cache the result.
    pub async fn create_document(&self, typename: &str, data: Value) -> HygraphResult<RemoteDocument> {
        let schema = self.schema().await;
        let document = self.api.create_document(&schema, typename, data).await?;
        self.cache.update_content(ContentUpdate::with_item(document.clone()));
        Ok(document)
    }

    /// Update a document and cache the result.
    pub async fn update_document(
        &self,
        typename: &str,
        id: &str,
        data: Value,
    ) -> HygraphResult<RemoteDocument> {
        let schema = self.schema().await;
        let document = self.api.update_document(&schema, typename, id, data).await?;
        self.cache.update_content(ContentUpdate::with_item(document.clone()));
        Ok(document)
    }

    /// Delete a document or asset and drop it from the cache.
    pub async fn delete_document(&self, typename: &str, id: &str) -> HygraphResult<()> {
        self.api.delete_document(typename, id).await?;
        let mut update = ContentUpdate::default();
        if typename == ASSET_TYPENAME {
            update.deleted_asset_ids.push(id.to_string());
        } else {
            update.deleted_document_ids.push(id.to_string());
        }
        self.cache.update_content(update);
        Ok(())
    }

    /// Publish a document.
    pub async fn publish_document(&self, typename: &str, id: &str) -> HygraphResult<()> {
        self.api.publish_document(typename, id).await
    }

    /// Unpublish a document.
    pub async fn unpublish_document(&self, typename: &str, id: &str) -> HygraphResult<()> {
        self.api.unpublish_document(typename, id).await
    }

    /// Publish several documents. Failures are logged, not returned.
    pub async fn publish_documents(&self, refs: &[DocumentRef]) {
        if let Err(err) = self.api.publish_many(refs).await {
            warn!(count = refs.len(), error = %err, "bulk publish failed");
        }
    }

    /// Unpublish several documents. Failures are logged, not returned.
    pub async fn unpublish_documents(&self, refs: &[DocumentRef]) {
        if let Err(err) = self.api.unpublish_many(refs).await {
            warn!(count = refs.len(), error = %err, "bulk unpublish failed");
        }
    }
}

impl<C: ContentCache, D: Delay> std::fmt::Debug for HygraphContentSource<C, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HygraphContentSource")
            .field("api", &self.api)
            .field("webhook_signatures", &self.webhooks.requires_signature())
            .field("max_attempts", &self.reconciler.max_attempts())
            .finish_non_exhaustive()
    }
}
