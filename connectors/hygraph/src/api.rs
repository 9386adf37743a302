//! Hygraph API facade.
//!
//! Wraps two GraphQL clients: the content API (schema-driven reads and
//! mutations, built from the query AST) and the management API (static
//! operations for the content model and webhooks).

use async_trait::async_trait;
use cms_graphql::{
    ArgValue, Document, GraphqlClient, GraphqlClientBuilder, GraphqlOperation, ObjectNode,
    OperationKind, PageStream, SelectionSet, paginate_streams,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::cache::ContentUpdate;
use crate::compiler::{asset_selection, compile_root_selection, strip_aliases};
use crate::config::HygraphConfig;
use crate::document::{ASSET_TYPENAME, DocumentRef, RemoteDocument};
use crate::error::{HygraphError, HygraphResult};
use crate::reconcile::ItemFetcher;
use crate::schema::{ContentModel, SchemaModel, TypeDescriptor, lower_first};

const ASSET_STREAM: &str = "assets";
const ASSET_CONNECTION: &str = "assetsConnection";
const ASSET_SINGLE: &str = "asset";

/// Result of [`HygraphApi::ensure_webhook`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookSetup {
    /// No webhook URL configured.
    Disabled,
    /// A webhook for the URL already exists.
    Existing {
        /// Webhook id.
        id: String,
    },
    /// A webhook was created.
    Created {
        /// Webhook id.
        id: String,
    },
    /// Setup failed; the connector keeps running without push updates.
    Failed {
        /// Failure description.
        reason: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Management operations
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvironmentVariables {
    project_id: String,
    environment: String,
}

#[derive(Debug, Deserialize)]
struct ViewerData<E> {
    viewer: Viewer<E>,
}

#[derive(Debug, Deserialize)]
struct Viewer<E> {
    project: Option<Project<E>>,
}

#[derive(Debug, Deserialize)]
struct Project<E> {
    environment: Option<E>,
}

impl<E> ViewerData<E> {
    fn into_environment(self) -> Option<E> {
        self.viewer.project?.environment
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentModelEnvironment {
    content_model: ContentModel,
}

struct ContentModelQuery;

impl GraphqlOperation for ContentModelQuery {
    type Variables = EnvironmentVariables;
    type ResponseData = ViewerData<ContentModelEnvironment>;

    const QUERY: &'static str = r"query ContentModel($projectId: ID!, $environment: String!) {
  viewer {
    project(id: $projectId) {
      environment(name: $environment) {
        contentModel {
          models {
            apiId
            apiIdPlural
            isSystem
            fields { ...FieldShape }
          }
          components {
            apiId
            apiIdPlural
            fields { ...FieldShape }
          }
        }
      }
    }
  }
}

fragment FieldShape on IField {
  __typename
  apiId
  isList
  ... on SimpleField { type }
  ... on RelationalField { relatedModel { apiId } }
  ... on UniDirectionalRelationalField { relatedModel { apiId } }
  ... on UnionField { union { memberTypes { parent { apiId } } } }
  ... on ComponentField { component { apiId } }
  ... on ComponentUnionField { components { apiId } }
}";
    const OPERATION_NAME: &'static str = "ContentModel";
}

#[derive(Debug, Deserialize)]
struct WebhookSummary {
    id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct WebhookEnvironment {
    id: String,
    #[serde(default)]
    webhooks: Vec<WebhookSummary>,
}

struct EnvironmentWebhooksQuery;

impl GraphqlOperation for EnvironmentWebhooksQuery {
    type Variables = EnvironmentVariables;
    type ResponseData = ViewerData<WebhookEnvironment>;

    const QUERY: &'static str = r"query EnvironmentWebhooks($projectId: ID!, $environment: String!) {
  viewer {
    project(id: $projectId) {
      environment(name: $environment) {
        id
        webhooks { id url }
      }
    }
  }
}";
    const OPERATION_NAME: &'static str = "EnvironmentWebhooks";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateWebhookInput {
    environment_id: String,
    name: String,
    url: String,
    is_active: bool,
    include_payload: bool,
    method: &'static str,
    trigger_type: &'static str,
    trigger_actions: Vec<&'static str>,
    models: Vec<String>,
    stages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct CreateWebhookVariables {
    data: CreateWebhookInput,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateWebhookData {
    create_webhook: CreatedWebhookPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedWebhookPayload {
    created_webhook: WebhookSummary,
}

struct CreateWebhookMutation;

impl GraphqlOperation for CreateWebhookMutation {
    type Variables = CreateWebhookVariables;
    type ResponseData = CreateWebhookData;

    const QUERY: &'static str = r"mutation CreateWebhook($data: CreateWebhookInput!) {
  createWebhook(data: $data) {
    createdWebhook { id url }
  }
}";
    const OPERATION_NAME: &'static str = "CreateWebhook";

    fn is_idempotent() -> bool {
        false
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API facade
// ─────────────────────────────────────────────────────────────────────────────

/// Hygraph content and management API client.
#[derive(Debug, Clone)]
pub struct HygraphApi {
    content: GraphqlClient,
    management: GraphqlClient,
    config: HygraphConfig,
}

impl HygraphApi {
    /// Create a client from configuration.
    pub fn new(config: HygraphConfig) -> HygraphResult<Self> {
        config.validate()?;

        let content = GraphqlClientBuilder::new(config.content_api_url.clone())
            .with_service_name("hygraph-content")
            .with_bearer_token(&config.auth_token)
            .with_timeout(config.timeout)
            .build()?;
        let management = GraphqlClientBuilder::new(config.management_api_url.clone())
            .with_service_name("hygraph-management")
            .with_bearer_token(&config.auth_token)
            .with_timeout(config.timeout)
            .build()?;

        Ok(Self {
            content,
            management,
            config,
        })
    }

    /// Connector configuration.
    pub const fn config(&self) -> &HygraphConfig {
        &self.config
    }

    /// Content API client.
    pub const fn content_client(&self) -> &GraphqlClient {
        &self.content
    }

    fn environment_variables(&self) -> EnvironmentVariables {
        EnvironmentVariables {
            project_id: self.config.project_id.clone(),
            environment: self.config.environment.clone(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Schema
    // ─────────────────────────────────────────────────────────────────────────

    /// Load the content model. Failures propagate.
    #[instrument(skip(self))]
    pub async fn try_fetch_schema(&self) -> HygraphResult<SchemaModel> {
        let data = self
            .management
            .execute_strict::<ContentModelQuery>(self.environment_variables())
            .await?;
        let environment = data.into_environment().ok_or_else(|| {
            HygraphError::Config(format!(
                "environment '{}' not found in project '{}'",
                self.config.environment, self.config.project_id
            ))
        })?;

        let schema = SchemaModel::from_content_model(environment.content_model);
        debug!(types = schema.len(), "loaded content model");
        Ok(schema)
    }

    /// Load the content model; an empty schema on failure.
    pub async fn fetch_schema(&self) -> SchemaModel {
        match self.try_fetch_schema().await {
            Ok(schema) => schema,
            Err(err) => {
                warn!(error = %err, "failed to load content model");
                SchemaModel::new()
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Content reads
    // ─────────────────────────────────────────────────────────────────────────

    fn content_streams(schema: &SchemaModel) -> Vec<PageStream> {
        let draft = ArgValue::enumeration("DRAFT");
        let mut streams: Vec<PageStream> = schema
            .models()
            .map(|model| {
                PageStream::new(
                    lower_first(&model.plural),
                    model.connection_field(),
                    compile_root_selection(schema, &model.name),
                )
                .with_argument("stage", draft.clone())
            })
            .collect();
        streams.push(
            PageStream::new(ASSET_STREAM, ASSET_CONNECTION, asset_selection())
                .with_argument("stage", draft),
        );
        streams
    }

    /// Fetch every model and asset. Failures propagate.
    #[instrument(skip(self, schema))]
    pub async fn try_fetch_all_content(&self, schema: &SchemaModel) -> HygraphResult<ContentUpdate> {
        let streams = Self::content_streams(schema);
        let items = paginate_streams(&self.content, &streams, self.config.page_size).await?;

        let mut update = ContentUpdate::default();
        for item in items {
            match serde_json::from_value::<RemoteDocument>(strip_aliases(item.node)) {
                Ok(document) => update.push(document),
                Err(err) => debug!(stream = %item.stream, error = %err, "skipping malformed item"),
            }
        }
        info!(
            documents = update.documents.len(),
            assets = update.assets.len(),
            "fetched content"
        );
        Ok(update)
    }

    /// Fetch every model and asset; an empty update on failure.
    pub async fn fetch_all_content(&self, schema: &SchemaModel) -> ContentUpdate {
        match self.try_fetch_all_content(schema).await {
            Ok(update) => update,
            Err(err) => {
                warn!(error = %err, "failed to fetch content");
                ContentUpdate::default()
            }
        }
    }

    /// Fetch the draft of one document or asset. `Ok(None)` when it does not
    /// exist.
    #[instrument(skip(self, schema))]
    pub async fn fetch_document(
        &self,
        schema: &SchemaModel,
        typename: &str,
        id: &str,
    ) -> HygraphResult<Option<RemoteDocument>> {
        let (field, selection) = if typename == ASSET_TYPENAME {
            (ASSET_SINGLE.to_string(), asset_selection())
        } else {
            let descriptor = model(schema, typename)?;
            (
                descriptor.single_field(),
                compile_root_selection(schema, typename),
            )
        };

        let node = ObjectNode::new(field.clone(), selection)
            .with_argument("where", where_id(id))
            .with_argument("stage", ArgValue::enumeration("DRAFT"));
        let data = self
            .content
            .execute_document_strict(&root_document(OperationKind::Query, node), true)
            .await?;

        match data.get(&field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => {
                let document = serde_json::from_value(strip_aliases(value.clone()))
                    .map_err(|e| cms_graphql::GraphqlClientError::Json(e.to_string()))?;
                Ok(Some(document))
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    async fn mutate(&self, field: &str, node: ObjectNode) -> HygraphResult<Value> {
        self.mutate_with(field, root_document(OperationKind::Mutation, node), json!({}))
            .await
    }

    async fn mutate_with(
        &self,
        field: &str,
        document: Document,
        variables: Value,
    ) -> HygraphResult<Value> {
        let mut data = self
            .content
            .execute_document_with(&document, variables, false)
            .await
            .map_err(|e| HygraphError::mutation(field, e))?;
        Ok(data
            .as_object_mut()
            .and_then(|map| map.remove(field))
            .unwrap_or(Value::Null))
    }

    /// Runs `node` with `data` bound to `$data: <input_type>!`.
    async fn mutate_document(
        &self,
        field: &str,
        node: ObjectNode,
        input_type: &str,
        data: Value,
    ) -> HygraphResult<RemoteDocument> {
        let document = root_document(
            OperationKind::Mutation,
            node.with_argument("data", ArgValue::variable("data")),
        )
        .with_variable("data", format!("{input_type}!"));
        let value = self
            .mutate_with(field, document, json!({ "data": data }))
            .await?;
        if value.is_null() {
            return Err(HygraphError::mutation(field, "no document returned"));
        }
        serde_json::from_value(strip_aliases(value)).map_err(|e| HygraphError::mutation(field, e))
    }

    /// Create a document.
    #[instrument(skip(self, schema, data))]
    pub async fn create_document(
        &self,
        schema: &SchemaModel,
        typename: &str,
        data: Value,
    ) -> HygraphResult<RemoteDocument> {
        let descriptor = model(schema, typename)?;
        let field = format!("create{}", descriptor.name);
        let node = ObjectNode::new(field.clone(), compile_root_selection(schema, typename));
        let input_type = format!("{}CreateInput", descriptor.name);
        self.mutate_document(&field, node, &input_type, data).await
    }

    /// Update a document's draft.
    #[instrument(skip(self, schema, data))]
    pub async fn update_document(
        &self,
        schema: &SchemaModel,
        typename: &str,
        id: &str,
        data: Value,
    ) -> HygraphResult<RemoteDocument> {
        let descriptor = model(schema, typename)?;
        let field = format!("update{}", descriptor.name);
        let node = ObjectNode::new(field.clone(), compile_root_selection(schema, typename))
            .with_argument("where", where_id(id));
        let input_type = format!("{}UpdateInput", descriptor.name);
        self.mutate_document(&field, node, &input_type, data).await
    }

    /// Delete a document.
    #[instrument(skip(self))]
    pub async fn delete_document(&self, typename: &str, id: &str) -> HygraphResult<()> {
        let field = format!("delete{typename}");
        let node = ObjectNode::new(field.clone(), id_selection()).with_argument("where", where_id(id));
        self.mutate(&field, node).await.map(|_| ())
    }

    /// Publish a document.
    #[instrument(skip(self))]
    pub async fn publish_document(&self, typename: &str, id: &str) -> HygraphResult<()> {
        let field = format!("publish{typename}");
        self.mutate(&field, publish_node(&field, id)).await.map(|_| ())
    }

    /// Unpublish a document.
    #[instrument(skip(self))]
    pub async fn unpublish_document(&self, typename: &str, id: &str) -> HygraphResult<()> {
        let field = format!("unpublish{typename}");
        self.mutate(&field, unpublish_node(&field, id)).await.map(|_| ())
    }

    /// Publish several documents in one request.
    #[instrument(skip(self, refs), fields(count = refs.len()))]
    pub async fn publish_many(&self, refs: &[DocumentRef]) -> HygraphResult<()> {
        self.bulk("publishMany", refs, |r| {
            publish_node(&format!("publish{}", r.typename), &r.id)
        })
        .await
    }

    /// Unpublish several documents in one request.
    #[instrument(skip(self, refs), fields(count = refs.len()))]
    pub async fn unpublish_many(&self, refs: &[DocumentRef]) -> HygraphResult<()> {
        self.bulk("unpublishMany", refs, |r| {
            unpublish_node(&format!("unpublish{}", r.typename), &r.id)
        })
        .await
    }

    async fn bulk(
        &self,
        operation: &str,
        refs: &[DocumentRef],
        node: impl Fn(&DocumentRef) -> ObjectNode,
    ) -> HygraphResult<()> {
        if refs.is_empty() {
            return Ok(());
        }
        let mut selection = SelectionSet::new();
        for (index, r) in refs.iter().enumerate() {
            selection.object(node(r).with_alias(format!("item{index}")));
        }
        self.mutate_with(
            operation,
            Document::new(OperationKind::Mutation, selection),
            json!({}),
        )
        .await
        .map(|_| ())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Webhook setup
    // ─────────────────────────────────────────────────────────────────────────

    /// Make sure the project delivers change webhooks to the configured URL.
    /// Never fails; problems are reported as [`WebhookSetup::Failed`].
    #[instrument(skip(self))]
    pub async fn ensure_webhook(&self) -> WebhookSetup {
        let Some(url) = self.config.webhook_url.as_deref() else {
            info!("no webhook URL configured; change webhooks disabled");
            return WebhookSetup::Disabled;
        };

        match self.try_ensure_webhook(url).await {
            Ok(setup) => setup,
            Err(err) => {
                warn!(url, error = %err, "webhook setup failed");
                WebhookSetup::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn try_ensure_webhook(&self, url: &str) -> HygraphResult<WebhookSetup> {
        let environment = self
            .management
            .execute_strict::<EnvironmentWebhooksQuery>(self.environment_variables())
            .await?
            .into_environment()
            .ok_or_else(|| {
                HygraphError::Config(format!(
                    "environment '{}' not found",
                    self.config.environment
                ))
            })?;

        if let Some(existing) = environment.webhooks.iter().find(|hook| hook.url == url) {
            info!(url, id = %existing.id, "webhook already registered");
            return Ok(WebhookSetup::Existing {
                id: existing.id.clone(),
            });
        }

        let input = CreateWebhookInput {
            environment_id: environment.id,
            name: format!("cms-hygraph sync ({})", self.config.environment),
            url: url.to_string(),
            is_active: true,
            include_payload: true,
            method: "POST",
            trigger_type: "CONTENT_MODEL",
            trigger_actions: vec!["CREATE", "UPDATE", "DELETE", "PUBLISH", "UNPUBLISH"],
            models: Vec::new(),
            stages: Vec::new(),
            secret_key: self.config.webhook_secret.clone(),
        };
        let created = self
            .management
            .execute_strict::<CreateWebhookMutation>(CreateWebhookVariables { data: input })
            .await
            .map_err(|e| HygraphError::mutation("createWebhook", e))?
            .create_webhook
            .created_webhook;

        info!(url = %created.url, id = %created.id, "webhook created");
        Ok(WebhookSetup::Created { id: created.id })
    }
}

/// [`ItemFetcher`] reading single items through the content API.
pub(crate) struct SchemaFetcher<'a> {
    pub(crate) api: &'a HygraphApi,
    pub(crate) schema: &'a SchemaModel,
}

#[async_trait]
impl ItemFetcher for SchemaFetcher<'_> {
    async fn fetch_item(&self, typename: &str, id: &str) -> HygraphResult<Option<RemoteDocument>> {
        self.api.fetch_document(self.schema, typename, id).await
    }
}

fn model<'a>(schema: &'a SchemaModel, typename: &str) -> HygraphResult<&'a TypeDescriptor> {
    schema
        .get(typename)
        .filter(|descriptor| descriptor.is_model())
        .ok_or_else(|| HygraphError::UnknownModel(typename.to_string()))
}

fn root_document(operation: OperationKind, node: ObjectNode) -> Document {
    let mut selection = SelectionSet::new();
    selection.object(node);
    Document::new(operation, selection)
}

fn where_id(id: &str) -> ArgValue {
    ArgValue::object([("id", ArgValue::from(id))])
}

fn id_selection() -> SelectionSet {
    let mut selection = SelectionSet::new();
    selection.leaf("id");
    selection
}

fn publish_node(field: &str, id: &str) -> ObjectNode {
    ObjectNode::new(field, id_selection())
        .with_argument("where", where_id(id))
        .with_argument("to", ArgValue::enumeration("PUBLISHED"))
}

fn unpublish_node(field: &str, id: &str) -> ObjectNode {
    ObjectNode::new(field, id_selection())
        .with_argument("where", where_id(id))
        .with_argument("from", ArgValue::enumeration("PUBLISHED"))
}
