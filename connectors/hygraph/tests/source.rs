use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use cms_hygraph::{
    ChangeNotification, ContentCache, DocumentRef, FieldDescriptor, FieldKind, HygraphConfig,
    HygraphContentSource, HygraphError, MemoryCache, NotificationOperation, RemoteDocument,
    SchemaModel, TypeDescriptor, TypeKind,
};
use cms_webhook::{HmacSha256Verifier, SIGNATURE_HEADER, StampedSignature, WebhookError};

/// Replays bodies in order; the last one repeats.
struct ScriptResponder {
    bodies: Vec<Value>,
    calls: Arc<AtomicUsize>,
}

impl ScriptResponder {
    fn new(bodies: Vec<Value>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                bodies,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl Respond for ScriptResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let body = &self.bodies[call.min(self.bodies.len() - 1)];
        ResponseTemplate::new(200).set_body_json(body.clone())
    }
}

fn config(server: &MockServer) -> HygraphConfig {
    let mut config = HygraphConfig::new(
        format!("{}/content", server.uri()),
        format!("{}/management", server.uri()),
        "test-token",
        "project-1",
    );
    config.reconcile.max_attempts = 3;
    config.reconcile.delay_ms = 0;
    config
}

fn post_schema() -> SchemaModel {
    SchemaModel::new().with_type(
        TypeDescriptor::new("Post", "Posts", TypeKind::Model)
            .with_field(FieldDescriptor::new("title", FieldKind::Scalar)),
    )
}

fn source_with(config: HygraphConfig) -> (HygraphContentSource<MemoryCache>, Arc<MemoryCache>) {
    let cache = Arc::new(MemoryCache::new());
    cache.store_schema(Arc::new(post_schema()));
    let source = HygraphContentSource::new(config, Arc::clone(&cache)).unwrap();
    (source, cache)
}

fn post(updated_at: &str, published_at: Option<&str>) -> Value {
    let stages = published_at.map_or_else(
        || json!([]),
        |at| json!([{ "stage": "PUBLISHED", "updatedAt": at }]),
    );
    json!({
        "__typename": "Post",
        "id": "p1",
        "title": "Hello",
        "updatedAt": updated_at,
        "documentInStages": stages
    })
}

fn remote(value: Value) -> RemoteDocument {
    serde_json::from_value(value).unwrap()
}

fn notification(operation: &str, typename: &str, id: &str) -> Value {
    json!({
        "operation": operation,
        "data": { "__typename": typename, "id": id }
    })
}

async fn request_queries(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| {
            let body: Value = request.body_json().unwrap();
            body["query"].as_str().unwrap_or_default().to_string()
        })
        .collect()
}

#[tokio::test]
async fn sync_all_loads_schema_and_strips_aliases() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/management"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "viewer": { "project": { "environment": { "contentModel": {
                "models": [
                    { "apiId": "Asset", "apiIdPlural": "Assets", "isSystem": true, "fields": [] },
                    { "apiId": "Page", "apiIdPlural": "Pages", "isSystem": false, "fields": [
                        { "__typename": "SimpleField", "apiId": "title", "isList": false, "type": "STRING" },
                        { "__typename": "ComponentUnionField", "apiId": "blocks", "isList": true,
                          "components": [{ "apiId": "Hero" }] }
                    ] }
                ],
                "components": [
                    { "apiId": "Hero", "apiIdPlural": "Heroes", "fields": [
                        { "__typename": "SimpleField", "apiId": "headline", "isList": false, "type": "STRING" }
                    ] }
                ]
            } } } } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "pages": {
                    "edges": [{ "node": {
                        "__typename": "Page",
                        "id": "pg1",
                        "title": "Home",
                        "blocks": [{ "__typename": "Hero", "__Hero_alias__headline": "Welcome" }],
                        "updatedAt": "2024-05-01T10:00:00Z",
                        "documentInStages": []
                    } }],
                    "pageInfo": { "hasNextPage": false, "pageSize": 1 }
                },
                "assets": {
                    "edges": [
                        { "node": { "__typename": "Asset", "id": "a1", "url": "https://cdn.example.com/a1" } },
                        { "node": { "id": "broken" } }
                    ],
                    "pageInfo": { "hasNextPage": false, "pageSize": 2 }
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cache = Arc::new(MemoryCache::new());
    let source = HygraphContentSource::new(config(&server), Arc::clone(&cache)).unwrap();

    let update = source.sync_all().await;

    assert_eq!(update.documents.len(), 1);
    assert_eq!(update.assets.len(), 1);
    assert_eq!(cache.schema().unwrap().len(), 2);

    let page = cache.document_by_id("pg1").unwrap();
    assert_eq!(page.fields["blocks"][0]["headline"], "Welcome");
    assert!(cache.asset_by_id("a1").is_some());

    let queries = request_queries(&server).await;
    let content_query = queries
        .iter()
        .find(|query| query.contains("pagesConnection"))
        .unwrap();
    assert!(content_query.contains("pages: pagesConnection(first: 100, skip: 0, stage: DRAFT)"));
    assert!(content_query.contains("assets: assetsConnection(first: 100, skip: 0, stage: DRAFT)"));
    assert!(content_query.contains("__Hero_alias__headline: headline"));
}

#[tokio::test]
async fn sync_all_failure_returns_empty_update() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/content"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad query"))
        .mount(&server)
        .await;

    let (source, cache) = source_with(config(&server));
    let update = source.sync_all().await;

    assert!(update.is_empty());
    assert_eq!(cache.document_count(), 0);
}

#[tokio::test]
async fn update_notification_waits_for_newer_read() {
    let server = MockServer::start().await;
    let (responder, calls) = ScriptResponder::new(vec![
        json!({ "data": { "post": post("2024-05-01T10:00:00Z", None) } }),
        json!({ "data": { "post": post("2024-05-01T10:05:00Z", None) } }),
    ]);
    Mock::given(method("POST"))
        .and(path("/content"))
        .respond_with(responder)
        .mount(&server)
        .await;

    let (source, cache) = source_with(config(&server));
    cache.update_content(cms_hygraph::ContentUpdate::with_item(remote(post(
        "2024-05-01T10:00:00Z",
        None,
    ))));

    let body = serde_json::to_vec(&notification("update", "Post", "p1")).unwrap();
    let update = source
        .handle_webhook(&HashMap::new(), &body)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(update.documents.len(), 1);
    assert_eq!(
        cache.document_by_id("p1").unwrap().updated_at,
        remote(post("2024-05-01T10:05:00Z", None)).updated_at
    );

    let queries = request_queries(&server).await;
    assert!(queries[0].contains("post(where: { id: \"p1\" }, stage: DRAFT)"));
    assert!(queries[0].contains("documentInStages(stages: [PUBLISHED])"));
}

#[tokio::test]
async fn publish_notification_exhausts_and_keeps_last_read() {
    let server = MockServer::start().await;
    let lagging = post("2024-05-01T10:05:00Z", Some("2024-05-01T10:00:00Z"));
    let (responder, calls) = ScriptResponder::new(vec![json!({ "data": { "post": lagging } })]);
    Mock::given(method("POST"))
        .and(path("/content"))
        .respond_with(responder)
        .mount(&server)
        .await;

    let (source, cache) = source_with(config(&server));
    let outcome = source
        .apply_notification(
            ChangeNotification::from_value(notification("publish", "Post", "p1")).unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(outcome.is_some());
    assert!(cache.document_by_id("p1").unwrap().published_record().is_some());
}

#[tokio::test]
async fn missing_item_leaves_cache_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "post": null } })))
        .expect(1)
        .mount(&server)
        .await;

    let (source, cache) = source_with(config(&server));
    let cached = remote(post("2024-05-01T10:00:00Z", None));
    cache.update_content(cms_hygraph::ContentUpdate::with_item(cached.clone()));

    let outcome = source
        .apply_notification(
            ChangeNotification::from_value(notification("update", "Post", "p1")).unwrap(),
        )
        .await
        .unwrap();

    assert!(outcome.is_none());
    assert_eq!(cache.document_by_id("p1"), Some(cached));
}

#[tokio::test]
async fn delete_notification_does_not_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let (source, cache) = source_with(config(&server));
    cache.update_content(cms_hygraph::ContentUpdate {
        documents: vec![remote(post("2024-05-01T10:00:00Z", None))],
        assets: vec![remote(json!({ "__typename": "Asset", "id": "a1" }))],
        ..Default::default()
    });

    let update = source
        .apply_notification(
            ChangeNotification::from_value(notification("delete", "Post", "p1")).unwrap(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.deleted_document_ids, vec!["p1".to_string()]);
    assert!(cache.document_by_id("p1").is_none());

    let update = source
        .apply_notification(
            ChangeNotification::from_value(notification("delete", "Asset", "a1")).unwrap(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.deleted_asset_ids, vec!["a1".to_string()]);
    assert_eq!(cache.asset_count(), 0);
}

#[tokio::test]
async fn unknown_model_is_rejected_without_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/content"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let (source, _cache) = source_with(config(&server));
    let err = source
        .apply_notification(
            ChangeNotification::from_value(notification("create", "Video", "v1")).unwrap(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, HygraphError::UnknownModel(name) if name == "Video"));
}

#[tokio::test]
async fn component_notification_is_an_unknown_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/content"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let (source, cache) = source_with(config(&server));
    cache.store_schema(Arc::new(post_schema().with_type(
        TypeDescriptor::new("Seo", "Seos", TypeKind::Component)
            .with_field(FieldDescriptor::new("keywords", FieldKind::Scalar)),
    )));

    let err = source
        .apply_notification(
            ChangeNotification::from_value(notification("update", "Seo", "s1")).unwrap(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, HygraphError::UnknownModel(name) if name == "Seo"));
}

#[tokio::test]
async fn signed_webhook_is_verified_and_replay_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "post": post("2024-05-01T10:00:00Z", None) }
        })))
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.webhook_secret = Some("s3cret".into());
    let (source, cache) = source_with(config);

    let body = serde_json::to_vec(&notification("create", "Post", "p1")).unwrap();
    let stamped = StampedSignature::sign(
        &HmacSha256Verifier::new("s3cret"),
        &body,
        "master",
        chrono::Utc::now().timestamp_millis(),
    )
    .unwrap();
    let headers = HashMap::from([(SIGNATURE_HEADER.to_string(), stamped.to_header())]);

    let update = source.handle_webhook(&headers, &body).await.unwrap();
    assert!(update.is_some());
    assert!(cache.document_by_id("p1").is_some());

    let replay = source.handle_webhook(&headers, &body).await.unwrap_err();
    assert!(matches!(
        replay,
        HygraphError::Webhook(WebhookError::ReplayDetected { .. })
    ));

    let tampered = serde_json::to_vec(&notification("create", "Post", "p2")).unwrap();
    let err = source.handle_webhook(&headers, &tampered).await.unwrap_err();
    assert!(matches!(err, HygraphError::Webhook(WebhookError::InvalidSignature)));

    let missing = source.handle_webhook(&HashMap::new(), &body).await.unwrap_err();
    assert!(matches!(missing, HygraphError::Webhook(_)));
}

#[tokio::test]
async fn invalid_notification_body_is_rejected() {
    let server = MockServer::start().await;
    let (source, _cache) = source_with(config(&server));

    let body = serde_json::to_vec(&json!({ "operation": "archive", "data": {} })).unwrap();
    let err = source.handle_webhook(&HashMap::new(), &body).await.unwrap_err();
    assert!(matches!(err, HygraphError::Notification(_)));
}

#[tokio::test]
async fn mutation_failure_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{ "message": "document not found" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (source, _cache) = source_with(config(&server));
    let err = source
        .update_document("Post", "p1", json!({ "title": "New" }))
        .await
        .unwrap_err();

    match err {
        HygraphError::Mutation { operation, message } => {
            assert_eq!(operation, "updatePost");
            assert!(message.contains("document not found"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let queries = request_queries(&server).await;
    assert!(queries[0].starts_with("mutation($data: PostUpdateInput!) {"));
    assert!(queries[0].contains("updatePost(where: { id: \"p1\" }, data: $data)"));
}

async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| request.body_json().unwrap())
        .collect()
}

#[tokio::test]
async fn update_sends_enum_and_json_values_as_variables() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "updatePost": post("2024-05-02T10:00:00Z", None) }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (source, cache) = source_with(config(&server));
    source
        .update_document(
            "Post",
            "p1",
            json!({ "category": "NEWS", "meta": { "my-key": 1, "nested key": [true] } }),
        )
        .await
        .unwrap();

    let bodies = request_bodies(&server).await;
    let query = bodies[0]["query"].as_str().unwrap();
    assert!(query.starts_with("mutation($data: PostUpdateInput!) {"));
    assert!(query.contains("updatePost(where: { id: \"p1\" }, data: $data) {"));
    assert!(!query.contains("NEWS"));
    assert!(!query.contains("my-key"));

    let data = &bodies[0]["variables"]["data"];
    assert_eq!(data["category"], "NEWS");
    assert_eq!(data["meta"]["my-key"], 1);
    assert_eq!(data["meta"]["nested key"], json!([true]));
    assert!(cache.document_by_id("p1").is_some());
}

#[tokio::test]
async fn create_document_caches_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "createPost": post("2024-05-01T10:00:00Z", None) }
        })))
        .mount(&server)
        .await;

    let (source, cache) = source_with(config(&server));
    let created = source
        .create_document("Post", json!({ "title": "Hello" }))
        .await
        .unwrap();

    assert_eq!(created.id, "p1");
    assert!(cache.document_by_id("p1").is_some());

    let bodies = request_bodies(&server).await;
    let query = bodies[0]["query"].as_str().unwrap();
    assert!(query.starts_with("mutation($data: PostCreateInput!) {"));
    assert!(query.contains("createPost(data: $data) {"));
    assert_eq!(bodies[0]["variables"]["data"]["title"], "Hello");
}

#[tokio::test]
async fn deleting_an_asset_drops_it_from_the_asset_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "deleteAsset": { "id": "a1" } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (source, cache) = source_with(config(&server));
    cache.update_content(cms_hygraph::ContentUpdate {
        documents: vec![remote(post("2024-05-01T10:00:00Z", None))],
        assets: vec![remote(json!({ "__typename": "Asset", "id": "a1" }))],
        ..Default::default()
    });

    source.delete_document("Asset", "a1").await.unwrap();

    assert_eq!(cache.asset_count(), 0);
    assert_eq!(cache.document_count(), 1);
    let queries = request_queries(&server).await;
    assert!(queries[0].contains("deleteAsset(where: { id: \"a1\" })"));
}

#[test]
fn unusable_token_is_a_build_error() {
    let config = HygraphConfig::new(
        "http://localhost/content",
        "http://localhost/management",
        "line\nbreak",
        "project-1",
    );

    let err = HygraphContentSource::new(config, Arc::new(MemoryCache::new())).unwrap_err();
    assert!(matches!(err, HygraphError::Graphql(cms_graphql::GraphqlClientError::InvalidHeader(_))));
}

#[tokio::test]
async fn bulk_publish_failure_is_not_returned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/content"))
        .respond_with(ResponseTemplate::new(400).set_body_string("rejected"))
        .expect(1)
        .mount(&server)
        .await;

    let (source, _cache) = source_with(config(&server));
    source
        .publish_documents(&[DocumentRef::new("Post", "p1"), DocumentRef::new("Post", "p2")])
        .await;

    let queries = request_queries(&server).await;
    assert!(queries[0].contains("item0: publishPost(where: { id: \"p1\" }, to: PUBLISHED)"));
    assert!(queries[0].contains("item1: publishPost(where: { id: \"p2\" }, to: PUBLISHED)"));
}

#[tokio::test]
async fn single_publish_failure_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/content"))
        .respond_with(ResponseTemplate::new(400).set_body_string("rejected"))
        .mount(&server)
        .await;

    let (source, _cache) = source_with(config(&server));
    let err = source.unpublish_document("Post", "p1").await.unwrap_err();
    assert!(matches!(err, HygraphError::Mutation { ref operation, .. } if operation == "unpublishPost"));
}

#[tokio::test]
async fn operations_are_exhaustive_over_notification_kinds() {
    let kinds: Vec<_> = ["create", "update", "publish", "unpublish", "delete"]
        .into_iter()
        .map(|op| {
            ChangeNotification::from_value(notification(op, "Post", "p1"))
                .unwrap()
                .operation
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            NotificationOperation::Create,
            NotificationOperation::Update,
            NotificationOperation::Publish,
            NotificationOperation::Unpublish,
            NotificationOperation::Delete,
        ]
    );
}
