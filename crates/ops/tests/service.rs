#![forbid(unsafe_code)]

use deck_core::DeckError;
use deck_ops::ResourceService;
use deck_select::SelectionQuery;
use http::{Method, Request, Response, StatusCode};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::client::Body;
use kube::{Client, ResourceExt};
use serde_json::{json, Value};
use tower_test::mock::{self, Handle};

type ApiHandle = Handle<Request<Body>, Response<Body>>;

fn mock_client() -> (Client, ApiHandle) {
    let (svc, handle) = mock::pair::<Request<Body>, Response<Body>>();
    (Client::new(svc, "default"), handle)
}

fn respond(status: StatusCode, body: &Value) -> Response<Body> {
    Response::builder().status(status).body(Body::from(serde_json::to_vec(body).unwrap())).unwrap()
}

fn pod(name: &str, created: &str) -> Value {
    json!({"metadata": {"name": name, "namespace": "prod", "creationTimestamp": created}})
}

#[tokio::test]
async fn list_runs_the_server_items_through_selection() {
    let (client, mut handle) = mock_client();
    let server = tokio::spawn(async move {
        let (req, send) = handle.next_request().await.expect("list request");
        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.uri().path(), "/api/v1/namespaces/prod/pods");
        let items = vec![
            pod("web-1", "2024-01-01T00:00:00Z"),
            pod("db-1", "2024-01-03T00:00:00Z"),
            pod("web-2", "2024-01-02T00:00:00Z"),
            pod("web-3", "2023-12-31T00:00:00Z"),
        ];
        send.send_response(respond(StatusCode::OK, &json!({"apiVersion": "v1", "kind": "PodList", "metadata": {}, "items": items})));
    });

    let pods = ResourceService::<Pod>::new(client);
    let sel = pods.list(Some("prod"), &SelectionQuery::new("web", 2, 1).unwrap()).await.unwrap();
    server.await.unwrap();

    assert_eq!(sel.total, 3);
    let names: Vec<_> = sel.items.iter().map(|p| p.name_any()).collect();
    assert_eq!(names, vec!["web-2", "web-1"]);
}

#[tokio::test]
async fn list_without_namespace_spans_the_cluster() {
    let (client, mut handle) = mock_client();
    let server = tokio::spawn(async move {
        let (req, send) = handle.next_request().await.expect("list request");
        assert_eq!(req.uri().path(), "/api/v1/pods");
        send.send_response(respond(StatusCode::OK, &json!({"apiVersion": "v1", "kind": "PodList", "metadata": {}, "items": []})));
    });

    let pods = ResourceService::<Pod>::new(client);
    let sel = pods.list(None, &SelectionQuery::new("", 10, 1).unwrap()).await.unwrap();
    server.await.unwrap();
    assert_eq!(sel.total, 0);
}

#[tokio::test]
async fn missing_object_is_not_found() {
    let (client, mut handle) = mock_client();
    let server = tokio::spawn(async move {
        let (_req, send) = handle.next_request().await.expect("get request");
        let status = json!({
            "apiVersion": "v1", "kind": "Status", "metadata": {}, "status": "Failure",
            "message": "pods \"ghost\" not found", "reason": "NotFound", "code": 404
        });
        send.send_response(respond(StatusCode::NOT_FOUND, &status));
    });

    let pods = ResourceService::<Pod>::new(client);
    let err = pods.get(Some("prod"), "ghost").await.unwrap_err();
    server.await.unwrap();
    assert!(matches!(err, DeckError::NotFound(_)));
}

#[tokio::test]
async fn create_from_posts_into_the_document_namespace() {
    let (client, mut handle) = mock_client();
    let server = tokio::spawn(async move {
        let (req, send) = handle.next_request().await.expect("create request");
        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.uri().path(), "/apis/apps/v1/namespaces/staging/deployments");
        assert!(req.uri().query().unwrap_or_default().contains("fieldManager=ops-test"));
        let mut obj = json!({"apiVersion": "apps/v1", "kind": "Deployment"});
        obj["metadata"] = json!({"name": "web", "namespace": "staging", "uid": "1"});
        send.send_response(respond(StatusCode::CREATED, &obj));
    });

    let deployments = ResourceService::<Deployment>::new(client).with_field_manager("ops-test");
    let doc = r#"{"metadata":{"name":"web","namespace":"staging"},"spec":{"selector":{},"template":{}}}"#;
    let created = deployments.create_from(None, doc).await.unwrap();
    server.await.unwrap();
    assert_eq!(created.name_any(), "web");
    assert_eq!(created.uid().as_deref(), Some("1"));
}

#[tokio::test]
async fn create_from_needs_some_namespace() {
    let (client, _handle) = mock_client();
    let deployments = ResourceService::<Deployment>::new(client);
    let doc = r#"{"metadata":{"name":"web"},"spec":{"selector":{},"template":{}}}"#;
    assert!(matches!(deployments.create_from(None, doc).await, Err(DeckError::Validation(_))));
}
