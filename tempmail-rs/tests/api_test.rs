//! JSON API tests driven through the router without a socket

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Instant;
use tempmail_rs::api::{ApiServer, AppState};
use tempmail_rs::registry::Domain;
use tempmail_rs::storage::Message;
use tempmail_rs::{DomainRegistry, MailStore};
use tower::ServiceExt;

struct Fixture {
    router: Router,
    registry: Arc<DomainRegistry>,
    store: Arc<MailStore>,
}

fn fixture(domains: Vec<Domain>) -> Fixture {
    let registry = Arc::new(DomainRegistry::in_memory(domains));
    let store = Arc::new(MailStore::in_memory(registry.clone()));
    let state = AppState {
        registry: registry.clone(),
        store: store.clone(),
        smtp_listeners: Arc::new(AtomicUsize::new(2)),
        started_at: Instant::now(),
    };
    let router = ApiServer::new(state, "127.0.0.1:0".to_string()).router();
    Fixture {
        router,
        registry,
        store,
    }
}

fn two_domains() -> Fixture {
    fixture(vec![Domain::new("a.test", 2525, 10), Domain::new("b.test", 2526, 10)])
}

async fn call(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = router
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn deliver(store: &MailStore, to: &str, domain: &str, body: &str) -> Message {
    store
        .ingest(Message::received(
            "sender@remote.test".to_string(),
            vec![to.to_string()],
            domain.to_string(),
            body.to_string(),
        ))
        .await
}

#[tokio::test]
async fn test_health() {
    let f = two_domains();
    let (status, body) = call(&f.router, Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_list_and_toggle_domains() {
    let f = two_domains();

    let (status, body) = call(&f.router, Method::GET, "/api/domains", None).await;
    assert_eq!(status, StatusCode::OK);
    let domains = body["domains"].as_array().unwrap();
    assert_eq!(domains.len(), 2);
    assert_eq!(domains[0]["name"], "a.test");
    assert_eq!(domains[0]["maxAccepted"], 10);

    let (status, body) = call(
        &f.router,
        Method::PUT,
        "/api/domains/a.test",
        Some(serde_json::json!({ "enabled": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], false);
    assert!(!f.registry.get("a.test").await.unwrap().enabled);

    let (status, body) = call(
        &f.router,
        Method::PUT,
        "/api/domains/missing.test",
        Some(serde_json::json!({ "enabled": true })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Domain not found");
}

#[tokio::test]
async fn test_list_emails_filters_and_pages() {
    let f = two_domains();
    deliver(&f.store, "x@a.test", "a.test", "Subject: first\r\n\r\nhello").await;
    deliver(&f.store, "y@a.test", "a.test", "Subject: second\r\n\r\nworld").await;
    deliver(&f.store, "z@b.test", "b.test", "Subject: third\r\n\r\nhello").await;

    let (status, body) = call(&f.router, Method::GET, "/api/emails?domain=a.test", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["emails"][0]["subject"], "second");

    let (_, body) = call(&f.router, Method::GET, "/api/emails?search=hello", None).await;
    assert_eq!(body["total"], 2);

    let (_, body) = call(&f.router, Method::GET, "/api/emails?recipient=z%40b", None).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["emails"][0]["domain"], "b.test");

    let (_, body) = call(&f.router, Method::GET, "/api/emails?page=2&limit=2", None).await;
    assert_eq!(body["page"], 2);
    assert_eq!(body["totalPages"], 2);
    assert_eq!(body["emails"].as_array().unwrap().len(), 1);
    assert_eq!(body["emails"][0]["subject"], "first");
}

#[tokio::test]
async fn test_read_and_delete_email() {
    let f = two_domains();
    let message = deliver(&f.store, "x@a.test", "a.test", "Subject: hi\r\n\r\nbody").await;
    let uri = format!("/api/emails/{}", message.id);

    let (status, body) = call(&f.router, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subject"], "hi");
    assert_eq!(body["read"], false);

    let (status, _) = call(&f.router, Method::POST, &format!("{}/read", uri), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(f.store.get(&message.id).await.unwrap().read);

    let (status, _) = call(&f.router, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(f.registry.get("a.test").await.unwrap().accepted, 0);

    let (status, body) = call(&f.router, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Email not found");

    let (status, _) = call(&f.router, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stats() {
    let f = two_domains();
    deliver(&f.store, "x@a.test", "a.test", "one").await;
    deliver(&f.store, "y@b.test", "b.test", "two").await;

    let (status, body) = call(&f.router, Method::GET, "/api/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["domains"]["total"], 2);
    assert_eq!(body["domains"]["totalAccepted"], 2);
    assert_eq!(body["emails"]["total"], 2);
    assert_eq!(body["emails"]["unread"], 2);
    assert_eq!(body["emails"]["byDomain"]["a.test"], 1);
    assert_eq!(body["system"]["smtpListeners"], 2);
}

#[tokio::test]
async fn test_generate_email_rotates_domains() {
    let f = two_domains();

    let (status, first) = call(&f.router, Method::GET, "/api/generate-email", None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = call(&f.router, Method::GET, "/api/generate-email", None).await;

    assert_ne!(first["domain"], second["domain"]);
    let email = first["email"].as_str().unwrap();
    let (local, domain) = email.split_once('@').unwrap();
    assert_eq!(local.len(), 10);
    assert_eq!(domain, first["domain"].as_str().unwrap());
}

#[tokio::test]
async fn test_generate_email_without_domains() {
    let f = fixture(vec![]);
    let (status, body) = call(&f.router, Method::GET, "/api/generate-email", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "No available domains");
}
