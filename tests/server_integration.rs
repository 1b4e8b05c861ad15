// tests/server_integration.rs

//! End-to-end tests against the router: protocol contract, auth gate,
//! rate limiting, cache self-healing, and artifact mirroring.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use base64::Engine;
use canister::db::models::{Package, Repository, Session, SourceType, Token, Version};
use canister::db::schema;
use canister::server::{create_router, ServerConfig, ServerState};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestServer {
    _dir: TempDir,
    state: Arc<ServerState>,
}

impl TestServer {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = ServerConfig {
            db_path: dir.path().join("canister.db"),
            storage_dir: dir.path().join("blobs"),
            sync_poll_interval: None,
            ..Default::default()
        };
        let conn = canister::db::open(&config.db_path).unwrap();
        schema::migrate(&conn).unwrap();
        drop(conn);

        Self {
            _dir: dir,
            state: Arc::new(ServerState::new(config)),
        }
    }

    fn conn(&self) -> rusqlite::Connection {
        canister::db::open(&self.state.config.db_path).unwrap()
    }

    fn add_token(&self, value: &str, rate_limit: Option<i64>) {
        let conn = self.conn();
        let mut token = Token::new(value.to_string(), None);
        token.rate_limit = rate_limit;
        token.insert(&conn).unwrap();
    }

    fn add_session(&self, value: &str) {
        let conn = self.conn();
        Session {
            id: None,
            value: value.to_string(),
            expires_at: "2999-01-01T00:00:00+00:00".to_string(),
            created_at: None,
        }
        .insert(&conn)
        .unwrap();
    }

    fn seed_package(&self, vendor: &str, name: &str, versions: &[(&str, &str)]) -> i64 {
        let conn = self.conn();
        let mut repo = Repository::new(
            format!("repo-{vendor}-{name}"),
            "https://origin.example.com".to_string(),
            SourceType::Composer,
        );
        let repo_id = repo.insert(&conn).unwrap();

        let pkg = Package::upsert(&conn, Some(repo_id), vendor, name, None).unwrap();
        for (version, dist_url) in versions {
            Version {
                id: None,
                package_id: pkg.id.unwrap(),
                version: version.to_string(),
                dist_url: dist_url.to_string(),
                source_reference: Some(format!("ref-{version}")),
                require_json: None,
                readme_url: None,
                changelog_url: None,
                created_at: None,
            }
            .upsert(&conn)
            .unwrap();
        }
        repo_id
    }

    async fn get(&self, uri: &str, auth: Option<&str>) -> (StatusCode, Vec<u8>) {
        let app = create_router(self.state.clone());
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = auth {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = app
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 10 * 1024 * 1024)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }
}

fn json_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn root_index_requires_credentials() {
    let server = TestServer::new();

    let (status, body) = server.get("/packages.json", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let body = json_body(&body);
    assert!(body["correlation_id"].is_string());
}

#[tokio::test]
async fn root_index_lists_available_packages() {
    let server = TestServer::new();
    server.add_token("tok", None);
    server.seed_package("acme", "widget", &[("1.0.0", "https://o.example.com/w.zip")]);

    let (status, body) = server.get("/packages.json", Some("tok")).await;
    assert_eq!(status, StatusCode::OK);

    let body = json_body(&body);
    assert_eq!(body["metadata-url"], "/p2/%package%.json");
    assert_eq!(body["available-packages"][0], "acme/widget");
}

#[tokio::test]
async fn provider_document_is_complete_and_descending() {
    let server = TestServer::new();
    server.add_token("tok", None);
    server.seed_package(
        "acme",
        "widget",
        &[
            ("1.0.0", "https://o.example.com/w-1.0.0.zip"),
            ("2.0.0", "https://o.example.com/w-2.0.0.zip"),
            ("1.5.0", "https://o.example.com/w-1.5.0.zip"),
        ],
    );

    let (status, body) = server.get("/p2/acme/widget.json", Some("tok")).await;
    assert_eq!(status, StatusCode::OK);

    let body = json_body(&body);
    // The packages value must be a structured object, never a scalar
    assert!(body["packages"].is_object());

    let entries = body["packages"]["acme/widget"].as_array().unwrap();
    assert_eq!(entries.len(), 3);
    let versions: Vec<&str> = entries
        .iter()
        .map(|e| e["version"].as_str().unwrap())
        .collect();
    assert_eq!(versions, vec!["2.0.0", "1.5.0", "1.0.0"]);
}

#[tokio::test]
async fn dev_channel_is_served_separately() {
    let server = TestServer::new();
    server.add_token("tok", None);
    server.seed_package(
        "acme",
        "widget",
        &[
            ("1.0.0", "https://o.example.com/w-1.0.0.zip"),
            ("dev-main", "https://o.example.com/w-dev.zip"),
        ],
    );

    let (_, body) = server.get("/p2/acme/widget~dev.json", Some("tok")).await;
    let entries = json_body(&body)["packages"]["acme/widget"]
        .as_array()
        .unwrap()
        .clone();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["version"], "dev-main");
}

#[tokio::test]
async fn corrupted_cache_value_never_reaches_the_client() {
    let server = TestServer::new();
    server.add_token("tok", None);
    server.seed_package("acme", "widget", &[("1.0.0", "https://o.example.com/w.zip")]);

    // Simulate a double-encoded cache write: the value parses to a
    // bare string instead of an object
    server
        .state
        .kv
        .put(
            "p2:acme/widget",
            "\"{\\\"packages\\\":{}}\"".to_string(),
            None,
        )
        .await;

    let (status, body) = server.get("/p2/acme/widget.json", Some("tok")).await;
    assert_eq!(status, StatusCode::OK);

    let body = json_body(&body);
    assert!(body["packages"].is_object(), "served document must be structured");
    assert_eq!(body["packages"]["acme/widget"].as_array().unwrap().len(), 1);

    // The poisoned entry was healed away
    assert!(server.state.kv.get("p2:acme/widget").await.is_none() || {
        let healed: Value =
            serde_json::from_str(&server.state.kv.get("p2:acme/widget").await.unwrap()).unwrap();
        healed.is_object()
    });
}

#[tokio::test]
async fn unknown_package_is_structured_not_found() {
    let server = TestServer::new();
    server.add_token("tok", None);

    let (status, body) = server.get("/p2/acme/nonesuch.json", Some("tok")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json_body(&body)["correlation_id"].is_string());
}

#[tokio::test]
async fn rate_limited_token_gets_429_with_retry_hint() {
    let server = TestServer::new();
    server.add_token("tok", Some(2));
    server.seed_package("acme", "widget", &[("1.0.0", "https://o.example.com/w.zip")]);

    for _ in 0..2 {
        let (status, _) = server.get("/packages.json", Some("tok")).await;
        assert_eq!(status, StatusCode::OK);
    }

    let app = create_router(server.state.clone());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/packages.json")
                .header(header::AUTHORIZATION, "Bearer tok")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn artifact_endpoints_accept_basic_token_auth() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/w-1.0.0.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"zip".to_vec()))
        .mount(&origin)
        .await;

    let server = TestServer::new();
    server.add_token("tok", None);
    let repo_id = server.seed_package(
        "acme",
        "widget",
        &[("1.0.0", &format!("{}/w-1.0.0.zip", origin.uri()))],
    );

    let encoded = base64::engine::general_purpose::STANDARD.encode("token:tok");
    let app = create_router(server.state.clone());
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/dist/{repo_id}/acme/widget/1.0.0"))
                .header(header::AUTHORIZATION, format!("Basic {encoded}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
}

#[tokio::test]
async fn artifact_endpoints_accept_admin_sessions_but_documents_do_not() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/w-1.0.0.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"zip".to_vec()))
        .mount(&origin)
        .await;

    let server = TestServer::new();
    server.add_session("sess");
    server.seed_package(
        "acme",
        "widget",
        &[("1.0.0", &format!("{}/w-1.0.0.zip", origin.uri()))],
    );

    let (status, _) = server.get("/dist/m/acme/widget/1.0.0", Some("sess")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = server.get("/packages.json", Some("sess")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn second_artifact_request_is_served_from_storage() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/w-1.0.0.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"zip bytes".to_vec()))
        .expect(1)
        .mount(&origin)
        .await;

    let server = TestServer::new();
    server.add_token("tok", None);
    server.seed_package(
        "acme",
        "widget",
        &[("1.0.0", &format!("{}/w-1.0.0.zip", origin.uri()))],
    );

    let (status, body) = server.get("/dist/m/acme/widget/1.0.0", Some("tok")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"zip bytes");

    // Wait for the deferred write to land before the second request
    let key = "dist/1/acme/widget/widget-1.0.0.zip";
    let mut stored = false;
    for _ in 0..100 {
        let blob_path = server.state.config.storage_dir.join(key);
        if blob_path.exists() {
            stored = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(stored, "deferred artifact write never landed");

    // expect(1) on the mock verifies no second origin fetch
    let (status, body) = server.get("/dist/m/acme/widget/1.0.0", Some("tok")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"zip bytes");
}

#[tokio::test]
async fn lockfile_form_resolves_by_reference() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/w-1.0.0.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"zip".to_vec()))
        .mount(&origin)
        .await;

    let server = TestServer::new();
    server.add_token("tok", None);
    server.seed_package(
        "acme",
        "widget",
        &[("1.0.0", &format!("{}/w-1.0.0.zip", origin.uri()))],
    );

    let (status, _) = server
        .get("/dist/acme/widget/1.0.0/ref-1.0.0", Some("tok"))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_artifact_is_not_found() {
    let server = TestServer::new();
    server.add_token("tok", None);

    let (status, body) = server.get("/dist/m/acme/widget/9.9.9", Some("tok")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json_body(&body)["correlation_id"].is_string());
}
