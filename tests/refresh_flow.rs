use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::{Arc, Mutex};

use lims_client::client::{ApiClient, ApiRequest, Navigator};
use lims_client::config::ClientConfig;
use lims_client::error::ClientError;
use lims_client::session::SessionStore;

/// Navigator that remembers where it was told to go.
struct RecordingNavigator {
    route: String,
    visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    fn at(route: &str) -> Arc<Self> {
        Arc::new(Self {
            route: route.to_string(),
            visits: Mutex::new(Vec::new()),
        })
    }

    fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn current_route(&self) -> String {
        self.route.clone()
    }

    fn goto(&self, route: &str) {
        self.visits.lock().unwrap().push(route.to_string());
    }
}

/// Point every service and the refresh call at the mock server.
fn config_for(server: &Server) -> ClientConfig {
    let mut cfg = ClientConfig::default();
    for route in &mut cfg.routes {
        route.base_url = server.url();
    }
    cfg.default_base_url = server.url();
    cfg.auth_base_url = server.url();
    cfg
}

async fn session_with_tokens(access: &str, refresh: Option<&str>) -> SessionStore {
    let store = SessionStore::new();
    store
        .set_tokens(access.to_string(), refresh.map(str::to_string))
        .await;
    store
}

#[tokio::test]
async fn bearer_header_attached_to_outbound_requests() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/patient/list")
        .match_header("authorization", "Bearer tok-1")
        .with_status(200)
        .with_body(r#"{"patients":[]}"#)
        .create_async()
        .await;

    let session = session_with_tokens("tok-1", Some("ref-1")).await;
    let client = ApiClient::new(config_for(&server), session).unwrap();

    let response = client.get("/patient/list").await.unwrap();
    assert_eq!(response.status(), 200);
    mock.assert_async().await;
}

#[tokio::test]
async fn no_bearer_header_without_token() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/roles")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let client = ApiClient::new(config_for(&server), SessionStore::new()).unwrap();

    let response = client.get("/roles").await.unwrap();
    assert_eq!(response.status(), 200);
    mock.assert_async().await;
}

#[tokio::test]
async fn absolute_urls_bypass_the_routing_table() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/terminology/loinc")
        .with_status(200)
        .create_async()
        .await;

    // Routing table points somewhere unreachable; only the bypass can hit
    // the mock server.
    let mut cfg = config_for(&server);
    for route in &mut cfg.routes {
        route.base_url = "http://127.0.0.1:1".to_string();
    }
    cfg.default_base_url = "http://127.0.0.1:1".to_string();

    let client = ApiClient::new(cfg, SessionStore::new()).unwrap();
    let url = format!("{}/terminology/loinc", server.url());

    let response = client.get(&url).await.unwrap();
    assert_eq!(response.status(), 200);
    mock.assert_async().await;
}

// Scenario A: expired access token, live refresh token. The request is
// retried exactly once with the rotated token and the caller only sees
// the retried response.
#[tokio::test]
async fn happy_refresh_retries_once_with_new_token() {
    let mut server = Server::new_async().await;
    let stale = server
        .mock("GET", "/patient/list")
        .match_header("authorization", "Bearer T1")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let retried = server
        .mock("GET", "/patient/list")
        .match_header("authorization", "Bearer T2")
        .with_status(200)
        .with_body(r#"{"patients":[{"id":1}]}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh-token")
        .match_body(Matcher::Json(json!({"refreshToken": "R1"})))
        .with_status(200)
        .with_body(json!({"data": {"accessToken": "T2"}}).to_string())
        .expect(1)
        .create_async()
        .await;

    let session = session_with_tokens("T1", Some("R1")).await;
    let client = ApiClient::new(config_for(&server), session).unwrap();

    let response = client.get("/patient/list").await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.text().await.unwrap(),
        r#"{"patients":[{"id":1}]}"#
    );
    assert_eq!(
        client.session().access_token().await.as_deref(),
        Some("T2")
    );
    // refresh token survives the rotation
    assert_eq!(
        client.session().refresh_token().await.as_deref(),
        Some("R1")
    );

    stale.assert_async().await;
    retried.assert_async().await;
    refresh.assert_async().await;
}

// Scenario B: the refresh endpoint rejects the token. Session is wiped,
// the caller gets the original 401 and exactly one redirect to the
// sign-in route fires.
#[tokio::test]
async fn failed_refresh_clears_session_and_redirects() {
    let mut server = Server::new_async().await;
    let original = server
        .mock("GET", "/patient/list")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh-token")
        .with_status(400)
        .with_body(r#"{"message":"refresh token revoked"}"#)
        .expect(1)
        .create_async()
        .await;

    let session = session_with_tokens("T1", Some("R1")).await;
    let navigator = RecordingNavigator::at("/dashboard");
    let client =
        ApiClient::with_navigator(config_for(&server), session, navigator.clone()).unwrap();

    let response = client.get("/patient/list").await.unwrap();
    assert_eq!(response.status(), 401);

    let session = client.session().get().await;
    assert!(session.access_token.is_none());
    assert!(session.refresh_token.is_none());
    assert!(session.user.is_none());
    assert_eq!(navigator.visits(), vec!["/signin".to_string()]);

    original.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn redirect_suppressed_on_public_routes() {
    let mut server = Server::new_async().await;
    let _original = server
        .mock("GET", "/patient/list")
        .with_status(401)
        .create_async()
        .await;
    let _refresh = server
        .mock("POST", "/auth/refresh-token")
        .with_status(400)
        .create_async()
        .await;

    let session = session_with_tokens("T1", Some("R1")).await;
    let navigator = RecordingNavigator::at("/signin");
    let client =
        ApiClient::with_navigator(config_for(&server), session, navigator.clone()).unwrap();

    let response = client.get("/patient/list").await.unwrap();
    assert_eq!(response.status(), 401);
    assert!(navigator.visits().is_empty());
}

// Scenario C: 401 from a pre-authentication endpoint is a credential
// failure, not session expiry. No refresh call, session untouched.
#[tokio::test]
async fn exempt_endpoint_401_passes_through() {
    let mut server = Server::new_async().await;
    let login = server
        .mock("POST", "/auth/login")
        .with_status(401)
        .with_body(r#"{"message":"invalid credentials"}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh-token")
        .expect(0)
        .create_async()
        .await;

    let session = session_with_tokens("T1", Some("R1")).await;
    let client = ApiClient::new(config_for(&server), session).unwrap();

    let response = client
        .execute(ApiRequest::post("/auth/login"))
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    assert_eq!(
        client.session().access_token().await.as_deref(),
        Some("T1")
    );

    login.assert_async().await;
    refresh.assert_async().await;
}

// Scenario D: a request that already went through its one retry is
// propagated immediately on a second 401.
#[tokio::test]
async fn already_retried_request_is_not_refreshed_again() {
    let mut server = Server::new_async().await;
    let _original = server
        .mock("GET", "/patient/list")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh-token")
        .expect(0)
        .create_async()
        .await;

    let session = session_with_tokens("T1", Some("R1")).await;
    let client = ApiClient::new(config_for(&server), session).unwrap();

    let response = client
        .execute(ApiRequest::get("/patient/list").into_retry())
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    refresh.assert_async().await;
}

// Scenario E: 401 with no refresh token held goes straight to the
// failure path without ever calling the refresh endpoint.
#[tokio::test]
async fn missing_refresh_token_fails_without_refresh_call() {
    let mut server = Server::new_async().await;
    let _original = server
        .mock("GET", "/orders/today")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh-token")
        .expect(0)
        .create_async()
        .await;

    let session = session_with_tokens("T1", None).await;
    let navigator = RecordingNavigator::at("/orders");
    let client =
        ApiClient::with_navigator(config_for(&server), session, navigator.clone()).unwrap();

    let response = client.get("/orders/today").await.unwrap();
    assert_eq!(response.status(), 401);
    assert!(client.session().get().await.access_token.is_none());
    assert_eq!(navigator.visits(), vec!["/signin".to_string()]);
    refresh.assert_async().await;
}

// A 401 from the refresh endpoint itself is fatal and must never
// trigger a recursive refresh.
#[tokio::test]
async fn refresh_endpoint_401_clears_session_without_recursion() {
    let mut server = Server::new_async().await;
    let refresh = server
        .mock("POST", "/auth/refresh-token")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let session = session_with_tokens("T1", Some("R1")).await;
    let client = ApiClient::new(config_for(&server), session).unwrap();

    let response = client
        .execute(ApiRequest::post("/auth/refresh-token"))
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    assert!(client.session().get().await.access_token.is_none());
    refresh.assert_async().await;
}

// Two requests hitting 401 at the same time share one refresh call;
// the second retries with whatever token the first produced.
#[tokio::test]
async fn concurrent_401s_share_a_single_refresh() {
    let mut server = Server::new_async().await;
    let mut mocks = Vec::new();
    for path in ["/patient/a", "/patient/b"] {
        mocks.push(
            server
                .mock("GET", path)
                .match_header("authorization", "Bearer T1")
                .with_status(401)
                .create_async()
                .await,
        );
        mocks.push(
            server
                .mock("GET", path)
                .match_header("authorization", "Bearer T2")
                .with_status(200)
                .with_body("{}")
                .create_async()
                .await,
        );
    }
    let refresh = server
        .mock("POST", "/auth/refresh-token")
        .with_status(200)
        .with_body(json!({"data": {"accessToken": "T2"}}).to_string())
        .expect(1)
        .create_async()
        .await;

    let session = session_with_tokens("T1", Some("R1")).await;
    let client = Arc::new(ApiClient::new(config_for(&server), session).unwrap());

    let (a, b) = tokio::join!(client.get("/patient/a"), client.get("/patient/b"));
    assert_eq!(a.unwrap().status(), 200);
    assert_eq!(b.unwrap().status(), 200);
    assert_eq!(
        client.session().access_token().await.as_deref(),
        Some("T2")
    );
    refresh.assert_async().await;
}

#[tokio::test]
async fn typed_helpers_surface_non_2xx_as_status_errors() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/warehouse/stock")
        .with_status(500)
        .with_body("backend down")
        .create_async()
        .await;

    let session = session_with_tokens("T1", Some("R1")).await;
    let client = ApiClient::new(config_for(&server), session).unwrap();

    let err = client
        .get_json::<serde_json::Value>("/warehouse/stock")
        .await
        .unwrap_err();
    match err {
        ClientError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "backend down");
        }
        other => panic!("unexpected error: {other}"),
    }
}
