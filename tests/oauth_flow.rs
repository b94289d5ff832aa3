use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use warp::http::StatusCode;
use warp::reply::Reply;

use kagi::backend::{AuthError, AuthenticatorBackend};
use kagi::config::ServerConfig;
use kagi::core::models::AccessData;
use kagi::core::types::{unix_now, AccessToken, ClientId, Password, Scope, UserData, UserId};
use kagi::db::{DbStore, MemoryStore, Store};
use kagi::http::login::LoginView;
use kagi::http::server::Server;
use kagi::provider::OAuth2Provider;

const AUTHORIZE: &str =
    "/authorize?response_type=code&client_id=c1&redirect_uri=https%3A%2F%2Fapp%2Fcb&state=xyz";
// c1:s1
const CLIENT_AUTH: &str = "Basic YzE6czE=";

struct Directory;

#[async_trait]
impl AuthenticatorBackend for Directory {
    type Profile = Value;

    async fn authenticate(&self, username: &str, password: &Password) -> Result<UserId, AuthError> {
        match (username, password.0.as_str()) {
            ("alice", "pw") => Ok(UserId("u42".into())),
            ("outage", _) => Err(AuthError::BackendUnavailable("directory offline".into())),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    async fn get_user_by_id(&self, id: &UserId) -> Result<Value, AuthError> {
        match id.0.as_str() {
            "u42" => Ok(json!({ "id": "u42", "name": "Alice" })),
            _ => Err(AuthError::NotFound),
        }
    }
}

struct Harness {
    provider: Arc<OAuth2Provider>,
    server: Server<Directory>,
}

async fn harness(store: Arc<dyn Store>) -> Harness {
    let provider = Arc::new(OAuth2Provider::new(store, ServerConfig::default()));
    provider
        .create_client("c1", "s1", "https://app/cb")
        .await
        .unwrap();

    // Answers with the view itself so tests can look at it.
    let login = |view: &LoginView| warp::reply::json(view).into_response();
    let server = Server::new(Arc::clone(&provider), Arc::new(Directory), Arc::new(login));

    Harness { provider, server }
}

async fn sqlite_harness() -> (tempfile::TempDir, Harness) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kagi.db");
    let store = DbStore::acquire(path.to_str().unwrap(), "kagi_").unwrap();
    store.create_schema().await.unwrap();
    (dir, harness(Arc::new(store)).await)
}

fn json_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

impl Harness {
    async fn authorize(&self, path: &str, body: &str) -> warp::http::Response<warp::hyper::body::Bytes> {
        warp::test::request()
            .method("POST")
            .path(path)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body.to_string())
            .reply(&self.server.routes())
            .await
    }

    async fn token(&self, body: &str) -> warp::http::Response<warp::hyper::body::Bytes> {
        warp::test::request()
            .method("POST")
            .path("/token")
            .header("authorization", CLIENT_AUTH)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body.to_string())
            .reply(&self.server.routes())
            .await
    }

    async fn get(&self, path: &str, bearer: &str) -> warp::http::Response<warp::hyper::body::Bytes> {
        warp::test::request()
            .method("GET")
            .path(path)
            .header("authorization", format!("Bearer {}", bearer))
            .reply(&self.server.routes())
            .await
    }

    /// Logs alice in and returns the issued code.
    async fn code(&self) -> String {
        let response = self.authorize(AUTHORIZE, "username=alice&password=pw").await;
        assert_eq!(response.status(), StatusCode::FOUND);

        let location = url::Url::parse(response.headers()["location"].to_str().unwrap()).unwrap();
        assert_eq!(location.origin().ascii_serialization(), "https://app");
        assert_eq!(location.path(), "/cb");

        let params: std::collections::HashMap<_, _> = location.query_pairs().into_owned().collect();
        assert_eq!(params["state"], "xyz");
        params["code"].clone()
    }

    async fn exchange(&self, code: &str) -> warp::http::Response<warp::hyper::body::Bytes> {
        self.token(&format!(
            "grant_type=authorization_code&code={}&redirect_uri=https%3A%2F%2Fapp%2Fcb",
            code
        ))
        .await
    }
}

async fn run_scenarios(h: Harness) {
    // S1
    let code = h.code().await;
    let response = h.exchange(&code).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["cache-control"], "no-store");
    let tokens = json_body(response.body());
    assert_eq!(tokens["token_type"], "Bearer");
    assert_eq!(tokens["expires_in"], 3600);
    let access_token = tokens["access_token"].as_str().unwrap().to_string();
    let refresh_token = tokens["refresh_token"].as_str().unwrap().to_string();

    let info = h.get("/tokeninfo", &access_token).await;
    assert_eq!(info.status(), StatusCode::OK);
    let info = json_body(info.body());
    assert_eq!(info["user_data"], "u42");
    assert_eq!(info["client_id"], "c1");

    // S3
    let replay = h.exchange(&code).await;
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(replay.body())["error"], "invalid_grant");

    // S4
    let profile = h.get("/userinfo", &access_token).await;
    assert_eq!(profile.status(), StatusCode::OK);
    assert_eq!(json_body(profile.body()), json!({ "id": "u42", "name": "Alice" }));

    // S5
    let refreshed = h
        .token(&format!("grant_type=refresh_token&refresh_token={}", refresh_token))
        .await;
    assert_eq!(refreshed.status(), StatusCode::OK);
    let refreshed = json_body(refreshed.body());
    let new_token = refreshed["access_token"].as_str().unwrap();
    assert_ne!(new_token, access_token);

    let info = json_body(h.get("/tokeninfo", new_token).await.body());
    assert_eq!(info["user_data"], "u42");

    let again = h
        .token(&format!("grant_type=refresh_token&refresh_token={}", refresh_token))
        .await;
    assert_eq!(again.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(again.body())["error"], "invalid_grant");

    // S2
    let response = h.authorize(AUTHORIZE, "username=alice&password=wrong").await;
    assert_eq!(response.status(), StatusCode::OK);
    let view = json_body(response.body());
    assert_eq!(view["has_error"], true);
    assert_eq!(view["error"], "Invalid Credentials.");
    assert!(!response.headers().contains_key("location"));

    // S6
    let response = warp::test::request()
        .method("GET")
        .path("/authorize?response_type=code&client_id=c1&redirect_uri=https%3A%2F%2Fevil%2Fcb&state=xyz")
        .reply(&h.server.routes())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!response.headers().contains_key("location"));
    assert_eq!(json_body(response.body())["error"], "invalid_request");
}

#[tokio::test]
async fn scenarios_with_memory_store() {
    run_scenarios(harness(Arc::new(MemoryStore::new())).await).await;
}

#[tokio::test]
async fn scenarios_with_sqlite_store() {
    let (_dir, h) = sqlite_harness().await;
    run_scenarios(h).await;
}

/// Codes, and tokens without a refresh token, that a sweep at the end of time removes.
async fn outstanding_codes(store: &Arc<dyn Store>) -> u64 {
    store.clean_up(i64::MAX, None).await.unwrap()
}

async fn rejected_logins_persist_nothing(h: Harness) {
    for body in [
        "username=alice&password=wrong",
        "username=&password=pw",
        "username=outage&password=pw",
    ] {
        let response = h.authorize(AUTHORIZE, body).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", body);
        assert_eq!(json_body(response.body())["has_error"], true, "{}", body);
    }
    assert_eq!(outstanding_codes(h.provider.store()).await, 0);

    h.code().await;
    assert_eq!(outstanding_codes(h.provider.store()).await, 1);
}

#[tokio::test]
async fn rejected_logins_persist_no_code_in_memory() {
    rejected_logins_persist_nothing(harness(Arc::new(MemoryStore::new())).await).await;
}

#[tokio::test]
async fn rejected_logins_persist_no_code_in_sqlite() {
    let (_dir, h) = sqlite_harness().await;
    rejected_logins_persist_nothing(h).await;
}

#[tokio::test]
async fn login_page_is_shown_before_credentials() {
    let h = harness(Arc::new(MemoryStore::new())).await;

    let response = warp::test::request()
        .method("GET")
        .path(AUTHORIZE)
        .reply(&h.server.routes())
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let view = json_body(response.body());
    assert_eq!(view["has_error"], false);
    let action = view["action"].as_str().unwrap();
    assert!(action.starts_with("/authorize?"));
    assert!(action.contains("state=xyz"));
}

#[tokio::test]
async fn denied_requests_redirect_with_access_denied() {
    let h = harness(Arc::new(MemoryStore::new())).await;

    let response = h.authorize(AUTHORIZE, "deny=1").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()["location"],
        "https://app/cb?error=access_denied&state=xyz"
    );
}

#[tokio::test]
async fn unavailable_backend_is_reported_on_the_login_page() {
    let h = harness(Arc::new(MemoryStore::new())).await;

    let response = h.authorize(AUTHORIZE, "username=outage&password=pw").await;
    assert_eq!(response.status(), StatusCode::OK);
    let view = json_body(response.body());
    assert_eq!(view["error"], "Service temporarily unavailable.");
}

#[tokio::test]
async fn password_grant_reaches_the_backend() {
    let h = harness(Arc::new(MemoryStore::new())).await;

    let response = h
        .token("grant_type=password&username=alice&password=pw")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let token = json_body(response.body())["access_token"]
        .as_str()
        .unwrap()
        .to_string();
    let info = json_body(h.get("/tokeninfo", &token).await.body());
    assert_eq!(info["user_data"], "u42");

    let response = h
        .token("grant_type=password&username=alice&password=wrong")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response.body())["error"], "access_denied");

    let response = h
        .token("grant_type=password&username=outage&password=pw")
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response.body())["error"], "temporarily_unavailable");
}

#[tokio::test]
async fn wrong_client_secret_is_unauthorized() {
    let h = harness(Arc::new(MemoryStore::new())).await;
    let code = h.code().await;

    let response = warp::test::request()
        .method("POST")
        .path("/token")
        // c1:nope
        .header("authorization", "Basic YzE6bm9wZQ==")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(format!(
            "grant_type=authorization_code&code={}&redirect_uri=https%3A%2F%2Fapp%2Fcb",
            code
        ))
        .reply(&h.server.routes())
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key("www-authenticate"));
    assert_eq!(json_body(response.body())["error"], "invalid_client");
}

#[tokio::test]
async fn expired_tokens_are_rejected() {
    let h = harness(Arc::new(MemoryStore::new())).await;

    let expired = AccessData {
        access_token: AccessToken("stale".into()),
        refresh_token: None,
        client_id: ClientId("c1".into()),
        scope: Scope::default(),
        redirect_uri: None,
        expires_in: 60,
        created_at: unix_now() - 3600,
        user_data: Some(UserData::from(UserId("u42".into()))),
        authorize_code: None,
        previous_access: None,
    };
    h.provider.store().save_access(&expired).await.unwrap();

    for path in ["/tokeninfo", "/userinfo"] {
        let response = h.get(path, "stale").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", path);
        assert_eq!(json_body(response.body())["error"], "invalid_grant");
    }

    assert_eq!(h.provider.clean_up().await.unwrap(), 1);
    let response = h.get("/tokeninfo", "stale").await;
    assert_eq!(json_body(response.body())["error"], "invalid_request");
}

#[tokio::test]
async fn login_route_renders_the_view() {
    let h = harness(Arc::new(MemoryStore::new())).await;

    let response = warp::test::request()
        .method("GET")
        .path("/login?response_type=code&client_id=c1")
        .reply(&h.server.routes())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response.body())["action"],
        "/authorize?response_type=code&client_id=c1"
    );
}

#[tokio::test]
async fn clients_round_trip_through_the_sqlite_store() {
    let (_dir, h) = sqlite_harness().await;
    let store = h.provider.store();

    let client = store.get_client(&ClientId("c1".into())).await.unwrap();
    assert_eq!(client.redirect_uri, "https://app/cb");

    h.provider.remove_client("c1").await.unwrap();
    h.provider.remove_client("c1").await.unwrap();
    assert!(store
        .get_client(&ClientId("c1".into()))
        .await
        .unwrap_err()
        .is_not_found());
}
