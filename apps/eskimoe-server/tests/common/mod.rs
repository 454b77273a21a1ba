#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::Router;
use axum_test::TestServer;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use eskimoe_common::id::{prefix, prefixed_ulid};
use eskimoe_server::config::Config;
use eskimoe_server::db::memory::MemoryStore;
use eskimoe_server::db::seed::ensure_server;
use eskimoe_server::gateway::hub::{Hub, HubConfig};
use eskimoe_server::gateway::subscriber::{Frame, Subscriber};
use eskimoe_server::models::server::ServerMode;
use eskimoe_server::AppState;

pub const OWNER_ID: &str = "owner-0001";
pub const OWNER_TOKEN: &str = "owner-secret";

/// Ids created by the first-run seed on an empty store.
pub const GENERAL_CATEGORY: i32 = 1;
pub const CHAT_ROOM: i32 = 1;
pub const EVERYONE_ROLE: i32 = 1;

pub fn test_config(mode: ServerMode) -> Config {
    Config {
        name: "Testing".to_string(),
        message: "Test server".to_string(),
        port: 0,
        owner_id: OWNER_ID.to_string(),
        owner_token: OWNER_TOKEN.to_string(),
        database_url: None,
        passphrase: (mode == ServerMode::Passphrase).then(|| "open sesame".to_string()),
        mode,
        hub_outbound_buffer: 64,
        hub_broadcast_queue: 1024,
        ws_write_timeout: Duration::from_secs(2),
    }
}

/// Seeded in-memory state with a running hub. The concrete store is
/// returned too so tests can inject faults.
pub async fn test_state(mode: ServerMode) -> (AppState, Arc<MemoryStore>) {
    state_with_config(test_config(mode)).await
}

pub async fn state_with_config(config: Config) -> (AppState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    ensure_server(store.as_ref(), &config)
        .await
        .expect("seed server");
    let (hub, _task) = Hub::start(HubConfig::from(&config));
    let state = AppState {
        store: store.clone(),
        hub,
        config: Arc::new(config),
    };
    (state, store)
}

pub fn app(state: AppState) -> Router {
    eskimoe_server::routes::router().with_state(state)
}

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
}

pub async fn test_app() -> TestApp {
    test_app_with_mode(ServerMode::Open).await
}

pub async fn test_app_with_mode(mode: ServerMode) -> TestApp {
    test_app_with_config(test_config(mode)).await
}

pub async fn test_app_with_config(config: Config) -> TestApp {
    let (state, store) = state_with_config(config).await;
    let server = TestServer::new(app(state.clone())).unwrap();
    TestApp {
        server,
        state,
        store,
    }
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Joins as a regular member and returns `(member_id, token)`.
pub async fn join(server: &TestServer, unique_id: &str, display_name: &str) -> (i32, String) {
    let resp = server
        .post("/join")
        .json(&json!({
            "unique_id": unique_id,
            "unique_token": format!("identity-{unique_id}"),
            "display_name": display_name,
        }))
        .await;
    resp.assert_status(StatusCode::CREATED);
    let body: Value = resp.json();
    (
        body["member"]["id"].as_i64().unwrap() as i32,
        body["token"].as_str().unwrap().to_string(),
    )
}

pub async fn join_owner(server: &TestServer) -> (i32, String) {
    let resp = server
        .post("/join")
        .json(&json!({
            "unique_id": OWNER_ID,
            "unique_token": OWNER_TOKEN,
            "display_name": "Owner",
        }))
        .await;
    resp.assert_status(StatusCode::CREATED);
    let body: Value = resp.json();
    (
        body["member"]["id"].as_i64().unwrap() as i32,
        body["token"].as_str().unwrap().to_string(),
    )
}

/// Creates a room in the General category as `token`, returning its id.
pub async fn create_room(server: &TestServer, token: &str, name: &str) -> i32 {
    let resp = server
        .post("/rooms")
        .add_header(AUTHORIZATION, bearer(token))
        .json(&json!({ "name": name, "category_id": GENERAL_CATEGORY }))
        .await;
    resp.assert_status(StatusCode::CREATED);
    resp.json::<Value>()["id"].as_i64().unwrap() as i32
}

pub async fn send_message(server: &TestServer, token: &str, room_id: i32, content: &str) -> i32 {
    let resp = server
        .post(&format!("/rooms/{room_id}/messages"))
        .add_header(AUTHORIZATION, bearer(token))
        .json(&json!({ "content": content }))
        .await;
    resp.assert_status(StatusCode::CREATED);
    resp.json::<Value>()["id"].as_i64().unwrap() as i32
}

/// Creates a role with `permissions` as the owner and assigns it to
/// `member_id`.
pub async fn grant(
    server: &TestServer,
    owner_token: &str,
    member_id: i32,
    name: &str,
    permissions: &[&str],
) -> i32 {
    let resp = server
        .post("/roles")
        .add_header(AUTHORIZATION, bearer(owner_token))
        .json(&json!({ "name": name, "permissions": permissions }))
        .await;
    resp.assert_status(StatusCode::CREATED);
    let role_id = resp.json::<Value>()["id"].as_i64().unwrap() as i32;

    server
        .put(&format!("/members/{member_id}/roles"))
        .add_header(AUTHORIZATION, bearer(owner_token))
        .json(&json!({ "role_ids": [role_id] }))
        .await
        .assert_status_ok();
    role_id
}

/// Registers a bare subscriber with the hub and waits until it is live.
pub async fn subscribe(state: &AppState, member_id: i32) -> mpsc::Receiver<Frame> {
    let (subscriber, rx) = Subscriber::channel(prefixed_ulid(prefix::CONNECTION), member_id, 64);
    state.hub.register(subscriber);
    state.hub.connection_count().await;
    rx
}

pub async fn next_event(rx: &mut mpsc::Receiver<Frame>) -> Value {
    let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("subscriber closed");
    serde_json::from_str(&frame).expect("event is JSON")
}

/// Asserts nothing was delivered. The count query is answered only once the
/// hub has drained every broadcast submitted before it.
pub async fn assert_no_event(state: &AppState, rx: &mut mpsc::Receiver<Frame>) {
    state.hub.connection_count().await;
    assert!(rx.try_recv().is_err(), "unexpected event delivered");
}
