mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use serde_json::{json, Value};

use common::bearer;
use eskimoe_server::models::server::ServerMode;

// ---------------------------------------------------------------------------
// POST /join
// ---------------------------------------------------------------------------

#[tokio::test]
async fn join_returns_member_and_token() {
    let app = common::test_app().await;

    let resp = app
        .server
        .post("/join")
        .json(&json!({
            "unique_id": "alice-1",
            "unique_token": "identity",
            "display_name": "Alice",
        }))
        .await;

    resp.assert_status(StatusCode::CREATED);
    let body: Value = resp.json();
    let token = body["token"].as_str().unwrap();
    assert!(token.starts_with("tok_"));
    assert_eq!(body["member"]["display_name"], "Alice");
    assert_eq!(body["member"]["status"], "online");
    assert_eq!(body["member"]["role_ids"], json!([common::EVERYONE_ROLE]));
    assert!(body["member"].get("token_hash").is_none());

    let me = app
        .server
        .get("/me")
        .add_header(AUTHORIZATION, bearer(token))
        .await;
    me.assert_status_ok();
    assert_eq!(me.json::<Value>()["unique_id"], "alice-1");
}

#[tokio::test]
async fn join_broadcasts_member_joined() {
    let app = common::test_app().await;
    let mut rx = common::subscribe(&app.state, 0).await;

    common::join(&app.server, "bob-1", "Bob").await;

    let event = common::next_event(&mut rx).await;
    assert_eq!(event["broadcast_type"], 14);
    assert_eq!(event["data"]["display_name"], "Bob");
}

#[tokio::test]
async fn join_validates_required_fields() {
    let app = common::test_app().await;

    let resp = app
        .server
        .post("/join")
        .json(&json!({ "unique_id": "  ", "display_name": "Nameless" }))
        .await;

    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    let fields: Vec<&str> = body["error"]["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, ["unique_id", "unique_token"]);
}

#[tokio::test]
async fn owner_must_present_owner_token() {
    let app = common::test_app().await;

    let resp = app
        .server
        .post("/join")
        .json(&json!({
            "unique_id": common::OWNER_ID,
            "unique_token": "guess",
            "display_name": "Impostor",
        }))
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);

    common::join_owner(&app.server).await;
}

#[tokio::test]
async fn joining_twice_conflicts() {
    let app = common::test_app().await;
    common::join(&app.server, "carol-1", "Carol").await;

    let resp = app
        .server
        .post("/join")
        .json(&json!({
            "unique_id": "carol-1",
            "unique_token": "identity",
            "display_name": "Carol",
        }))
        .await;
    resp.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn member_who_left_can_rejoin() {
    let app = common::test_app().await;
    let (member_id, token) = common::join(&app.server, "dave-1", "Dave").await;

    app.server
        .post("/leave")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    app.server
        .get("/me")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let (rejoined_id, new_token) = common::join(&app.server, "dave-1", "David").await;
    assert_eq!(rejoined_id, member_id);
    assert_ne!(new_token, token);
}

// ---------------------------------------------------------------------------
// Admission modes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invite_only_server_consumes_invites() {
    let app = common::test_app_with_mode(ServerMode::InviteOnly).await;
    let (_, owner) = common::join_owner(&app.server).await;

    let join = |invite: Option<&str>, unique_id: &str| {
        let mut body = json!({
            "unique_id": unique_id,
            "unique_token": "identity",
            "display_name": "Guest",
        });
        if let Some(code) = invite {
            body["invite"] = json!(code);
        }
        app.server.post("/join").json(&body)
    };

    join(None, "guest-1").await.assert_status(StatusCode::FORBIDDEN);

    let invite: Value = app
        .server
        .post("/invites")
        .add_header(AUTHORIZATION, bearer(&owner))
        .await
        .json();
    let code = invite["code"].as_str().unwrap();
    assert!(code.starts_with("inv_"));

    let joined = join(Some(code), "guest-1").await;
    joined.assert_status(StatusCode::CREATED);
    let guest_id = joined.json::<Value>()["member"]["id"].clone();

    join(Some(code), "guest-2").await.assert_status(StatusCode::FORBIDDEN);

    let invites: Vec<Value> = app
        .server
        .get("/invites")
        .add_header(AUTHORIZATION, bearer(&owner))
        .await
        .json();
    assert_eq!(invites[0]["used"], true);
    assert_eq!(invites[0]["used_by"], guest_id);
}

#[tokio::test]
async fn passphrase_server_checks_passphrase() {
    let app = common::test_app_with_mode(ServerMode::Passphrase).await;

    let attempt = |passphrase: &str| {
        app.server.post("/join").json(&json!({
            "unique_id": "erin-1",
            "unique_token": "identity",
            "display_name": "Erin",
            "passphrase": passphrase,
        }))
    };

    attempt("wrong").await.assert_status(StatusCode::FORBIDDEN);
    attempt("open sesame").await.assert_status(StatusCode::CREATED);
}

// ---------------------------------------------------------------------------
// PATCH /me
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_me_broadcasts_member_updated() {
    let app = common::test_app().await;
    let (member_id, token) = common::join(&app.server, "fran-1", "Fran").await;
    let mut rx = common::subscribe(&app.state, member_id).await;

    let resp = app
        .server
        .patch("/me")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "display_name": "Frances", "pronouns": "she/her" }))
        .await;

    resp.assert_status_ok();
    let event = common::next_event(&mut rx).await;
    assert_eq!(event["broadcast_type"], 19);
    assert_eq!(event["data"]["display_name"], "Frances");
    assert_eq!(event["data"]["pronouns"], "she/her");
}

#[tokio::test]
async fn unchanged_profile_emits_nothing() {
    let app = common::test_app().await;
    let (member_id, token) = common::join(&app.server, "gus-1", "Gus").await;
    let mut rx = common::subscribe(&app.state, member_id).await;

    app.server
        .patch("/me")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "display_name": "Gus" }))
        .await
        .assert_status_ok();

    common::assert_no_event(&app.state, &mut rx).await;
}

// ---------------------------------------------------------------------------
// Moderation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn kick_requires_permission() {
    let app = common::test_app().await;
    let (_, token) = common::join(&app.server, "hal-1", "Hal").await;
    let (victim, _) = common::join(&app.server, "ida-1", "Ida").await;

    app.server
        .post(&format!("/members/{victim}/kick"))
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn owner_kicks_member() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;
    let (victim, victim_token) = common::join(&app.server, "jan-1", "Jan").await;
    let mut rx = common::subscribe(&app.state, 0).await;

    let resp = app
        .server
        .post(&format!("/members/{victim}/kick"))
        .add_header(AUTHORIZATION, bearer(&owner))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>()["status"], "left");

    let event = common::next_event(&mut rx).await;
    assert_eq!(event["broadcast_type"], 17);
    assert_eq!(event["data"]["id"], victim);

    app.server
        .get("/me")
        .add_header(AUTHORIZATION, bearer(&victim_token))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let logs: Vec<Value> = app
        .server
        .get("/logs")
        .add_header(AUTHORIZATION, bearer(&owner))
        .await
        .json();
    assert_eq!(logs[0]["type"], "member_kicked");
}

#[tokio::test]
async fn owner_cannot_be_kicked() {
    let app = common::test_app().await;
    let (owner_id, owner) = common::join_owner(&app.server).await;
    let (mod_id, moderator) = common::join(&app.server, "kim-1", "Kim").await;
    common::grant(&app.server, &owner, mod_id, "Mods", &["kick_members"]).await;

    app.server
        .post(&format!("/members/{owner_id}/kick"))
        .add_header(AUTHORIZATION, bearer(&moderator))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    app.server
        .post(&format!("/members/{mod_id}/kick"))
        .add_header(AUTHORIZATION, bearer(&moderator))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn banned_member_cannot_rejoin_until_unbanned() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;
    let (victim, _) = common::join(&app.server, "lou-1", "Lou").await;
    let mut rx = common::subscribe(&app.state, 0).await;

    app.server
        .post(&format!("/members/{victim}/ban"))
        .add_header(AUTHORIZATION, bearer(&owner))
        .await
        .assert_status_ok();
    assert_eq!(common::next_event(&mut rx).await["broadcast_type"], 16);

    let resp = app
        .server
        .post("/join")
        .json(&json!({
            "unique_id": "lou-1",
            "unique_token": "identity",
            "display_name": "Lou",
        }))
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);

    app.server
        .delete(&format!("/members/{victim}/ban"))
        .add_header(AUTHORIZATION, bearer(&owner))
        .await
        .assert_status_ok();
    assert_eq!(common::next_event(&mut rx).await["broadcast_type"], 18);

    common::join(&app.server, "lou-1", "Lou").await;
}

// ---------------------------------------------------------------------------
// PUT /members/{id}/roles
// ---------------------------------------------------------------------------

#[tokio::test]
async fn assigning_roles_keeps_default_role() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;
    let (member_id, token) = common::join(&app.server, "max-1", "Max").await;

    let role_id = common::grant(&app.server, &owner, member_id, "Helpers", &["view_logs"]).await;

    let me: Value = app
        .server
        .get("/me")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .json();
    assert_eq!(me["role_ids"], json!([common::EVERYONE_ROLE, role_id]));

    app.server
        .get("/logs")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn assigning_unknown_role_is_rejected() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;
    let (member_id, _) = common::join(&app.server, "ned-1", "Ned").await;

    let resp = app
        .server
        .put(&format!("/members/{member_id}/roles"))
        .add_header(AUTHORIZATION, bearer(&owner))
        .json(&json!({ "role_ids": [999] }))
        .await;

    resp.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(resp.json::<Value>()["error"]["details"][0]["field"], "role_ids");
}
