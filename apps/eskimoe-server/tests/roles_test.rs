mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use serde_json::{json, Value};

use common::bearer;
use eskimoe_server::db::memory::FaultPoint;
use eskimoe_server::db::store::EntityStore;

#[tokio::test]
async fn list_roles_starts_with_everyone() {
    let app = common::test_app().await;
    let (_, token) = common::join(&app.server, "ray-1", "Ray").await;

    let roles: Vec<Value> = app
        .server
        .get("/roles")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .json();

    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0]["name"], "Everyone");
    assert_eq!(roles[0]["system_role"], true);
    let permissions = roles[0]["permissions"].as_array().unwrap();
    assert!(permissions.contains(&json!("send_message")));
    assert!(!permissions.contains(&json!("manage_roles")));
}

#[tokio::test]
async fn create_role_is_appended_to_role_order() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;
    let mut rx = common::subscribe(&app.state, 0).await;

    let resp = app
        .server
        .post("/roles")
        .add_header(AUTHORIZATION, bearer(&owner))
        .json(&json!({ "name": "Moderator", "permissions": ["kick_members", "delete_message"] }))
        .await;

    resp.assert_status(StatusCode::CREATED);
    let role: Value = resp.json();
    assert_eq!(role["permissions"], json!(["delete_message", "kick_members"]));

    let event = common::next_event(&mut rx).await;
    assert_eq!(event["broadcast_type"], 20);
    assert_eq!(event["data"], role);

    let roles: Vec<Value> = app
        .server
        .get("/roles")
        .add_header(AUTHORIZATION, bearer(&owner))
        .await
        .json();
    let names: Vec<&str> = roles.iter().map(|r| r["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["Everyone", "Moderator"]);
}

#[tokio::test]
async fn duplicate_role_name_conflicts() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;

    app.server
        .post("/roles")
        .add_header(AUTHORIZATION, bearer(&owner))
        .json(&json!({ "name": "everyone" }))
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_permission_is_rejected() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;

    let resp = app
        .server
        .post("/roles")
        .add_header(AUTHORIZATION, bearer(&owner))
        .json(&json!({ "name": "Odd", "permissions": ["fly"] }))
        .await;

    assert!(resp.status_code().is_client_error());
}

#[tokio::test]
async fn only_owner_grants_administrator() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;
    let (member_id, manager) = common::join(&app.server, "sam-1", "Sam").await;
    common::grant(&app.server, &owner, member_id, "Managers", &["manage_roles"]).await;

    app.server
        .post("/roles")
        .add_header(AUTHORIZATION, bearer(&manager))
        .json(&json!({ "name": "Admins", "permissions": ["administrator"] }))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    app.server
        .post("/roles")
        .add_header(AUTHORIZATION, bearer(&manager))
        .json(&json!({ "name": "Helpers", "permissions": ["view_logs"] }))
        .await
        .assert_status(StatusCode::CREATED);

    app.server
        .post("/roles")
        .add_header(AUTHORIZATION, bearer(&owner))
        .json(&json!({ "name": "Admins", "permissions": ["administrator"] }))
        .await
        .assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn system_role_cannot_be_renamed_or_deleted() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;
    let path = format!("/roles/{}", common::EVERYONE_ROLE);

    app.server
        .patch(&path)
        .add_header(AUTHORIZATION, bearer(&owner))
        .json(&json!({ "name": "Everybody" }))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    app.server
        .delete(&path)
        .add_header(AUTHORIZATION, bearer(&owner))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    // Its permissions may still change.
    let resp = app
        .server
        .patch(&path)
        .add_header(AUTHORIZATION, bearer(&owner))
        .json(&json!({ "permissions": ["send_message"] }))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>()["permissions"], json!(["send_message"]));
}

#[tokio::test]
async fn delete_role_strips_it_from_members() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;
    let (member_id, token) = common::join(&app.server, "tia-1", "Tia").await;
    let role_id = common::grant(&app.server, &owner, member_id, "Temp", &["view_logs"]).await;
    let mut rx = common::subscribe(&app.state, 0).await;

    app.server
        .delete(&format!("/roles/{role_id}"))
        .add_header(AUTHORIZATION, bearer(&owner))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let event = common::next_event(&mut rx).await;
    assert_eq!(event, json!({ "broadcast_type": 21, "data": { "role_id": role_id } }));

    let me: Value = app
        .server
        .get("/me")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .json();
    assert_eq!(me["role_ids"], json!([common::EVERYONE_ROLE]));

    app.server
        .get("/logs")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn failed_role_order_update_rolls_back_role() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;
    let mut rx = common::subscribe(&app.state, 0).await;
    app.store.inject_fault(FaultPoint::SaveRoleOrder);

    app.server
        .post("/roles")
        .add_header(AUTHORIZATION, bearer(&owner))
        .json(&json!({ "name": "Phantom" }))
        .await
        .assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    common::assert_no_event(&app.state, &mut rx).await;

    app.store.clear_faults();
    assert!(app.store.role_by_name("Phantom").await.unwrap().is_none());
}
