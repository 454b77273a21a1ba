mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use serde_json::{json, Value};

use common::bearer;
use eskimoe_server::db::memory::FaultPoint;
use eskimoe_server::db::store::EntityStore;

async fn create_category(app: &common::TestApp, token: &str, name: &str) -> i32 {
    let resp = app
        .server
        .post("/categories")
        .add_header(AUTHORIZATION, bearer(token))
        .json(&json!({ "name": name }))
        .await;
    resp.assert_status(StatusCode::CREATED);
    resp.json::<Value>()["id"].as_i64().unwrap() as i32
}

async fn category_ids(app: &common::TestApp, token: &str) -> Vec<i64> {
    let categories: Vec<Value> = app
        .server
        .get("/categories")
        .add_header(AUTHORIZATION, bearer(token))
        .await
        .json();
    categories
        .iter()
        .map(|c| c["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn seeded_server_has_general_with_chat() {
    let app = common::test_app().await;
    let (_, token) = common::join(&app.server, "quin-1", "Quin").await;

    let categories: Vec<Value> = app
        .server
        .get("/categories")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .json();

    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0]["name"], "General");
    assert_eq!(categories[0]["rooms"][0]["name"], "Chat");
    assert_eq!(categories[0]["rooms"][0]["type"], "text");
}

#[tokio::test]
async fn create_category_appends_to_server_order() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;
    let mut rx = common::subscribe(&app.state, 0).await;

    let id = create_category(&app, &owner, "Games").await;

    let event = common::next_event(&mut rx).await;
    assert_eq!(event["broadcast_type"], 10);
    assert_eq!(event["data"]["name"], "Games");
    assert_eq!(event["data"]["room_order"], json!([]));
    assert_eq!(category_ids(&app, &owner).await, vec![1, id as i64]);
}

#[tokio::test]
async fn failed_category_order_update_rolls_back_category() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;
    let mut rx = common::subscribe(&app.state, 0).await;
    app.store.inject_fault(FaultPoint::SaveCategoryOrder);

    app.server
        .post("/categories")
        .add_header(AUTHORIZATION, bearer(&owner))
        .json(&json!({ "name": "Ghost" }))
        .await
        .assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    common::assert_no_event(&app.state, &mut rx).await;

    app.store.clear_faults();
    assert_eq!(app.store.list_categories().await.unwrap().len(), 1);
}

#[tokio::test]
async fn rename_category() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;
    let mut rx = common::subscribe(&app.state, 0).await;

    let resp = app
        .server
        .patch(&format!("/categories/{}", common::GENERAL_CATEGORY))
        .add_header(AUTHORIZATION, bearer(&owner))
        .json(&json!({ "name": "Main" }))
        .await;

    resp.assert_status_ok();
    let event = common::next_event(&mut rx).await;
    assert_eq!(event["broadcast_type"], 12);
    assert_eq!(event["data"]["name"], "Main");
}

#[tokio::test]
async fn category_with_rooms_cannot_be_deleted() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;

    app.server
        .delete(&format!("/categories/{}", common::GENERAL_CATEGORY))
        .add_header(AUTHORIZATION, bearer(&owner))
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn delete_empty_category() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;
    let id = create_category(&app, &owner, "Empty").await;
    let mut rx = common::subscribe(&app.state, 0).await;

    app.server
        .delete(&format!("/categories/{id}"))
        .add_header(AUTHORIZATION, bearer(&owner))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let event = common::next_event(&mut rx).await;
    assert_eq!(event["broadcast_type"], 11);
    assert_eq!(event["data"]["category_id"], id);
    assert_eq!(category_ids(&app, &owner).await, vec![1]);
}

#[tokio::test]
async fn reorder_categories() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;
    let second = create_category(&app, &owner, "Second").await;
    let mut rx = common::subscribe(&app.state, 0).await;

    let resp = app
        .server
        .put("/categories/order")
        .add_header(AUTHORIZATION, bearer(&owner))
        .json(&json!({ "order": [second, 1] }))
        .await;

    resp.assert_status_ok();
    let event = common::next_event(&mut rx).await;
    assert_eq!(event["broadcast_type"], 13);
    assert_eq!(event["data"]["category_order"], json!([second, 1]));
    assert_eq!(category_ids(&app, &owner).await, vec![second as i64, 1]);
}

#[tokio::test]
async fn reorder_must_list_every_category_once() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;
    let second = create_category(&app, &owner, "Second").await;

    for order in [json!([1]), json!([1, 1]), json!([1, second, 99])] {
        let resp = app
            .server
            .put("/categories/order")
            .add_header(AUTHORIZATION, bearer(&owner))
            .json(&json!({ "order": order }))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(resp.json::<Value>()["error"]["details"][0]["field"], "order");
    }
}
