mod common;

use std::collections::BTreeSet;

use axum::body::Body;
use axum::Router;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::bearer;
use eskimoe_server::db::store::EntityStore;

fn request(method: Method, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(AUTHORIZATION, bearer(token));
    match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Sends every request at once on the multi-threaded runtime and returns
/// the response statuses.
async fn fire_all(router: &Router, requests: Vec<Request<Body>>) -> Vec<StatusCode> {
    let handles: Vec<_> = requests
        .into_iter()
        .map(|req| tokio::spawn(router.clone().oneshot(req)))
        .collect();
    let mut statuses = Vec::with_capacity(handles.len());
    for handle in handles {
        statuses.push(handle.await.unwrap().unwrap().status());
    }
    statuses
}

const PARALLEL: usize = 200;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_room_creates_all_land_in_the_order() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;
    let router = common::app(app.state.clone());

    let requests = (0..PARALLEL)
        .map(|n| {
            request(
                Method::POST,
                "/rooms",
                &owner,
                Some(json!({ "name": format!("room-{n}"), "category_id": common::GENERAL_CATEGORY })),
            )
        })
        .collect();
    let statuses = fire_all(&router, requests).await;
    assert!(statuses.iter().all(|s| *s == StatusCode::CREATED));

    let rooms: BTreeSet<i32> = app
        .store
        .list_rooms()
        .await
        .unwrap()
        .into_iter()
        .map(|room| room.id)
        .collect();
    let category = app
        .store
        .category(common::GENERAL_CATEGORY)
        .await
        .unwrap()
        .unwrap();
    let ordered: BTreeSet<i32> = category.room_order.as_slice().iter().copied().collect();

    assert_eq!(rooms.len(), PARALLEL + 1);
    assert_eq!(category.room_order.len(), rooms.len());
    assert_eq!(ordered, rooms);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_room_deletes_leave_no_stale_ids() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;
    let router = common::app(app.state.clone());
    let mut doomed = Vec::new();
    for n in 0..50 {
        doomed.push(common::create_room(&app.server, &owner, &format!("temp-{n}")).await);
    }

    let requests = doomed
        .iter()
        .map(|id| request(Method::DELETE, &format!("/rooms/{id}"), &owner, None))
        .collect();
    let statuses = fire_all(&router, requests).await;
    assert!(statuses.iter().all(|s| *s == StatusCode::NO_CONTENT));

    let category = app
        .store
        .category(common::GENERAL_CATEGORY)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(category.room_order.as_slice(), &[common::CHAT_ROOM]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_category_creates_can_still_be_reordered() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;
    let router = common::app(app.state.clone());

    let requests = (0..PARALLEL)
        .map(|n| {
            request(
                Method::POST,
                "/categories",
                &owner,
                Some(json!({ "name": format!("cat-{n}") })),
            )
        })
        .collect();
    let statuses = fire_all(&router, requests).await;
    assert!(statuses.iter().all(|s| *s == StatusCode::CREATED));

    let mut ids: Vec<i32> = app
        .store
        .list_categories()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    let server = app.store.load_server().await.unwrap().unwrap();
    assert_eq!(server.category_order.len(), PARALLEL + 1);

    ids.reverse();
    app.server
        .put("/categories/order")
        .add_header(AUTHORIZATION, bearer(&owner))
        .json(&json!({ "order": ids }))
        .await
        .assert_status_ok();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_role_creates_all_land_in_the_order() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;
    let router = common::app(app.state.clone());

    let requests = (0..PARALLEL)
        .map(|n| {
            request(
                Method::POST,
                "/roles",
                &owner,
                Some(json!({ "name": format!("role-{n}") })),
            )
        })
        .collect();
    let statuses = fire_all(&router, requests).await;
    assert!(statuses.iter().all(|s| *s == StatusCode::CREATED));

    let roles = app.store.list_roles().await.unwrap();
    let server = app.store.load_server().await.unwrap().unwrap();
    assert_eq!(roles.len(), PARALLEL + 1);
    assert_eq!(server.role_order.len(), roles.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_reactions_record_every_member() {
    let app = common::test_app().await;
    let (_, owner) = common::join_owner(&app.server).await;
    let message_id = common::send_message(&app.server, &owner, common::CHAT_ROOM, "react").await;
    let router = common::app(app.state.clone());

    let mut tokens = Vec::new();
    for n in 0..PARALLEL {
        let (_, token) = common::join(&app.server, &format!("fan-{n}"), &format!("Fan {n}")).await;
        tokens.push(token);
    }
    let uri = format!(
        "/rooms/{}/messages/{message_id}/reactions/1",
        common::CHAT_ROOM
    );

    let adds = tokens
        .iter()
        .map(|token| request(Method::PUT, &uri, token, None))
        .collect();
    let statuses = fire_all(&router, adds).await;
    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::CREATED).count(),
        1
    );
    assert!(statuses
        .iter()
        .all(|s| *s == StatusCode::CREATED || *s == StatusCode::OK));

    let reaction = app
        .store
        .message_reaction(message_id, 1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reaction.member_ids.len(), PARALLEL);
    assert_eq!(reaction.count as usize, PARALLEL);

    let removes = tokens
        .iter()
        .map(|token| request(Method::DELETE, &uri, token, None))
        .collect();
    let statuses = fire_all(&router, removes).await;
    assert!(statuses.iter().all(|s| *s == StatusCode::NO_CONTENT));
    assert!(app
        .store
        .message_reaction(message_id, 1)
        .await
        .unwrap()
        .is_none());
}
