mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use common::{app, app_with, config, member, moderator, token_for};

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn post_comment(app: &Router, token: &str, object_id: i64, text: &str, parent: Option<i64>) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/comments/",
        Some(token),
        Some(json!({
            "content_type_name": "film",
            "object_id": object_id,
            "text": text,
            "parent": parent,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body
}

#[tokio::test]
async fn health_check_responds() {
    let app = app().await;
    let (status, body) = send(&app, Method::GET, "/api/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn writes_require_a_bearer_token() {
    let app = app().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/comments/",
        None,
        Some(json!({"content_type_name": "film", "object_id": 1, "text": "hi"})),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn validation_errors_carry_typed_codes() {
    let app = app().await;
    let token = token_for(&member(1));

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/comments/",
        Some(&token),
        Some(json!({"content_type_name": "film", "object_id": "7", "text": "   "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "EMPTY_TEXT");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/comments/",
        Some(&token),
        Some(json!({"content_type_name": "album", "object_id": 7, "text": "hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_TARGET");

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/comments/?content_type=film&object_id=7&ordering=popularity",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn threads_flatten_and_paginate() {
    let app = app().await;
    let alice = token_for(&member(1));
    let bob = token_for(&member(2));

    let root = post_comment(&app, &alice, 5, "first!", None).await;
    let root_id = root["id"].as_i64().unwrap();
    let reply = post_comment(&app, &bob, 5, "welcome", Some(root_id)).await;
    let nested = post_comment(&app, &alice, 5, "thanks", reply["id"].as_i64()).await;
    assert_eq!(nested["parent"], root_id);

    let (status, page) = send(
        &app,
        Method::GET,
        "/api/comments/?content_type=film&object_id=5&page=1&page_size=2",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 3);
    assert_eq!(page["next"], 2);
    assert_eq!(page["previous"], Value::Null);
    assert_eq!(page["results"].as_array().unwrap().len(), 2);

    let (_, replies) = send(
        &app,
        Method::GET,
        &format!("/api/comments/{}/replies/", root_id),
        None,
        None,
    )
    .await;
    let texts: Vec<&str> = replies
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, vec!["welcome", "thanks"]);

    let (_, root) = send(&app, Method::GET, &format!("/api/comments/{}/", root_id), None, None).await;
    assert_eq!(root["reply_count"], 2);
}

#[tokio::test]
async fn authors_edit_and_delete_their_own_comments() {
    let app = app().await;
    let alice = token_for(&member(1));
    let bob = token_for(&member(2));
    let comment = post_comment(&app, &alice, 9, "tpyo", None).await;
    let uri = format!("/api/comments/{}/", comment["id"]);

    let (status, _) = send(&app, Method::PATCH, &uri, Some(&bob), Some(json!({"text": "mine now"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, edited) = send(&app, Method::PATCH, &uri, Some(&alice), Some(json!({"text": "typo"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["text"], "typo");
    assert_eq!(edited["is_edited"], true);

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn like_and_dislike_toggle_through_the_api() {
    let app = app().await;
    let alice = token_for(&member(1));
    let bob = token_for(&member(2));
    let comment = post_comment(&app, &alice, 3, "vote", None).await;
    let uri = format!("/api/comments/{}/interact/", comment["id"]);

    let (_, liked) = send(&app, Method::POST, &uri, Some(&bob), Some(json!({"interaction_type": "like"}))).await;
    assert_eq!((liked["liked"].clone(), liked["like_count"].clone()), (json!(true), json!(1)));

    let (_, unliked) = send(&app, Method::POST, &uri, Some(&bob), Some(json!({"interaction_type": "like"}))).await;
    assert_eq!((unliked["liked"].clone(), unliked["like_count"].clone()), (json!(false), json!(0)));

    send(&app, Method::POST, &uri, Some(&bob), Some(json!({"interaction_type": "dislike"}))).await;
    let (_, swapped) = send(&app, Method::POST, &uri, Some(&bob), Some(json!({"interaction_type": "like"}))).await;
    assert_eq!(swapped["disliked"], false);
    assert_eq!(swapped["liked"], true);
    assert_eq!(swapped["dislike_count"], 0);
    assert_eq!(swapped["like_count"], 1);

    let (status, reported) = send(
        &app,
        Method::POST,
        &uri,
        Some(&bob),
        Some(json!({"interaction_type": "report", "reason": "spoilers"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reported["report_count"], 1);
}

#[tokio::test]
async fn moderation_endpoints_are_moderator_only() {
    let app = app().await;
    let alice = token_for(&member(1));

    for (method, uri, body) in [
        (Method::GET, "/api/comments/moderation/", None),
        (Method::POST, "/api/comments/moderation/auto/", None),
        (Method::GET, "/api/comments/moderation/stats/", None),
        (
            Method::POST,
            "/api/comments/moderation/bulk/",
            Some(json!({"comment_ids": [1], "action": "hide"})),
        ),
    ] {
        let (status, body) = send(&app, method, uri, Some(&alice), body).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", uri);
        assert_eq!(body["code"], "FORBIDDEN");
    }
}

#[tokio::test]
async fn bulk_moderation_skips_deleted_comments() {
    let app = app().await;
    let alice = token_for(&member(1));
    let mia = token_for(&moderator(50));
    let c1 = post_comment(&app, &alice, 1, "one", None).await["id"].as_i64().unwrap();
    let c2 = post_comment(&app, &alice, 1, "two", None).await["id"].as_i64().unwrap();
    send(&app, Method::DELETE, &format!("/api/comments/{}/", c2), Some(&alice), None).await;

    let (status, result) = send(
        &app,
        Method::POST,
        "/api/comments/moderation/bulk/",
        Some(&mia),
        Some(json!({"comment_ids": [c1, c2], "action": "hide", "reason": "cleanup"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["moderated_count"], 1);
    assert_eq!(result["skipped"][0]["id"], c2);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/comments/{}/moderate/", c2),
        Some(&mia),
        Some(json!({"action": "approve"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_TRANSITION");

    let (_, history) = send(&app, Method::GET, &format!("/api/comments/{}/history/", c1), Some(&mia), None).await;
    assert_eq!(history[0]["action"], "hide");
    assert_eq!(history[0]["old_status"], "published");
    assert_eq!(history[0]["new_status"], "hidden");
}

#[tokio::test]
async fn auto_moderation_flags_once_and_shows_in_queue() {
    let app = app().await;
    let alice = token_for(&member(1));
    let mia = token_for(&moderator(50));
    let risky = post_comment(&app, &alice, 2, "spam spam", None).await["id"].as_i64().unwrap();

    for reporter in 10..13 {
        send(
            &app,
            Method::POST,
            &format!("/api/comments/{}/interact/", risky),
            Some(&token_for(&member(reporter))),
            Some(json!({"interaction_type": "report"})),
        )
        .await;
    }

    let (_, first) = send(&app, Method::POST, "/api/comments/moderation/auto/", Some(&mia), None).await;
    let (_, second) = send(&app, Method::POST, "/api/comments/moderation/auto/", Some(&mia), None).await;
    assert_eq!(first["flagged_count"], 1);
    assert_eq!(second["flagged_count"], 0);

    let (_, queue) = send(
        &app,
        Method::GET,
        "/api/comments/moderation/?flagged=true&search=spam",
        Some(&mia),
        None,
    )
    .await;
    assert_eq!(queue["count"], 1);
    assert_eq!(queue["results"][0]["id"], risky);
    assert_eq!(queue["results"][0]["risk_score"], 90);

    let (status, stats) = send(&app, Method::GET, "/api/comments/moderation/stats/?days=7", Some(&mia), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["flagged_total"], 1);
    assert_eq!(stats["reports_in_window"], 3);

    let (status, _) = send(&app, Method::GET, "/api/comments/moderation/stats/?days=400", Some(&mia), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn hard_delete_purges_thread_but_keeps_history() {
    let app = app().await;
    let alice = token_for(&member(1));
    let mia = token_for(&moderator(50));
    let root = post_comment(&app, &alice, 4, "root", None).await["id"].as_i64().unwrap();
    let reply = post_comment(&app, &alice, 4, "reply", Some(root)).await["id"].as_i64().unwrap();

    let (status, purged) = send(
        &app,
        Method::DELETE,
        &format!("/api/comments/{}/hard-delete/", root),
        Some(&mia),
        Some(json!({"reason": "illegal content"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(purged["deleted_ids"].as_array().unwrap().len(), 2);

    let (status, _) = send(&app, Method::GET, &format!("/api/comments/{}/", reply), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, history) = send(&app, Method::GET, &format!("/api/comments/{}/history/", reply), Some(&mia), None).await;
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["action"], "delete");
}

#[tokio::test]
async fn approval_mode_holds_comments_until_approved() {
    let app = app_with(comment_engine::config::AppConfig {
        require_approval: true,
        ..config()
    })
    .await;
    let alice = token_for(&member(1));
    let mia = token_for(&moderator(50));

    let pending = post_comment(&app, &alice, 6, "please approve", None).await;
    assert_eq!(pending["status"], "pending");

    let list_uri = "/api/comments/?content_type=film&object_id=6";
    let (_, page) = send(&app, Method::GET, list_uri, None, None).await;
    assert_eq!(page["count"], 0);

    send(
        &app,
        Method::POST,
        &format!("/api/comments/{}/moderate/", pending["id"]),
        Some(&mia),
        Some(json!({"action": "approve"})),
    )
    .await;
    let (_, page) = send(&app, Method::GET, list_uri, None, None).await;
    assert_eq!(page["count"], 1);
}

#[tokio::test]
async fn notifications_follow_replies_and_likes() {
    let app = app().await;
    let alice = token_for(&member(1));
    let bob = token_for(&member(2));
    let root = post_comment(&app, &alice, 8, "hello", None).await["id"].as_i64().unwrap();
    post_comment(&app, &bob, 8, "hi back", Some(root)).await;
    send(
        &app,
        Method::POST,
        &format!("/api/comments/{}/interact/", root),
        Some(&bob),
        Some(json!({"interaction_type": "like"})),
    )
    .await;

    let (_, inbox) = send(&app, Method::GET, "/api/notifications/", Some(&alice), None).await;
    assert_eq!(inbox["unread_count"], 2);
    let first = inbox["notifications"][0]["id"].as_i64().unwrap();

    let (status, _) = send(&app, Method::POST, &format!("/api/notifications/{}/read/", first), Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::POST, &format!("/api/notifications/{}/read/", first), Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, marked) = send(&app, Method::POST, "/api/notifications/read-all/", Some(&alice), None).await;
    assert_eq!(marked["updated"], 1);
}
