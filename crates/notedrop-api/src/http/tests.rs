//! End-to-end HTTP tests against the in-memory backend.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tower::ServiceExt; // for oneshot

use notedrop_storage::MemoryDataStore;

use super::routes::create_router;
use super::state::AppState;

/// Helper to create a test app with in-memory storage.
fn test_app() -> axum::Router {
    let storage = Arc::new(MemoryDataStore::new());
    let state = AppState::new(storage);
    create_router(state)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn auth_request(method: &str, uri: &str, token: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(body)
        .unwrap()
}

fn auth_json_request(
    method: &str,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Registers a user over the API and logs them in, returning the token.
async fn register_and_login(app: &axum::Router, username: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/users",
            serde_json::json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": "hunter2",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/login",
            serde_json::json!({ "username": username, "password": "hunter2" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    json["token"].as_str().unwrap().to_string()
}

/// Creates a personal note for the token's user, returning its id.
async fn create_note(app: &axum::Router, token: &str, title: &str) -> i64 {
    let response = app
        .clone()
        .oneshot(auth_json_request(
            "POST",
            "/notes",
            token,
            serde_json::json!({ "title": title, "course": "CS 101" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["id"].as_i64().unwrap()
}

/// Creates a group for the token's user, returning its id.
async fn create_group(app: &axum::Router, token: &str, name: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(auth_json_request(
            "POST",
            "/groups",
            token,
            serde_json::json!({ "name": name }),
        ))
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

#[tokio::test]
async fn test_health_check() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_register_returns_user_without_password() {
    let app = test_app();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/users",
            serde_json::json!({
                "username": "alice",
                "email": "alice@example.com",
                "password": "hunter2",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["username"], "alice");
    assert!(json.get("password_hash").is_none());
    assert!(json.get("password").is_none());
}

#[tokio::test]
async fn test_register_duplicate_username_returns_400() {
    let app = test_app();
    register_and_login(&app, "alice").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/users",
            serde_json::json!({
                "username": "alice",
                "email": "other@example.com",
                "password": "secret",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_wrong_password_returns_400() {
    let app = test_app();
    register_and_login(&app, "alice").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/login",
            serde_json::json!({ "username": "alice", "password": "wrong" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["message"], "Wrong username or password.");
}

#[tokio::test]
async fn test_create_note_requires_auth() {
    let app = test_app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/notes",
            serde_json::json!({ "title": "Algebra", "course": "MATH 1" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_note_embeds_average_rating() {
    let app = test_app();
    let token = register_and_login(&app, "alice").await;

    let response = app
        .oneshot(auth_json_request(
            "POST",
            "/notes",
            &token,
            serde_json::json!({ "title": "Algebra", "course": "MATH 1" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["title"], "Algebra");
    assert_eq!(json["avg_rating"], 0.0);
    assert!(json["group_id"].is_null());
}

#[tokio::test]
async fn test_anonymous_can_read_public_note() {
    let app = test_app();
    let token = register_and_login(&app, "alice").await;
    let note_id = create_note(&app, &token, "Algebra").await;

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/notes/{note_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_note_denies_instead_of_404() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/notes/9999")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_non_author_cannot_update_note() {
    let app = test_app();
    let alice = register_and_login(&app, "alice").await;
    let bob = register_and_login(&app, "bob").await;
    let note_id = create_note(&app, &alice, "Algebra").await;

    let response = app
        .oneshot(auth_json_request(
            "PATCH",
            &format!("/notes/{note_id}"),
            &bob,
            serde_json::json!({ "title": "Hijacked" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json(response).await;
    assert_eq!(
        json["message"],
        "You do not have permission to perform this action."
    );
}

#[tokio::test]
async fn test_group_note_hidden_from_non_members() {
    let app = test_app();
    let alice = register_and_login(&app, "alice").await;
    let bob = register_and_login(&app, "bob").await;
    let (status, group) = create_group(&app, &alice, "Study Circle").await;
    assert_eq!(status, StatusCode::CREATED);
    let group_id = group["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(auth_json_request(
            "POST",
            &format!("/groups/{group_id}/notes"),
            &alice,
            serde_json::json!({ "title": "Secret notes", "course": "CS 101" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let note_id = body_json(response).await["id"].as_i64().unwrap();

    // Non-member and anonymous reads both deny.
    let response = app
        .clone()
        .oneshot(auth_request(
            "GET",
            &format!("/notes/{note_id}"),
            &bob,
            Body::empty(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/notes/{note_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_invitation_round_trip() {
    let app = test_app();
    let alice = register_and_login(&app, "alice").await;
    let bob = register_and_login(&app, "bob").await;
    let (status, group) = create_group(&app, &alice, "Study Circle").await;
    assert_eq!(status, StatusCode::CREATED);
    let group_id = group["id"].as_i64().unwrap();

    // Bob cannot join without an invitation.
    let response = app
        .clone()
        .oneshot(auth_request(
            "POST",
            &format!("/groups/{group_id}/memberships"),
            &bob,
            Body::empty(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Only the moderator can invite.
    let response = app
        .clone()
        .oneshot(auth_json_request(
            "POST",
            &format!("/groups/{group_id}/invitations"),
            &bob,
            serde_json::json!({ "username": "bob" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(auth_json_request(
            "POST",
            &format!("/groups/{group_id}/invitations"),
            &alice,
            serde_json::json!({ "username": "bob" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Joining consumes the invitation.
    let response = app
        .clone()
        .oneshot(auth_request(
            "POST",
            &format!("/groups/{group_id}/memberships"),
            &bob,
            Body::empty(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(auth_request(
            "GET",
            &format!("/groups/{group_id}/invitations"),
            &alice,
            Body::empty(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 0);

    // Bob now reads the group detail, roster included.
    let response = app
        .oneshot(auth_request(
            "GET",
            &format!("/groups/{group_id}"),
            &bob,
            Body::empty(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["moderator"]["username"], "alice");
    assert_eq!(json["members"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_inviting_member_again_returns_400() {
    let app = test_app();
    let alice = register_and_login(&app, "alice").await;
    let (status, group) = create_group(&app, &alice, "Study Circle").await;
    assert_eq!(status, StatusCode::CREATED);
    let group_id = group["id"].as_i64().unwrap();

    // Alice is already a member via the moderator seat.
    let response = app
        .oneshot(auth_json_request(
            "POST",
            &format!("/groups/{group_id}/invitations"),
            &alice,
            serde_json::json!({ "username": "alice" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["message"], "User is already a member.");
}

#[tokio::test]
async fn test_free_user_group_limit_is_three() {
    let app = test_app();
    let alice = register_and_login(&app, "alice").await;

    for name in ["One", "Two", "Three"] {
        let (status, _) = create_group(&app, &alice, name).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, json) = create_group(&app, &alice, "Four").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["message"], "At the limit of three groups.");
}

#[tokio::test]
async fn test_premium_user_exceeds_group_limit() {
    let app = test_app();
    let alice = register_and_login(&app, "alice").await;

    let response = app
        .clone()
        .oneshot(auth_request("POST", "/subscriptions", &alice, Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    for name in ["One", "Two", "Three", "Four"] {
        let (status, _) = create_group(&app, &alice, name).await;
        assert_eq!(status, StatusCode::CREATED);
    }
}

#[tokio::test]
async fn test_moderator_membership_cannot_be_removed() {
    let app = test_app();
    let alice = register_and_login(&app, "alice").await;
    let (status, group) = create_group(&app, &alice, "Study Circle").await;
    assert_eq!(status, StatusCode::CREATED);
    let group_id = group["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(auth_request(
            "GET",
            &format!("/groups/{group_id}/memberships"),
            &alice,
            Body::empty(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let memberships = body_json(response).await;
    let membership_id = memberships[0]["id"].as_i64().unwrap();

    let response = app
        .oneshot(auth_request(
            "DELETE",
            &format!("/groups/{group_id}/memberships/{membership_id}"),
            &alice,
            Body::empty(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json(response).await;
    assert_eq!(json["message"], "Not allowed to remove moderator membership.");
}

#[tokio::test]
async fn test_upload_rejects_unknown_extension() {
    let app = test_app();
    let alice = register_and_login(&app, "alice").await;
    let note_id = create_note(&app, &alice, "Algebra").await;

    let response = app
        .oneshot(auth_request(
            "POST",
            &format!("/notes/{note_id}/files?index=0&filename=notes.exe"),
            &alice,
            Body::from("not really a pdf"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["message"], "Unsupported file extension. Allowed: pdf, png, jpg.");
}

#[tokio::test]
async fn test_upload_and_download_round_trip() {
    let app = test_app();
    let alice = register_and_login(&app, "alice").await;
    let note_id = create_note(&app, &alice, "Algebra").await;

    let response = app
        .clone()
        .oneshot(auth_request(
            "POST",
            &format!("/notes/{note_id}/files?index=0&filename=notes.pdf"),
            &alice,
            Body::from("pdf bytes"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Same slot again is rejected.
    let response = app
        .clone()
        .oneshot(auth_request(
            "POST",
            &format!("/notes/{note_id}/files?index=0&filename=again.pdf"),
            &alice,
            Body::from("other bytes"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Anyone who can read the note can download.
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/notes/{note_id}/files/0"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"pdf bytes");
}

#[tokio::test]
async fn test_replace_file_swaps_content_in_place() {
    let app = test_app();
    let alice = register_and_login(&app, "alice").await;
    let bob = register_and_login(&app, "bob").await;
    let note_id = create_note(&app, &alice, "Algebra").await;

    let response = app
        .clone()
        .oneshot(auth_request(
            "POST",
            &format!("/notes/{note_id}/files?index=0&filename=v1.pdf"),
            &alice,
            Body::from("first draft"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Only the author may replace.
    let response = app
        .clone()
        .oneshot(auth_request(
            "PUT",
            &format!("/notes/{note_id}/files/0?filename=evil.pdf"),
            &bob,
            Body::from("not theirs"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(auth_request(
            "PUT",
            &format!("/notes/{note_id}/files/0?filename=v2.pdf"),
            &alice,
            Body::from("second draft"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["filename"], "v2.pdf");

    // The slot count is unchanged; downloads serve the new bytes.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/notes/{note_id}/files"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/notes/{note_id}/files/0"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"second draft");

    // Replacing an empty slot is a 404, not an insert.
    let response = app
        .oneshot(auth_request(
            "PUT",
            &format!("/notes/{note_id}/files/9?filename=v3.pdf"),
            &alice,
            Body::from("nothing here"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_storage_quota_follows_subscription_tier() {
    let app = test_app();
    let alice = register_and_login(&app, "alice").await;
    let note_id = create_note(&app, &alice, "Algebra").await;

    // One byte over the free ceiling.
    let oversized = vec![0u8; 15_000_001];

    let response = app
        .clone()
        .oneshot(auth_request(
            "POST",
            &format!("/notes/{note_id}/files?index=0&filename=big.pdf"),
            &alice,
            Body::from(oversized.clone()),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json(response).await;
    assert_eq!(json["message"], "Exceeded note size limit.");

    // Nothing was stored by the denied upload.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/notes/{note_id}/files"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 0);

    // With an active subscription the same upload passes.
    let response = app
        .clone()
        .oneshot(auth_request("POST", "/subscriptions", &alice, Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(auth_request(
            "POST",
            &format!("/notes/{note_id}/files?index=0&filename=big.pdf"),
            &alice,
            Body::from(oversized),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_only_note_author_can_upload() {
    let app = test_app();
    let alice = register_and_login(&app, "alice").await;
    let bob = register_and_login(&app, "bob").await;
    let note_id = create_note(&app, &alice, "Algebra").await;

    let response = app
        .oneshot(auth_request(
            "POST",
            &format!("/notes/{note_id}/files?index=0&filename=notes.pdf"),
            &bob,
            Body::from("pdf bytes"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_rating_twice_is_denied() {
    let app = test_app();
    let alice = register_and_login(&app, "alice").await;
    let bob = register_and_login(&app, "bob").await;
    let note_id = create_note(&app, &alice, "Algebra").await;

    let response = app
        .clone()
        .oneshot(auth_json_request(
            "POST",
            &format!("/notes/{note_id}/ratings"),
            &bob,
            serde_json::json!({ "score": 4.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(auth_json_request(
            "POST",
            &format!("/notes/{note_id}/ratings"),
            &bob,
            serde_json::json!({ "score": 2.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The average reflects the single rating.
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/notes/{note_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["avg_rating"], 4.0);
}

#[tokio::test]
async fn test_rating_out_of_range_returns_400() {
    let app = test_app();
    let alice = register_and_login(&app, "alice").await;
    let bob = register_and_login(&app, "bob").await;
    let note_id = create_note(&app, &alice, "Algebra").await;

    let response = app
        .oneshot(auth_json_request(
            "POST",
            &format!("/notes/{note_id}/ratings"),
            &bob,
            serde_json::json!({ "score": 6.5 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["message"], "Score must be between 0 and 5.");
}

#[tokio::test]
async fn test_second_active_subscription_returns_400() {
    let app = test_app();
    let alice = register_and_login(&app, "alice").await;

    let response = app
        .clone()
        .oneshot(auth_request("POST", "/subscriptions", &alice, Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(auth_request("POST", "/subscriptions", &alice, Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["message"], "Already have active subscription.");
}

#[tokio::test]
async fn test_unknown_order_by_returns_400() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/notes?order_by=nonsense")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_user_listing_is_public() {
    let app = test_app();
    register_and_login(&app, "alice").await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/users?username=alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json[0]["username"], "alice");
    assert!(json[0].get("password_hash").is_none());
}

#[tokio::test]
async fn test_group_name_allows_up_to_two_hundred_chars() {
    let app = test_app();
    let alice = register_and_login(&app, "alice").await;

    let (status, _) = create_group(&app, &alice, &"x".repeat(200)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = create_group(&app, &alice, &"x".repeat(201)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_token_returns_401() {
    let app = test_app();

    let response = app
        .oneshot(auth_request("GET", "/user", "bogus-token", Body::empty()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_password_change_rotates_tokens() {
    let app = test_app();
    let alice = register_and_login(&app, "alice").await;

    let response = app
        .clone()
        .oneshot(auth_json_request(
            "PUT",
            "/user/password",
            &alice,
            serde_json::json!({ "old_password": "hunter2", "new_password": "correct horse" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fresh = body_json(response).await["token"]
        .as_str()
        .unwrap()
        .to_string();

    // The old token is dead, the fresh one works.
    let response = app
        .clone()
        .oneshot(auth_request("GET", "/user", &alice, Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(auth_request("GET", "/user", &fresh, Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_json_returns_400() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/users")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
