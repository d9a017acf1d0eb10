//! Integration tests: drive the full router in-process against an in-memory
//! store and a throwaway blob directory.

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use travelsbud_api::auth::{AppState, AppStateInner};
use travelsbud_api::router;
use travelsbud_core::{BlobStore, NullPushGateway, Services};
use travelsbud_db::Database;
use travelsbud_gateway::Dispatcher;
use travelsbud_types::events::GatewayEvent;

const SECRET: &str = "test-secret-for-http-suite";

struct TestApp {
    app: Router,
    state: AppState,
    blob_dir: PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.blob_dir);
    }
}

async fn test_app(name: &str) -> TestApp {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let blob_dir = std::env::temp_dir().join(format!(
        "travelsbud-http-{}-{}-{}",
        name,
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    let blobs = Arc::new(BlobStore::new(blob_dir.clone(), "http://localhost:3000").await.unwrap());
    let services = Services::new(db, Arc::new(NullPushGateway), blobs);

    let state: AppState = Arc::new(AppStateInner {
        services,
        jwt_secret: SECRET.into(),
        dispatcher: Dispatcher::new(),
    });
    TestApp {
        app: router(state.clone()),
        state,
        blob_dir,
    }
}

impl TestApp {
    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Register and return (user_id, token).
    async fn register(&self, email: &str) -> (String, String) {
        let (status, body) = self
            .call(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({ "email": email, "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        (
            body["user_id"].as_str().unwrap().to_string(),
            body["token"].as_str().unwrap().to_string(),
        )
    }
}

#[tokio::test]
async fn register_and_login() {
    let t = test_app("auth").await;
    let (user_id, _) = t.register("Alice@Example.com").await;

    let (status, body) = t
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "alice@example.com", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], user_id.as_str());
    assert_eq!(body["email"], "alice@example.com");

    let (status, body) = t
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "alice@example.com", "password": "wrong password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid email or password");

    let (status, _) = t
        .call(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "email": "alice@example.com", "password": "another one" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = t
        .call(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "email": "bob@example.com", "password": "short" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let t = test_app("unauth").await;

    let (status, body) = t.call(Method::GET, "/chats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "not signed in");

    let (status, _) = t.call(Method::GET, "/chats", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn mutual_like_opens_a_chat() {
    let t = test_app("match").await;
    let (alice, alice_token) = t.register("alice@example.com").await;
    let (bob, bob_token) = t.register("bob@example.com").await;
    let (_, carol_token) = t.register("carol@example.com").await;

    let (_, mut alice_events) = t.state.dispatcher.register_user_channel(&alice).await;

    let (status, body) = t
        .call(Method::POST, &format!("/users/{}/like", bob), Some(&alice_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["matched"], false);
    assert_eq!(body["outcome"], "pending");

    let (status, body) = t
        .call(Method::POST, &format!("/users/{}/like", alice), Some(&bob_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["matched"], true);
    let chat_id = body["conversation_id"].as_str().unwrap().to_string();

    match alice_events.recv().await {
        Some(GatewayEvent::MatchCreated {
            conversation_id,
            with_user_id,
        }) => {
            assert_eq!(conversation_id, chat_id);
            assert_eq!(with_user_id, bob);
        }
        other => panic!("expected MatchCreated, got {:?}", other),
    }

    let (status, body) = t
        .call(
            Method::POST,
            &format!("/chats/{}/messages", chat_id),
            Some(&alice_token),
            Some(json!({ "text": "hi" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let message_id = body["id"].as_str().unwrap().to_string();

    let (_, body) = t
        .call(Method::GET, &format!("/chats/{}/messages", chat_id), Some(&bob_token), None)
        .await;
    let messages = body.as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["id"], message_id.as_str());
    assert_eq!(messages[0]["senderID"], alice.as_str());
    assert_eq!(messages[0]["text"], "hi");

    let (_, body) = t.call(Method::GET, &format!("/chats/{}", chat_id), Some(&bob_token), None).await;
    assert_eq!(body["lastMessage"], "hi");

    let (_, body) = t.call(Method::GET, "/chats", Some(&bob_token), None).await;
    let inbox = body.as_array().unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0]["title"], format!("Chat with {}", alice));

    let (status, body) = t
        .call(
            Method::GET,
            &format!("/chats/{}/read-receipts/{}", chat_id, bob),
            Some(&alice_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["last_read_id"], Value::Null);

    // Outsiders can neither read nor post.
    let (status, _) = t
        .call(Method::GET, &format!("/chats/{}/messages", chat_id), Some(&carol_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = t
        .call(
            Method::POST,
            &format!("/chats/{}/messages", chat_id),
            Some(&carol_token),
            Some(json!({ "text": "let me in" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn self_like_is_reported_not_matched() {
    let t = test_app("selflike").await;
    let (alice, token) = t.register("alice@example.com").await;

    let (status, body) = t
        .call(Method::POST, &format!("/users/{}/like", alice), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["matched"], false);
    assert_eq!(body["outcome"], "self_like_rejected");
}

#[tokio::test]
async fn profile_photo_round_trip() {
    let t = test_app("profile").await;
    let (alice, token) = t.register("alice@example.com").await;

    let (status, _) = t
        .call(
            Method::PUT,
            "/profile",
            Some(&token),
            Some(json!({ "username": "Alice", "age": "27", "interests": ["surfing"] })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let svg = Request::builder()
        .method(Method::PUT)
        .uri("/profile/photo")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "image/svg+xml")
        .body(Body::from(&b"<svg><script>alert(1)</script></svg>"[..]))
        .unwrap();
    let response = t.app.clone().oneshot(svg).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/profile/photo")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "image/jpeg")
        .body(Body::from(&b"\xff\xd8\xff fake jpeg"[..]))
        .unwrap();
    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let (_, body) = t.call(Method::GET, "/profile", Some(&token), None).await;
    assert_eq!(body["username"], "Alice");
    assert_eq!(body["interests"], json!(["surfing"]));
    let url = body["photoURL"].as_str().unwrap().to_string();
    assert_eq!(url, format!("http://localhost:3000/files/profile_images/{}.jpg", alice));

    let request = Request::builder()
        .uri(format!("/files/profile_images/{}.jpg", alice))
        .body(Body::empty())
        .unwrap();
    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"\xff\xd8\xff fake jpeg");

    let (status, _) = t
        .call(
            Method::PUT,
            "/profile",
            Some(&token),
            Some(json!({ "username": "Alice", "age": "16" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn meetups_and_group_chats() {
    let t = test_app("social").await;
    let (alice, alice_token) = t.register("alice@example.com").await;
    let (bob, bob_token) = t.register("bob@example.com").await;

    let (status, body) = t
        .call(
            Method::POST,
            "/meetups",
            Some(&alice_token),
            Some(json!({
                "title": "Sunset hike",
                "location": "Lisbon",
                "date": "2030-07-01T18:00:00Z",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let meetup_id = body["id"].as_str().unwrap().to_string();

    let (status, _) = t
        .call(
            Method::POST,
            &format!("/meetups/{}/attendees", meetup_id),
            Some(&bob_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = t.call(Method::GET, "/meetups", Some(&bob_token), None).await;
    assert_eq!(body[0]["attendees"], json!([alice, bob]));

    let (status, body) = t
        .call(
            Method::POST,
            "/group-chats",
            Some(&alice_token),
            Some(json!({ "title": "Hikers", "participants": [bob] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let group_id = body["id"].as_str().unwrap().to_string();

    let (status, _) = t
        .call(
            Method::POST,
            &format!("/group-chats/{}/messages", group_id),
            Some(&bob_token),
            Some(json!({ "text": "see you there" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = t
        .call(
            Method::GET,
            &format!("/group-chats/{}/messages", group_id),
            Some(&alice_token),
            None,
        )
        .await;
    assert_eq!(body[0]["text"], "see you there");

    let (_, body) = t.call(Method::GET, "/group-chats", Some(&bob_token), None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}
