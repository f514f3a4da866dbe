//! Adapters and validators against local stand-ins for the platform APIs

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use common::{episode, fields, registry_at, spawn_server, test_config, Harness};
use libpodrelay::notify::RecordingNotifier;
use libpodrelay::{Level, PlatformId, Trigger};
use serde_json::{json, Value};

type Params = HashMap<String, String>;

async fn harness_for(app: Router) -> Harness {
    harness_with_base(app).await.0
}

async fn harness_with_base(app: Router) -> (Harness, String) {
    let base = spawn_server(app).await;
    let notifier = Arc::new(RecordingNotifier::new());
    let harness = Harness::new(
        test_config(),
        registry_at(&base, notifier.clone()),
        notifier,
        vec![],
    );
    (harness, base)
}

fn graph_error(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({ "error": { "message": message, "type": "OAuthException", "code": 190 } })),
    )
}

#[tokio::test]
async fn test_facebook_user_token_upgraded_to_page_token() {
    let app = Router::new()
        .route(
            "/me",
            get(|| async { Json(json!({ "id": "555", "name": "Host" })) }),
        )
        .route(
            "/debug_token",
            get(|Query(q): Query<Params>| async move {
                assert_eq!(q["access_token"], "app-1|app-secret");
                Json(json!({
                    "data": { "is_valid": true, "type": "USER", "expires_at": 1767225600 }
                }))
            }),
        )
        .route(
            "/oauth/access_token",
            get(|Query(q): Query<Params>| async move {
                assert_eq!(q["grant_type"], "fb_exchange_token");
                assert_eq!(q["fb_exchange_token"], "short-user");
                Json(json!({ "access_token": "long-user", "token_type": "bearer" }))
            }),
        )
        .route(
            "/{page_id}",
            get(|Path(page_id): Path<String>, Query(q): Query<Params>| async move {
                if q.get("access_token").map(String::as_str) != Some("long-user") {
                    return graph_error(StatusCode::BAD_REQUEST, "wrong token");
                }
                (
                    StatusCode::OK,
                    Json(json!({ "id": page_id, "access_token": "page-forever", "name": "The Show" })),
                )
            }),
        );
    let harness = harness_for(app).await;

    let result = harness
        .service
        .validate_credentials(
            PlatformId::Facebook,
            fields(&[
                ("page_id", "1234"),
                ("access_token", "short-user"),
                ("app_id", "app-1"),
                ("app_secret", "app-secret"),
            ]),
            Some(true),
        )
        .await
        .unwrap();
    assert!(result.valid, "{:?}", result.error);
    assert_eq!(result.derived.token_expiry.as_deref(), Some("never"));

    let stored = harness
        .credentials()
        .get(Level::Target, PlatformId::Facebook)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.validated);
    assert!(stored.enabled);
    assert_eq!(stored.fields["access_token"], "page-forever");
    assert_eq!(stored.fields["token_expiry"], "never");
    assert_eq!(stored.fields["page_name"], "The Show");
}

#[tokio::test]
async fn test_facebook_invalid_token_is_not_saved() {
    let app = Router::new()
        .route(
            "/me",
            get(|| async { Json(json!({ "id": "555" })) }),
        )
        .route(
            "/debug_token",
            get(|| async {
                Json(json!({
                    "data": {
                        "is_valid": false,
                        "error": { "message": "Session has expired" }
                    }
                }))
            }),
        );
    let harness = harness_for(app).await;

    let result = harness
        .service
        .validate_credentials(
            PlatformId::Facebook2,
            fields(&[
                ("page_id", "1234"),
                ("access_token", "stale"),
                ("app_id", "app-1"),
                ("app_secret", "app-secret"),
            ]),
            Some(true),
        )
        .await
        .unwrap();
    assert!(!result.valid);
    assert!(result.error.unwrap().contains("Session has expired"));
    assert!(harness
        .credentials()
        .get(Level::Target, PlatformId::Facebook2)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_twitter_post_signed_with_oauth1() {
    let bodies: Arc<Mutex<Vec<Value>>> = Arc::default();
    let seen = bodies.clone();
    let app = Router::new().route(
        "/2/tweets",
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let seen = seen.clone();
            async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                assert!(auth.starts_with("OAuth "), "{}", auth);
                assert!(auth.contains("oauth_signature="));
                seen.lock().unwrap().push(body);
                (
                    StatusCode::CREATED,
                    Json(json!({ "data": { "id": "1790", "text": "ok" } })),
                )
            }
        }),
    );
    let harness = harness_for(app).await;
    harness.configure(PlatformId::Twitter).await;

    let report = harness
        .service
        .controller()
        .run_targets(&episode(PlatformId::YouTube, "yt-1"), &[PlatformId::Twitter])
        .await
        .unwrap();

    let result = &report.results[&PlatformId::Twitter];
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.post_id.as_deref(), Some("1790"));
    assert_eq!(
        result.post_url.as_deref(),
        Some("https://x.com/i/web/status/1790")
    );

    let bodies = bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    let text = bodies[0]["text"].as_str().unwrap();
    assert!(text.starts_with("Episode yt-1"));
    assert!(text.contains("https://example.com/watch/yt-1"));
    assert!(text.ends_with("#podcast"));
}

#[tokio::test]
async fn test_bluesky_post_persists_session_identity() {
    let app = Router::new()
        .route(
            "/xrpc/com.atproto.server.createSession",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["identifier"], "show.bsky.social");
                Json(json!({
                    "did": "did:plc:abc",
                    "handle": "show.bsky.social",
                    "accessJwt": "jwt-1",
                    "refreshJwt": "refresh-1"
                }))
            }),
        )
        .route(
            "/xrpc/com.atproto.repo.createRecord",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(
                    headers.get("authorization").and_then(|v| v.to_str().ok()),
                    Some("Bearer jwt-1")
                );
                assert_eq!(body["repo"], "did:plc:abc");
                assert_eq!(body["record"]["$type"], "app.bsky.feed.post");
                Json(json!({
                    "uri": "at://did:plc:abc/app.bsky.feed.post/3kxyz",
                    "cid": "bafy"
                }))
            }),
        );
    let harness = harness_for(app).await;
    harness.configure(PlatformId::Bluesky).await;

    let report = harness
        .service
        .controller()
        .run_targets(&episode(PlatformId::Spotify, "sp-1"), &[PlatformId::Bluesky])
        .await
        .unwrap();

    let result = &report.results[&PlatformId::Bluesky];
    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        result.post_url.as_deref(),
        Some("https://bsky.app/profile/show.bsky.social/post/3kxyz")
    );

    let stored = harness
        .credentials()
        .get(Level::Target, PlatformId::Bluesky)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.fields["did"], "did:plc:abc");
    assert_eq!(stored.fields["handle"], "show.bsky.social");
}

#[tokio::test]
async fn test_bluesky_bad_password_is_authentication_error() {
    let app = Router::new().route(
        "/xrpc/com.atproto.server.createSession",
        post(|| async {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "AuthenticationRequired",
                    "message": "Invalid identifier or password"
                })),
            )
        }),
    );
    let harness = harness_for(app).await;
    harness.configure(PlatformId::Bluesky).await;

    let report = harness
        .service
        .controller()
        .run_targets(&episode(PlatformId::Spotify, "sp-2"), &[PlatformId::Bluesky])
        .await
        .unwrap();

    let error = report.results[&PlatformId::Bluesky].error.clone().unwrap();
    assert!(error.contains("Invalid identifier or password"), "{}", error);
    assert!(error.contains("app password"), "{}", error);
}

#[tokio::test]
async fn test_linkedin_fetches_and_keeps_person_urn() {
    let profile_hits = Arc::new(AtomicUsize::new(0));
    let counter = profile_hits.clone();
    let app = Router::new()
        .route(
            "/v2/userinfo",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(json!({ "sub": "abc123", "name": "Host" }))
                }
            }),
        )
        .route(
            "/v2/ugcPosts",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["author"], "urn:li:person:abc123");
                (
                    StatusCode::CREATED,
                    [("x-restli-id", "urn:li:share:42")],
                    "",
                )
            }),
        );
    let harness = harness_for(app).await;
    harness.configure(PlatformId::LinkedIn).await;
    let controller = harness.service.controller();

    let first = controller
        .run(&episode(PlatformId::YouTube, "yt-7"), Trigger::Manual, false)
        .await
        .unwrap();
    let result = &first.results[&PlatformId::LinkedIn];
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.post_id.as_deref(), Some("urn:li:share:42"));
    assert_eq!(
        result.post_url.as_deref(),
        Some("https://www.linkedin.com/feed/update/urn:li:share:42/")
    );

    let stored = harness
        .credentials()
        .get(Level::Target, PlatformId::LinkedIn)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.fields["person_urn"], "urn:li:person:abc123");

    // The stored URN is reused on the next post
    controller
        .run(&episode(PlatformId::YouTube, "yt-8"), Trigger::Manual, false)
        .await
        .unwrap();
    assert_eq!(profile_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_linkedin_forbidden_carries_scope_hint() {
    let app = Router::new().route(
        "/v2/ugcPosts",
        post(|| async {
            (
                StatusCode::FORBIDDEN,
                Json(json!({ "message": "Not enough permissions to access: ugcPosts.CREATE" })),
            )
        }),
    );
    let harness = harness_for(app).await;
    harness
        .credentials()
        .save(
            Level::Target,
            PlatformId::LinkedIn,
            fields(&[
                ("access_token", "token-0123456789"),
                ("person_urn", "urn:li:person:abc123"),
            ]),
            Some(true),
            true,
        )
        .await
        .unwrap();

    let report = harness
        .service
        .controller()
        .run_targets(&episode(PlatformId::YouTube, "yt-9"), &[PlatformId::LinkedIn])
        .await
        .unwrap();

    let error = report.results[&PlatformId::LinkedIn].error.clone().unwrap();
    assert!(error.contains("HTTP 403"), "{}", error);
    assert!(error.contains("w_member_social"), "{}", error);
}

#[tokio::test]
async fn test_threads_container_then_publish() {
    let steps: Arc<Mutex<Vec<String>>> = Arc::default();
    let create_steps = steps.clone();
    let publish_steps = steps.clone();
    let app = Router::new()
        .route(
            "/me",
            get(|| async { Json(json!({ "id": "t-1", "username": "show" })) }),
        )
        .route(
            "/{node}",
            get(|Path(node): Path<String>| async move {
                assert_eq!(node, "p-1");
                Json(json!({ "permalink": "https://www.threads.net/@show/post/abc" }))
            }),
        )
        .route(
            "/{user}/threads",
            post(move |Path(user): Path<String>, Form(form): Form<Params>| {
                let steps = create_steps.clone();
                async move {
                    assert_eq!(user, "t-1");
                    assert_eq!(form["media_type"], "TEXT");
                    assert!(form["text"].contains("https://example.com/watch/sp-3"));
                    steps.lock().unwrap().push("create".to_string());
                    Json(json!({ "id": "c-1" }))
                }
            }),
        )
        .route(
            "/{user}/threads_publish",
            post(move |Form(form): Form<Params>| {
                let steps = publish_steps.clone();
                async move {
                    assert_eq!(form["creation_id"], "c-1");
                    steps.lock().unwrap().push("publish".to_string());
                    Json(json!({ "id": "p-1" }))
                }
            }),
        );
    let harness = harness_for(app).await;
    harness.configure(PlatformId::Threads).await;

    let report = harness
        .service
        .controller()
        .run_targets(&episode(PlatformId::Spotify, "sp-3"), &[PlatformId::Threads])
        .await
        .unwrap();

    let result = &report.results[&PlatformId::Threads];
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.post_id.as_deref(), Some("p-1"));
    assert_eq!(
        result.post_url.as_deref(),
        Some("https://www.threads.net/@show/post/abc")
    );
    assert_eq!(*steps.lock().unwrap(), vec!["create", "publish"]);

    let stored = harness
        .credentials()
        .get(Level::Target, PlatformId::Threads)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.fields["user_id"], "t-1");
    assert_eq!(stored.fields["username"], "show");
}

#[tokio::test]
async fn test_facebook_forbidden_is_retried_then_reported() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/{page_id}/feed",
        post(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                graph_error(
                    StatusCode::FORBIDDEN,
                    "(#200) The user hasn't authorized the application to perform this action",
                )
            }
        }),
    );
    let harness = harness_for(app).await;
    harness.configure(PlatformId::Facebook).await;

    let report = harness
        .service
        .controller()
        .run_targets(&episode(PlatformId::Spotify, "sp-4"), &[PlatformId::Facebook])
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    let error = report.results[&PlatformId::Facebook].error.clone().unwrap();
    assert!(error.contains("hasn't authorized"), "{}", error);
    assert!(error.contains("pages_manage_posts"), "{}", error);
    // One attempt plus the two default retries
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_linkedin_organization_requires_admin_access() {
    let app = Router::new()
        .route(
            "/v2/userinfo",
            get(|| async { Json(json!({ "sub": "abc123", "name": "Host" })) }),
        )
        .route(
            "/v2/organizationAcls",
            get(|Query(q): Query<Params>| async move {
                assert_eq!(q["q"], "roleAssignee");
                assert_eq!(q["role"], "ADMINISTRATOR");
                Json(json!({
                    "elements": [{ "organization": "urn:li:organization:555", "state": "APPROVED" }]
                }))
            }),
        )
        .route(
            "/v2/organizations/{id}",
            get(|| async {
                (
                    StatusCode::FORBIDDEN,
                    Json(json!({ "message": "Not enough permissions to access: organizations.GET" })),
                )
            }),
        );
    let harness = harness_for(app).await;
    let service = &harness.service;

    let admin = service
        .validate_credentials(
            PlatformId::LinkedIn,
            fields(&[
                ("access_token", "token-0123456789"),
                ("organization_urn", "urn:li:organization:555"),
            ]),
            Some(true),
        )
        .await
        .unwrap();
    assert!(admin.valid, "{:?}", admin.error);
    assert_eq!(admin.derived.person_urn.as_deref(), Some("urn:li:person:abc123"));

    let outsider = service
        .validate_credentials(
            PlatformId::LinkedIn,
            fields(&[
                ("access_token", "token-other-98765"),
                ("organization_urn", "urn:li:organization:777"),
            ]),
            Some(true),
        )
        .await
        .unwrap();
    assert!(!outsider.valid);
    let error = outsider.error.unwrap();
    assert!(error.contains("no administrator access"), "{}", error);
    assert!(error.contains("urn:li:organization:777"), "{}", error);

    // The rejected record does not replace the validated one
    let stored = harness
        .credentials()
        .get(Level::Target, PlatformId::LinkedIn)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.validated);
    assert_eq!(stored.fields["organization_urn"], "urn:li:organization:555");
    assert_eq!(stored.fields["person_urn"], "urn:li:person:abc123");
}

#[tokio::test]
async fn test_youtube_channel_must_exist() {
    let app = Router::new().route(
        "/channels",
        get(|Query(q): Query<Params>| async move {
            assert_eq!(q["part"], "snippet");
            assert_eq!(q["key"], "yt-key-0123456789");
            if q["id"] == "UC-real" {
                Json(json!({ "items": [{ "id": "UC-real", "snippet": { "title": "The Show" } }] }))
            } else {
                Json(json!({ "kind": "youtube#channelListResponse", "items": [] }))
            }
        }),
    );
    let harness = harness_for(app).await;

    let missing = harness
        .service
        .validate_credentials(
            PlatformId::YouTube,
            fields(&[("api_key", "yt-key-0123456789"), ("channel_id", "UC-gone")]),
            Some(true),
        )
        .await
        .unwrap();
    assert!(!missing.valid);
    assert_eq!(
        missing.error.as_deref(),
        Some("No YouTube channel with id UC-gone")
    );
    assert!(harness
        .credentials()
        .get(Level::Source, PlatformId::YouTube)
        .await
        .unwrap()
        .is_none());

    let found = harness
        .service
        .validate_credentials(
            PlatformId::YouTube,
            fields(&[("api_key", "yt-key-0123456789"), ("channel_id", "UC-real")]),
            Some(true),
        )
        .await
        .unwrap();
    assert!(found.valid, "{:?}", found.error);
    let stored = harness
        .credentials()
        .get(Level::Source, PlatformId::YouTube)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.validated);
    assert_eq!(stored.fields["channel_id"], "UC-real");
}

#[tokio::test]
async fn test_spotify_client_credentials_look_up_the_show() {
    let app = Router::new()
        .route(
            "/api/token",
            post(|headers: HeaderMap, Form(form): Form<Params>| async move {
                assert_eq!(form["grant_type"], "client_credentials");
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                assert!(auth.starts_with("Basic "), "{}", auth);
                Json(json!({ "access_token": "app-token", "token_type": "Bearer", "expires_in": 3600 }))
            }),
        )
        .route(
            "/v1/shows/{id}",
            get(|Path(id): Path<String>, headers: HeaderMap| async move {
                assert_eq!(
                    headers.get("authorization").and_then(|v| v.to_str().ok()),
                    Some("Bearer app-token")
                );
                if id == "show-ok" {
                    (StatusCode::OK, Json(json!({ "id": id, "name": "The Show" })))
                } else {
                    (
                        StatusCode::NOT_FOUND,
                        Json(json!({ "error": { "status": 404, "message": "Non existing id" } })),
                    )
                }
            }),
        );
    let harness = harness_for(app).await;

    let unknown = harness
        .service
        .validate_credentials(
            PlatformId::Spotify,
            fields(&[
                ("client_id", "spotify-client"),
                ("client_secret", "spotify-secret"),
                ("show_id", "show-gone"),
            ]),
            Some(true),
        )
        .await
        .unwrap();
    assert!(!unknown.valid);
    let error = unknown.error.unwrap();
    assert!(error.contains("Non existing id"), "{}", error);

    let known = harness
        .service
        .validate_credentials(
            PlatformId::Spotify,
            fields(&[
                ("client_id", "spotify-client"),
                ("client_secret", "spotify-secret"),
                ("show_id", "show-ok"),
            ]),
            Some(true),
        )
        .await
        .unwrap();
    assert!(known.valid, "{:?}", known.error);
    let stored = harness
        .credentials()
        .get(Level::Source, PlatformId::Spotify)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.validated);
    assert_eq!(stored.fields["show_id"], "show-ok");
}

#[tokio::test]
async fn test_spotify_feed_url_must_serve_a_feed() {
    let app = Router::new()
        .route(
            "/feed.xml",
            get(|| async {
                r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>The Show</title></channel></rss>"#
            }),
        )
        .route(
            "/landing",
            get(|| async { "<!DOCTYPE html><html><body>Listen on Spotify</body></html>" }),
        );
    let (harness, base) = harness_with_base(app).await;

    let page_url = format!("{}/landing", base);
    let page = harness
        .service
        .validate_credentials(
            PlatformId::Spotify,
            fields(&[("rss_url", page_url.as_str())]),
            Some(true),
        )
        .await
        .unwrap();
    assert!(!page.valid);
    assert_eq!(
        page.error,
        Some(format!("{} is not an RSS or Atom feed", page_url))
    );

    let feed_url = format!("{}/feed.xml", base);
    let feed = harness
        .service
        .validate_credentials(
            PlatformId::Spotify,
            fields(&[("rss_url", feed_url.as_str())]),
            Some(true),
        )
        .await
        .unwrap();
    assert!(feed.valid, "{:?}", feed.error);
    let stored = harness
        .credentials()
        .get(Level::Source, PlatformId::Spotify)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.fields["rss_url"], feed_url);
}

#[tokio::test]
async fn test_instagram_validation_stores_account_profile() {
    let app = Router::new().route(
        "/{node}",
        get(|Path(node): Path<String>, Query(q): Query<Params>| async move {
            assert_eq!(node, "17841");
            assert_eq!(q["fields"], "id,username");
            assert_eq!(q["access_token"], "token-0123456789");
            Json(json!({ "id": "17841", "username": "theshow" }))
        }),
    );
    let harness = harness_for(app).await;

    let result = harness
        .service
        .validate_credentials(
            PlatformId::Instagram,
            fields(&[
                ("access_token", "token-0123456789"),
                ("business_account_id", "17841"),
            ]),
            Some(true),
        )
        .await
        .unwrap();
    assert!(result.valid, "{:?}", result.error);

    let stored = harness
        .credentials()
        .get(Level::Target, PlatformId::Instagram)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.validated);
    assert_eq!(stored.fields["user_id"], "17841");
    assert_eq!(stored.fields["username"], "theshow");
}

#[tokio::test]
async fn test_threads_validation_stores_user_profile() {
    let app = Router::new().route(
        "/me",
        get(|Query(q): Query<Params>| async move {
            assert_eq!(q["access_token"], "token-0123456789");
            Json(json!({ "id": "t-9", "username": "show" }))
        }),
    );
    let harness = harness_for(app).await;

    let result = harness
        .service
        .validate_credentials(
            PlatformId::Threads,
            fields(&[("access_token", "token-0123456789")]),
            Some(true),
        )
        .await
        .unwrap();
    assert!(result.valid, "{:?}", result.error);
    assert_eq!(result.derived.user_id.as_deref(), Some("t-9"));

    let stored = harness
        .credentials()
        .get(Level::Target, PlatformId::Threads)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.fields["user_id"], "t-9");
    assert_eq!(stored.fields["username"], "show");
}

#[tokio::test]
async fn test_bluesky_validation_stores_did_and_handle() {
    let app = Router::new().route(
        "/xrpc/com.atproto.server.createSession",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body["identifier"], "show.bsky.social");
            assert_eq!(body["password"], "abcd-efgh-ijkl-mnop");
            Json(json!({
                "did": "did:plc:xyz",
                "handle": "show.bsky.social",
                "accessJwt": "jwt-1",
                "refreshJwt": "refresh-1"
            }))
        }),
    );
    let harness = harness_for(app).await;

    let result = harness
        .service
        .validate_credentials(
            PlatformId::Bluesky,
            fields(&[
                ("identifier", "show.bsky.social"),
                ("app_password", "abcd-efgh-ijkl-mnop"),
            ]),
            Some(true),
        )
        .await
        .unwrap();
    assert!(result.valid, "{:?}", result.error);

    let stored = harness
        .credentials()
        .get(Level::Target, PlatformId::Bluesky)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.validated);
    assert_eq!(stored.fields["did"], "did:plc:xyz");
    assert_eq!(stored.fields["handle"], "show.bsky.social");
}

#[tokio::test]
async fn test_instagram_uploads_card_then_publishes_with_token_only() {
    let steps: Arc<Mutex<Vec<String>>> = Arc::default();
    let create_steps = steps.clone();
    let publish_steps = steps.clone();
    let app = Router::new()
        .route(
            "/me",
            get(|| async { Json(json!({ "id": "ig-1", "username": "theshow" })) }),
        )
        .route(
            "/{node}",
            get(|Path(node): Path<String>, Query(q): Query<Params>| async move {
                assert_eq!(node, "m-1");
                assert_eq!(q["fields"], "permalink");
                Json(json!({ "permalink": "https://www.instagram.com/p/abc/" }))
            }),
        )
        .route(
            "/{user}/media",
            post(move |Path(user): Path<String>, Form(form): Form<Params>| {
                let steps = create_steps.clone();
                async move {
                    assert_eq!(user, "ig-1");
                    assert!(form["image_url"].starts_with("https://cdn.test/instagram/"));
                    assert!(form["image_url"].ends_with(".png"));
                    assert!(form["caption"].contains("New episode: Episode yt-5"));
                    assert!(form["caption"].contains("https://example.com/watch/yt-5"));
                    steps.lock().unwrap().push("media".to_string());
                    Json(json!({ "id": "cont-1" }))
                }
            }),
        )
        .route(
            "/{user}/media_publish",
            post(move |Path(user): Path<String>, Form(form): Form<Params>| {
                let steps = publish_steps.clone();
                async move {
                    assert_eq!(user, "ig-1");
                    assert_eq!(form["creation_id"], "cont-1");
                    steps.lock().unwrap().push("media_publish".to_string());
                    Json(json!({ "id": "m-1" }))
                }
            }),
        );
    let harness = harness_for(app).await;
    harness.configure(PlatformId::Instagram).await;

    let report = harness
        .service
        .controller()
        .run_targets(&episode(PlatformId::YouTube, "yt-5"), &[PlatformId::Instagram])
        .await
        .unwrap();

    let result = &report.results[&PlatformId::Instagram];
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.post_id.as_deref(), Some("m-1"));
    assert_eq!(
        result.post_url.as_deref(),
        Some("https://www.instagram.com/p/abc/")
    );
    assert_eq!(*steps.lock().unwrap(), vec!["media", "media_publish"]);

    let stored = harness
        .credentials()
        .get(Level::Target, PlatformId::Instagram)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.fields["user_id"], "ig-1");
    assert_eq!(stored.fields["username"], "theshow");
}

#[tokio::test]
async fn test_threads_user_id_kept_when_publish_fails() {
    let profile_hits = Arc::new(AtomicUsize::new(0));
    let counter = profile_hits.clone();
    let app = Router::new()
        .route(
            "/me",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(json!({ "id": "t-1", "username": "show" }))
                }
            }),
        )
        .route(
            "/{user}/threads",
            post(|Path(user): Path<String>| async move {
                assert_eq!(user, "t-1");
                Json(json!({ "id": "c-1" }))
            }),
        )
        .route(
            "/{user}/threads_publish",
            post(|| async {
                graph_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Service temporarily unavailable",
                )
            }),
        );
    let harness = harness_for(app).await;
    harness.configure(PlatformId::Threads).await;
    let controller = harness.service.controller();

    for video in ["sp-11", "sp-12"] {
        let report = controller
            .run_targets(&episode(PlatformId::Spotify, video), &[PlatformId::Threads])
            .await
            .unwrap();
        let error = report.results[&PlatformId::Threads].error.clone().unwrap();
        assert!(error.contains("Service temporarily unavailable"), "{}", error);
    }

    let stored = harness
        .credentials()
        .get(Level::Target, PlatformId::Threads)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.fields["user_id"], "t-1");
    assert_eq!(stored.fields["username"], "show");
    assert_eq!(profile_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_linkedin_person_urn_kept_when_post_fails() {
    let profile_hits = Arc::new(AtomicUsize::new(0));
    let counter = profile_hits.clone();
    let app = Router::new()
        .route(
            "/v2/userinfo",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(json!({ "sub": "abc123", "name": "Host" }))
                }
            }),
        )
        .route(
            "/v2/ugcPosts",
            post(|| async {
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "message": "Upstream unavailable" })),
                )
            }),
        );
    let harness = harness_for(app).await;
    harness.configure(PlatformId::LinkedIn).await;
    let controller = harness.service.controller();

    for video in ["yt-21", "yt-22"] {
        let report = controller
            .run_targets(&episode(PlatformId::YouTube, video), &[PlatformId::LinkedIn])
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
    }

    let stored = harness
        .credentials()
        .get(Level::Target, PlatformId::LinkedIn)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.fields["person_urn"], "urn:li:person:abc123");
    assert_eq!(profile_hits.load(Ordering::SeqCst), 1);
}
