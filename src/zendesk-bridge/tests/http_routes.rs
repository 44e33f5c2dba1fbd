//! End-to-end tests of the HTTP surface against a mocked Zendesk.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use tokio::sync::mpsc;
use tower::ServiceExt;
use wiremock::matchers::{header as header_eq, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use zendesk_bridge::credentials::{CredentialStore, MemoryCredentialStore};
use zendesk_bridge::sink::{ReplySink, ReplyTarget, SinkError};
use zendesk_bridge::{AppState, BridgeConfig, Reply, create_router};

const USER_HEADER: &str = "Mattermost-User-ID";
const COMMAND_TOKEN: &str = "cmd-token";

/// Captures replies instead of posting them.
struct ChannelSink(mpsc::UnboundedSender<(ReplyTarget, Reply)>);

#[async_trait]
impl ReplySink for ChannelSink {
    async fn post_ephemeral(&self, target: &ReplyTarget, reply: &Reply) -> Result<(), SinkError> {
        let _ = self.0.send((target.clone(), reply.clone()));
        Ok(())
    }
}

struct Harness {
    app: Router,
    store: Arc<MemoryCredentialStore>,
    replies: mpsc::UnboundedReceiver<(ReplyTarget, Reply)>,
}

impl Harness {
    fn new(zendesk: &MockServer, customize: impl FnOnce(&mut BridgeConfig)) -> Self {
        let mut config = BridgeConfig::default();
        config.zendesk.url = zendesk.uri();
        config.zendesk.api_url = Some(format!("{}/api/v2/", zendesk.uri()));
        config.zendesk.client_secret = Some("s3cret".to_string());
        config.public_url = "https://chat.example.com/plugins/zendesk".to_string();
        config.request_timeout_secs = 2;
        config.command_token = Some(COMMAND_TOKEN.to_string());
        customize(&mut config);

        let store = Arc::new(MemoryCredentialStore::new());
        let (tx, replies) = mpsc::unbounded_channel();
        let state = AppState::builder(config)
            .store(store.clone())
            .sink(Arc::new(ChannelSink(tx)))
            .build()
            .unwrap();

        Self {
            app: create_router(state),
            store,
            replies,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, String) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn command(&mut self, user: &str, text: &str) -> Reply {
        let body = format!(
            "command=%2Fzendesk&text={}&user_id={}&channel_id=c1&token={}&response_url=https%3A%2F%2Fchat.example.com%2Fhooks%2F1",
            urlencoding::encode(text),
            user,
            COMMAND_TOKEN
        );
        let request = Request::post("/command")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        let (status, _, body) = self.send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "{}");

        let (target, reply) = tokio::time::timeout(Duration::from_secs(5), self.replies.recv())
            .await
            .expect("reply delivered")
            .expect("sink open");
        assert_eq!(target.user_id, user);
        reply
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_liveness_and_not_found() {
    let zendesk = MockServer::start().await;
    let harness = Harness::new(&zendesk, |_| {});

    let (status, _, body) = harness.send(get("/test")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Hello, world!");

    let (status, _, _) = harness.send(get("/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_connect_route() {
    let zendesk = MockServer::start().await;
    let harness = Harness::new(&zendesk, |_| {});

    let request = Request::post("/user/connect")
        .header(USER_HEADER, "u1")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = harness.send(request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _, _) = harness.send(get("/user/connect")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::get("/user/connect")
        .header(USER_HEADER, "u1")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = harness.send(request).await;
    assert_eq!(status, StatusCode::FOUND);
    let location = headers[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with(&format!(
        "{}/oauth/authorizations/new?response_type=code",
        zendesk.uri()
    )));
    assert!(location.contains("client_id=mattermost_integration_for_zendesk"));
}

#[tokio::test]
async fn test_failed_exchange_returns_200_and_stores_nothing() {
    let zendesk = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/tokens"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&zendesk)
        .await;
    let harness = Harness::new(&zendesk, |_| {});

    let request = Request::get("/oauth/redirect?code=abc")
        .header(USER_HEADER, "u1")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = harness.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Connection failed"));
    assert!(body.contains("boom"));
    assert!(!body.contains("s3cret"));
    assert!(harness.store.is_empty().await);
}

#[tokio::test]
async fn test_malformed_callback_returns_200() {
    let zendesk = MockServer::start().await;
    let harness = Harness::new(&zendesk, |_| {});

    let request = Request::post("/oauth/complete")
        .header(USER_HEADER, "u1")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("code=abc"))
        .unwrap();
    let (status, _, body) = harness.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Connection failed"));
    assert!(harness.store.is_empty().await);
}

#[tokio::test]
async fn test_connect_use_and_disconnect() {
    let zendesk = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/tokens"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"access_token": "tok-u1", "scope": "read write"})),
        )
        .expect(1)
        .mount(&zendesk)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/tickets/42.json"))
        .and(query_param("include", "users"))
        .and(header_eq("authorization", "Bearer tok-u1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ticket": {"id": 42, "status": "pending"},
            "users": []
        })))
        .expect(1)
        .mount(&zendesk)
        .await;

    let mut harness = Harness::new(&zendesk, |_| {});

    // Not connected and no service account.
    let reply = harness.command("u1", "status 42").await;
    assert!(reply.text_or_empty().contains("`/zendesk connect`"));

    let request = Request::post("/oauth/redirect")
        .header(USER_HEADER, "u1")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("code=abc"))
        .unwrap();
    let (status, _, body) = harness.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Zendesk account connected"));
    assert!(!body.contains("tok-u1"));

    let reply = harness.command("u1", "status 42").await;
    assert_eq!(reply.text_or_empty(), "pending");

    let reply = harness.command("u1", "disconnect").await;
    assert_eq!(
        reply.text_or_empty(),
        "Your Zendesk account has been disconnected."
    );
    assert!(harness.store.get("u1").await.is_none());

    let reply = harness.command("u1", "status 42").await;
    assert!(reply.text_or_empty().contains("`/zendesk connect`"));
}

#[tokio::test]
async fn test_update_posts_comment_verbatim() {
    let zendesk = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v2/tickets/42.json"))
        .and(wiremock::matchers::body_json(serde_json::json!({
            "ticket": {"comment": {"body": "hello   world", "public": false}}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"ticket": {"id": 42}})),
        )
        .expect(1)
        .mount(&zendesk)
        .await;

    let mut harness = Harness::new(&zendesk, |_| {});
    harness
        .store
        .put("u1", zendesk_bridge::credentials::StoredToken::new("tok"))
        .await;

    let reply = harness
        .command("u1", "  update   private  42   hello   world  ")
        .await;
    assert_eq!(
        reply.text_or_empty(),
        "Private comment [hello   world] was added to ticket #42"
    );
}

#[tokio::test]
async fn test_bad_ticket_id_makes_no_upstream_call() {
    let zendesk = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&zendesk)
        .await;

    let mut harness = Harness::new(&zendesk, |config| {
        config.zendesk.username = Some("svc@example.com".to_string());
        config.zendesk.password = Some("pw".to_string());
    });

    let reply = harness.command("u1", "status abc").await;
    assert_eq!(reply.text_or_empty(), "`abc` is not a valid case number.");
}

fn command_request(body: &str) -> Request<Body> {
    Request::post("/command")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_command_token_checked() {
    let zendesk = MockServer::start().await;
    let harness = Harness::new(&zendesk, |_| {});

    let (status, _, _) = harness
        .send(command_request(
            "command=%2Fzendesk&text=help&user_id=u1&token=wrong",
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_command_without_token_cannot_act_for_user() {
    let zendesk = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&zendesk)
        .await;

    let mut harness = Harness::new(&zendesk, |_| {});
    harness
        .store
        .put("u1", zendesk_bridge::credentials::StoredToken::new("tok"))
        .await;

    let (status, _, _) = harness
        .send(command_request(
            "command=%2Fzendesk&text=update%20private%2042%20hi&user_id=u1&channel_id=c1",
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(harness.replies.try_recv().is_err());
}

#[tokio::test]
async fn test_unauthenticated_commands_when_opted_in() {
    let zendesk = MockServer::start().await;
    let mut harness = Harness::new(&zendesk, |config| {
        config.command_token = None;
        config.allow_unauthenticated_commands = true;
    });

    let (status, _, _) = harness
        .send(command_request("command=%2Fzendesk&text=help&user_id=u1"))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, reply) = tokio::time::timeout(Duration::from_secs(5), harness.replies.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(reply.text_or_empty().contains("Slash Command Help"));
}

/// Delivers replies only after a pause.
struct SlowSink(mpsc::UnboundedSender<Reply>);

#[async_trait]
impl ReplySink for SlowSink {
    async fn post_ephemeral(&self, _target: &ReplyTarget, reply: &Reply) -> Result<(), SinkError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let _ = self.0.send(reply.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_shutdown_waits_for_pending_replies() {
    let zendesk = MockServer::start().await;
    let mut config = BridgeConfig::default();
    config.zendesk.url = zendesk.uri();
    config.zendesk.client_secret = Some("s3cret".to_string());
    config.command_token = Some(COMMAND_TOKEN.to_string());

    let (tx, mut replies) = mpsc::unbounded_channel();
    let state = AppState::builder(config)
        .sink(Arc::new(SlowSink(tx)))
        .build()
        .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(zendesk_bridge::serve(listener, state, async move {
        let _ = stop_rx.await;
    }));

    let response = reqwest::Client::new()
        .post(format!("http://{}/command", addr))
        .header(header::CONNECTION, "close")
        .form(&[
            ("command", "/zendesk"),
            ("text", "help"),
            ("user_id", "u1"),
            ("token", COMMAND_TOKEN),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let _ = stop_tx.send(());
    server.await.unwrap().unwrap();

    let reply = replies.try_recv().expect("reply delivered before shutdown finished");
    assert!(reply.text_or_empty().contains("Slash Command Help"));
}

#[tokio::test]
async fn test_help_for_unknown_verb() {
    let zendesk = MockServer::start().await;
    let mut harness = Harness::new(&zendesk, |_| {});

    let reply = harness.command("u1", "frobnicate").await;
    assert!(reply.text_or_empty().contains("Slash Command Help"));
    assert!(reply.text_or_empty().contains("/zendesk disconnect"));
}
