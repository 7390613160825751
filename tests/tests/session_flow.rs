use application::auth_service::{AuthService, BootstrapOutcome};
use application::chat_service::{ChatOutcome, ChatService};
use axum::http::StatusCode;
use axum::Router;
use domain::route::{Route, RouteDecision};
use domain::session::SessionState;
use infrastructure::session_store::SessionStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tests::{
    backend_client, fake_jwt, session_guard, spawn_stub, stub_route, token_response, token_set,
    Recorder, Reply, OIDC_BASE,
};

fn oidc(path: &str) -> String {
    format!("{OIDC_BASE}/{path}")
}

#[tokio::test]
async fn near_expiry_token_is_refreshed_once_and_the_new_one_sent() {
    let fresh = fake_jwt(json!({"sub": "u1", "preferred_username": "alice"}));
    let recorder = Recorder::new();
    let app = Router::new()
        .route(
            &oidc("token"),
            stub_route(&recorder, vec![Reply::json(token_response(&fresh, "refresh-2"))]),
        )
        .route("/llm/chat", stub_route(&recorder, vec![Reply::text("ok")]));
    let (base, _shutdown) = spawn_stub(app).await.unwrap();

    let guard = Arc::new(session_guard(&base).unwrap());
    guard.establish(token_set("stale", 3)).await;
    let mut chat = ChatService::new(backend_client(&base, Arc::clone(&guard)).unwrap(), None);

    assert_eq!(chat.send("first", "").await, ChatOutcome::Completed);
    assert_eq!(chat.send("second", "").await, ChatOutcome::Completed);

    let refreshes = recorder.to(&oidc("token"));
    assert_eq!(refreshes.len(), 1);
    assert!(refreshes[0].body.contains("grant_type=refresh_token"));
    assert!(refreshes[0].body.contains("refresh_token=refresh-1"));
    assert!(refreshes[0].body.contains("client_id=mcpfileclient"));

    let expected = format!("Bearer {fresh}");
    for sent in recorder.to("/llm/chat") {
        assert_eq!(sent.authorization.as_deref(), Some(expected.as_str()));
    }
    assert_eq!(guard.snapshot().await.display_name(), "alice");
}

#[tokio::test]
async fn rejected_refresh_ends_the_session_before_any_backend_call() {
    let recorder = Recorder::new();
    let app = Router::new()
        .route(
            &oidc("token"),
            stub_route(
                &recorder,
                vec![Reply::error(
                    StatusCode::BAD_REQUEST,
                    json!({"error": "invalid_grant", "error_description": "Session not active"}),
                )],
            ),
        )
        .route("/llm/chat", stub_route(&recorder, vec![Reply::text("ok")]));
    let (base, _shutdown) = spawn_stub(app).await.unwrap();

    let guard = Arc::new(session_guard(&base).unwrap());
    guard.establish(token_set("stale", 0)).await;
    let auth = AuthService::new(Arc::clone(&guard), Duration::from_secs(1));
    let mut chat = ChatService::new(backend_client(&base, guard).unwrap(), None);

    assert_eq!(chat.send("hello", "").await, ChatOutcome::Failed);
    assert_eq!(recorder.count("/llm/chat"), 0);
    assert_eq!(auth.state().await, SessionState::Unauthenticated);
    assert_eq!(
        auth.resolve(Route::Main).await,
        RouteDecision::Redirect(Route::Login)
    );
}

#[tokio::test]
async fn bootstrap_restores_persisted_session() {
    let (base, _shutdown) = spawn_stub(Router::new()).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path().join("session.json"));
    let access = fake_jwt(json!({"preferred_username": "bob", "email": "bob@home"}));
    store.save(&token_set(&access, 600)).unwrap();

    let guard = Arc::new(session_guard(&base).unwrap().with_store(store));
    let auth = AuthService::new(guard, Duration::from_secs(2));
    assert_eq!(
        auth.resolve(Route::Main).await,
        RouteDecision::Pending,
        "nothing renders before bootstrap"
    );

    assert_eq!(auth.bootstrap().await, BootstrapOutcome::Restored);
    assert_eq!(auth.session().await.display_name(), "bob");
    assert_eq!(auth.resolve(Route::Main).await, RouteDecision::Render(Route::Main));
    assert_eq!(
        auth.resolve(Route::Login).await,
        RouteDecision::Redirect(Route::Main)
    );
}

#[tokio::test]
async fn bootstrap_without_session_routes_to_login() {
    let (base, _shutdown) = spawn_stub(Router::new()).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let guard = Arc::new(
        session_guard(&base)
            .unwrap()
            .with_store(SessionStore::new(dir.path().join("missing.json"))),
    );
    let auth = AuthService::new(guard, Duration::from_secs(2));

    assert_eq!(auth.bootstrap().await, BootstrapOutcome::Unauthenticated);
    assert_eq!(
        auth.resolve(Route::Main).await,
        RouteDecision::Redirect(Route::Login)
    );
    assert_eq!(auth.resolve(Route::Login).await, RouteDecision::Render(Route::Login));
}

#[tokio::test]
async fn slow_identity_provider_times_out_bootstrap() {
    let recorder = Recorder::new();
    let slow = Reply::json(token_response("late", "refresh-2")).delayed(Duration::from_secs(5));
    let app = Router::new().route(&oidc("token"), stub_route(&recorder, vec![slow]));
    let (base, _shutdown) = spawn_stub(app).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path().join("session.json"));
    store.save(&token_set("stale", 1)).unwrap();
    let guard = Arc::new(session_guard(&base).unwrap().with_store(store.clone()));
    let auth = AuthService::new(guard, Duration::from_millis(300));

    assert_eq!(auth.bootstrap().await, BootstrapOutcome::TimedOut);
    assert_eq!(auth.state().await, SessionState::Unauthenticated);
    assert!(store.load().is_some(), "a later run may still restore it");
}

#[tokio::test]
async fn logout_clears_session_and_notifies_provider() {
    let recorder = Recorder::new();
    let app = Router::new().route(
        &oidc("logout"),
        stub_route(
            &recorder,
            vec![Reply::with_status(StatusCode::NO_CONTENT, "text/plain", String::new())],
        ),
    );
    let (base, _shutdown) = spawn_stub(app).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path().join("session.json"));
    let guard = Arc::new(session_guard(&base).unwrap().with_store(store.clone()));
    guard.establish(token_set("tok-1", 300)).await;
    let auth = AuthService::new(guard, Duration::from_secs(1));

    assert_eq!(auth.logout().await, Route::Login);
    assert_eq!(auth.state().await, SessionState::Unauthenticated);
    assert!(store.load().is_none());

    let calls = recorder.to(&oidc("logout"));
    assert_eq!(calls.len(), 1);
    assert!(calls[0].body.contains("refresh_token=refresh-1"));
}

#[tokio::test]
async fn logout_succeeds_locally_when_provider_is_down() {
    let (base, _shutdown) = spawn_stub(Router::new()).await.unwrap();
    let guard = Arc::new(session_guard(&base).unwrap());
    guard.establish(token_set("tok-1", 300)).await;
    let auth = AuthService::new(guard, Duration::from_secs(1));

    assert_eq!(auth.logout().await, Route::Login);
    assert_eq!(auth.state().await, SessionState::Unauthenticated);
}

#[tokio::test]
async fn device_login_polls_until_approved() {
    let access = fake_jwt(json!({"preferred_username": "carol"}));
    let recorder = Recorder::new();
    let app = Router::new()
        .route(
            &oidc("auth/device"),
            stub_route(
                &recorder,
                vec![Reply::json(json!({
                    "device_code": "dev-1",
                    "user_code": "ABCD-EFGH",
                    "verification_uri": "http://idp/device",
                    "verification_uri_complete": "http://idp/device?user_code=ABCD-EFGH",
                    "expires_in": 60,
                    "interval": 1
                }))],
            ),
        )
        .route(
            &oidc("token"),
            stub_route(
                &recorder,
                vec![
                    Reply::error(StatusCode::BAD_REQUEST, json!({"error": "authorization_pending"})),
                    Reply::json(token_response(&access, "refresh-9")),
                ],
            ),
        );
    let (base, _shutdown) = spawn_stub(app).await.unwrap();
    let auth = AuthService::new(Arc::new(session_guard(&base).unwrap()), Duration::from_secs(1));

    let device = auth.start_login().await.unwrap();
    assert_eq!(device.user_code, "ABCD-EFGH");
    let name = auth.complete_login(&device).await.unwrap();

    assert_eq!(name, "carol");
    assert_eq!(auth.state().await, SessionState::Authenticated);
    let polls = recorder.to(&oidc("token"));
    assert_eq!(polls.len(), 2);
    assert!(polls[0].body.contains("device_code=dev-1"));
}
