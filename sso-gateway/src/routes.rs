//! Route table

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, health, state::AppState};

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/auth", get(handlers::services))
        .route("/auth/bridge", post(handlers::bridge))
        .route("/auth/{provider}", get(handlers::auth))
        .route("/signin/{provider}", get(handlers::sign_in))
        .route("/signup", post(handlers::signup))
        .route("/whoami", get(handlers::whoami))
        .route("/logout", get(handlers::logout).post(handlers::logout))
        .route("/manage", post(handlers::manage))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{AccountStore, ExternalIdentity, MemoryAccountStore};
    use crate::auth::AuthServiceRegistry;
    use crate::config::Config;
    use crate::test_support::{json_body, set_cookies, FakeProvider, LOCALHOST};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    struct TestApp {
        store: Arc<MemoryAccountStore>,
        state: AppState,
    }

    impl TestApp {
        fn new(config: Config) -> Self {
            Self::with_provider(config, FakeProvider::new("discord"))
        }

        fn with_provider(config: Config, discord: FakeProvider) -> Self {
            let store = Arc::new(MemoryAccountStore::new());
            let mut registry = AuthServiceRegistry::new();
            registry.register("discord", Arc::new(discord));

            let state = AppState::builder()
                .config(config)
                .store(store.clone())
                .registry(registry)
                .build()
                .unwrap();
            Self { store, state }
        }

        fn app(&self) -> Router {
            router(self.state.clone())
        }

        fn discord_state(&self) -> String {
            self.state
                .registry()
                .lookup("discord")
                .unwrap()
                .generate_state()
        }
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.auth.host = "example.com".into();
        config
    }

    fn session_cookie(cookies: &[String]) -> String {
        cookies
            .iter()
            .find(|c| c.starts_with("sso-token=") && c.contains("Domain=example.com"))
            .and_then(|c| c.split(';').next())
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new(config());
        let response = app.app().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "sso-gateway");
    }

    #[tokio::test]
    async fn test_services_listing() {
        let app = TestApp::new(config());
        let response = app.app().oneshot(get("/auth")).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["services"][0]["id"], "discord");
        assert_eq!(body["services"][0]["registration_enabled"], true);
        assert_eq!(body["registration_enabled"], true);
    }

    #[tokio::test]
    async fn test_sign_in_redirect_and_json() {
        let app = TestApp::new(config());

        let response = app
            .app()
            .oneshot(get("/signin/discord?redirect"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://discord.example/authorize?state="));
        assert!(location.ends_with("%7Credirect"));
        let cookies = set_cookies(&response);
        assert!(cookies.iter().any(|c| c.starts_with("sso-auth-redirect=1")));

        let response = app.app().oneshot(get("/auth/discord")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert!(body["redirect_url"]
            .as_str()
            .unwrap()
            .ends_with("%7Cjson"));
    }

    #[tokio::test]
    async fn test_unknown_provider_is_bad_service() {
        let app = TestApp::new(config());
        let response = app.app().oneshot(get("/signin/myspace")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "bad_service");
    }

    #[tokio::test]
    async fn test_callback_with_marker_cookie_redirects() {
        let app = TestApp::with_provider(
            config(),
            FakeProvider::new("discord").with_identifier("fresh"),
        );
        let state = app.discord_state();

        let request = Request::builder()
            .uri(format!("/auth/discord?state={}&code=abc", state))
            .header(header::COOKIE, "sso-auth-redirect=1")
            .body(Body::empty())
            .unwrap();
        let response = app.app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("http://example.com/auth_done.html?token="));
        assert!(location.ends_with("&signup=true"));
        let cookies = set_cookies(&response);
        assert!(cookies.iter().any(|c| c.starts_with("sso-auth-redirect=;")));
    }

    #[tokio::test]
    async fn test_callback_bad_state_is_json() {
        let app = TestApp::new(config());
        let response = app
            .app()
            .oneshot(get("/auth/discord?state=forged&code=abc"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "bad_state");
    }

    #[tokio::test]
    async fn test_callback_repeated_params_still_clear_marker() {
        let app = TestApp::new(config());
        let request = Request::builder()
            .uri("/auth/discord?state=a&state=b&code=c")
            .header(header::COOKIE, "sso-auth-redirect=1")
            .body(Body::empty())
            .unwrap();
        let response = app.app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let cookies = set_cookies(&response);
        assert!(cookies.iter().any(|c| c.starts_with("sso-auth-redirect=;")));
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "bad_state");
    }

    #[tokio::test]
    async fn test_callback_uses_first_of_repeated_params() {
        let app = TestApp::with_provider(
            config(),
            FakeProvider::new("discord").with_identifier("fresh"),
        );
        let state = app.discord_state();

        let request = Request::builder()
            .uri(format!(
                "/auth/discord?state={}&code=abc&state=forged&code=other",
                state
            ))
            .header(header::COOKIE, "sso-auth-redirect=1")
            .body(Body::empty())
            .unwrap();
        let response = app.app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.ends_with("&signup=true"));
        let cookies = set_cookies(&response);
        assert!(cookies.iter().any(|c| c.starts_with("sso-auth-redirect=;")));
    }

    #[tokio::test]
    async fn test_signup_then_whoami_then_logout() {
        let app = TestApp::with_provider(
            config(),
            FakeProvider::new("discord").with_identifier("new-user"),
        );
        let state = app.discord_state();
        let response = app
            .app()
            .oneshot(get(&format!("/auth/discord?state={}&code=abc", state)))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["signup"], true);
        let signup_token = body["token"].as_str().unwrap().to_string();

        let request = Request::builder()
            .method("POST")
            .uri("/signup")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("username=ada&token={}", signup_token)))
            .unwrap();
        let response = app.app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = session_cookie(&set_cookies(&response));
        let body = json_body(response).await;
        assert_eq!(format!("sso-token={}", body["token"].as_str().unwrap()), cookie);

        let request = Request::builder()
            .uri("/whoami")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap();
        let body = json_body(app.app().oneshot(request).await.unwrap()).await;
        assert_eq!(body["username"], "ada");
        assert_eq!(body["id"], 1);

        let request = Request::builder()
            .method("POST")
            .uri("/logout")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap();
        let response = app.app().oneshot(request).await.unwrap();
        assert_eq!(set_cookies(&response).len(), 3);
        assert_eq!(json_body(response).await["success"], true);
        assert_eq!(app.store.session_count(), 0);

        let request = Request::builder()
            .uri("/whoami")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap();
        let body = json_body(app.app().oneshot(request).await.unwrap()).await;
        assert_eq!(body["username"], "unauthed");
        assert_eq!(body["id"], -1);
    }

    #[tokio::test]
    async fn test_signup_validation() {
        let app = TestApp::new(config());
        let post = |body: &str| {
            Request::builder()
                .method("POST")
                .uri("/signup")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body.to_string()))
                .unwrap()
        };

        let response = app.app().oneshot(post("username=ada")).await.unwrap();
        assert_eq!(json_body(response).await["code"], "bad_params");

        let response = app.app().oneshot(post("username=ada&token=")).await.unwrap();
        assert_eq!(json_body(response).await["code"], "bad_token");

        let response = app
            .app()
            .oneshot(post("username=a%20b&token=zzz"))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["code"], "bad_username");

        let response = app
            .app()
            .oneshot(post("username=ada&token=zzz"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Invalid signup token");

        app.state.resolver().set_registration_enabled(false);
        let response = app
            .app()
            .oneshot(post("username=ada&token=zzz"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], "registration_disabled");
    }

    fn bridge_request(body: &str, secret: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/auth/bridge")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(secret) = secret {
            builder = builder.header("x-bridge-token", secret);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    const BOB: &str = r#"{"twitchId":"123","twitchLogin":"Bob","displayName":"Bob","profileImageUrl":"https://img.example/bob.png"}"#;

    #[tokio::test]
    async fn test_bridge_issues_session() {
        let app = TestApp::new(config());

        let response = app.app().oneshot(bridge_request(BOB, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(set_cookies(&response).len(), 3);
        let first = json_body(response).await;
        assert_eq!(first["success"], true);
        assert_eq!(first["username"], "bob");

        let response = app.app().oneshot(bridge_request(BOB, None)).await.unwrap();
        let second = json_body(response).await;
        assert_eq!(second["userId"], first["userId"]);
        assert_ne!(second["token"], first["token"]);

        let user = app
            .store
            .get_by_login(&ExternalIdentity::new("twitch", "123"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first["userId"], user.id);
    }

    #[tokio::test]
    async fn test_bridge_rejects_bad_bodies() {
        let app = TestApp::new(config());

        let response = app
            .app()
            .oneshot(bridge_request(r#"{"twitchId":"1"}"#, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["message"],
            "Missing required fields: twitchId, twitchLogin, displayName, profileImageUrl"
        );

        let response = app
            .app()
            .oneshot(bridge_request("not json", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bridge_secret_and_switch() {
        let mut cfg = config();
        cfg.bridge.shared_secret = Some("s3cret".into());
        let app = TestApp::new(cfg);

        let response = app.app().oneshot(bridge_request(BOB, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let response = app
            .app()
            .oneshot(bridge_request(BOB, Some("wrong!")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let response = app
            .app()
            .oneshot(bridge_request(BOB, Some("s3cret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut cfg = config();
        cfg.bridge.enabled = false;
        let app = TestApp::new(cfg);
        let response = app.app().oneshot(bridge_request(BOB, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    fn manage_request(command: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/manage")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header("x-manage-token", token);
        }
        builder
            .body(Body::from(format!(r#"{{"command":"{}"}}"#, command)))
            .unwrap()
    }

    #[tokio::test]
    async fn test_manage_requires_configured_token() {
        let app = TestApp::new(config());
        let response = app
            .app()
            .oneshot(manage_request("ping", Some("anything")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let mut cfg = config();
        cfg.management.token = Some("ops".into());
        let app = TestApp::new(cfg);

        let response = app
            .app()
            .oneshot(manage_request("ping", Some("nope")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .app()
            .oneshot(manage_request("ping", Some("ops")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["command"], "ping");

        let response = app
            .app()
            .oneshot(manage_request("services", Some("ops")))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["services"][0]["id"], "discord");

        let response = app
            .app()
            .oneshot(manage_request("format-disk", Some("ops")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_known_identity_via_http_sets_cookie_pair() {
        let app = TestApp::with_provider(
            config(),
            FakeProvider::new("discord").with_identifier("known"),
        );
        app.store
            .create_user("hal", ExternalIdentity::new("discord", "known"), LOCALHOST)
            .await
            .unwrap();

        let state = app.discord_state();
        let response = app
            .app()
            .oneshot(get(&format!("/auth/discord?state={}&code=abc", state)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let cookies = set_cookies(&response);
        assert!(cookies.iter().any(|c| c.contains("Domain=.example.com")));
        assert!(cookies.iter().any(|c| c.ends_with("Domain=example.com")));
        assert!(cookies.iter().all(|c| !c.contains("Secure")));

        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["signup"], false);
    }
}
