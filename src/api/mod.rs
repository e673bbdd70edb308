//! HTTP control plane for the bots.
//!
//! Everything under `/api/v1` is gated by basic authentication when
//! credentials are configured; `/` and `/version` are always open.

pub mod auth;
pub mod error;
pub mod routes;

use crate::bot::BotRegistry;
use crate::config::Config;
use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use auth::Credentials;

/// Origins of the web UI dev servers.
const UI_ORIGINS: [&str; 2] = ["http://localhost:5173", "http://localhost:3000"];

pub struct ApiServer {
    addr: String,
    registry: Arc<BotRegistry>,
    credentials: Option<Credentials>,
}

impl ApiServer {
    pub fn new(config: &Config, registry: Arc<BotRegistry>) -> Self {
        Self {
            addr: config.bind_addr(),
            registry,
            credentials: config
                .credentials()
                .map(|(user, pass)| Credentials::new(user, pass)),
        }
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn start(self, shutdown: CancellationToken) -> Result<()> {
        let app = router(Arc::clone(&self.registry), self.credentials.clone());

        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .with_context(|| format!("Failed to bind control plane to {}", self.addr))?;

        info!("API server listening on http://{}", self.addr);
        if self.credentials.is_some() {
            info!("Basic authentication enabled for /api/v1");
        }
        info!("Endpoints:");
        info!("  GET  /                        - Service info");
        info!("  GET  /version                 - Version info");
        info!("  GET  /api/v1/bots             - List bots");
        info!("  GET  /api/v1/:id/html         - Page markup");
        info!("  GET  /api/v1/:id/screenshot   - Page screenshot");
        info!("  POST /api/v1/:id/start        - Start bot");
        info!("  POST /api/v1/:id/stop         - Stop bot");
        info!("  POST /api/v1/:id/restart      - Restart bot");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("API server stopped");
        Ok(())
    }
}

/// Build the full application router.
pub fn router(registry: Arc<BotRegistry>, credentials: Option<Credentials>) -> Router {
    let mut api = routes::bots::router(registry);
    if let Some(credentials) = credentials {
        api = api.layer(middleware::from_fn_with_state(
            Arc::new(credentials),
            auth::require_basic_auth,
        ));
    }

    Router::new()
        .route("/", get(status))
        .route("/version", get(version))
        .nest("/api/v1", api)
        // Applied inner-first: TraceLayer wraps the routes, CorsLayer is outermost.
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            UI_ORIGINS.into_iter().map(HeaderValue::from_static),
        ))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
        ])
        .expose_headers([header::CONTENT_LENGTH])
        .allow_credentials(true)
        .max_age(Duration::from_secs(12 * 60 * 60))
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "ssjitsi",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "ssjitsi"
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::{Bot, BotStatus, BotTimings};
    use crate::browser::testing::{FakeLauncher, FAKE_PNG};
    use crate::config::BotConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct Fixture {
        _dir: TempDir,
        launcher: FakeLauncher,
        registry: Arc<BotRegistry>,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("script.js");
        std::fs::write(&script, "1").unwrap();

        let launcher = FakeLauncher::new();
        let registry = Arc::new(BotRegistry::new());
        let mut config = BotConfig::new("demo", "https://meet.example.org/");
        config.data_dir = dir.path().join("data");
        registry
            .register(
                Bot::new("bot-1", config, Arc::new(launcher.clone()), script)
                    .with_timings(BotTimings::immediate()),
            )
            .await;

        Fixture {
            _dir: dir,
            launcher,
            registry,
        }
    }

    async fn wait_until_running(registry: &BotRegistry) {
        let bot = registry.lookup("bot-1").await.unwrap();
        for _ in 0..200 {
            if bot.status().await == BotStatus::Running {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("bot never started");
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_service_info() {
        let f = fixture().await;
        let app = router(f.registry, None);

        let response = app.oneshot(request("GET", "/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["service"], "ssjitsi");
    }

    #[tokio::test]
    async fn test_list_bots() {
        let f = fixture().await;
        let app = router(f.registry, None);

        let response = app.oneshot(request("GET", "/api/v1/bots")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let bots = body.as_array().unwrap();
        assert_eq!(bots.len(), 1);
        assert_eq!(bots[0]["id"], "bot-1");
        assert_eq!(bots[0]["room"], "demo");
        assert_eq!(bots[0]["status"], "stopped");
        assert_eq!(bots[0]["auth_method"], "none");
    }

    #[tokio::test]
    async fn test_unknown_bot_is_not_found() {
        let f = fixture().await;
        let app = router(f.registry, None);

        for (method, uri) in [
            ("GET", "/api/v1/unknown-id/screenshot"),
            ("GET", "/api/v1/unknown-id/html"),
            ("POST", "/api/v1/unknown-id/stop"),
            ("POST", "/api/v1/unknown-id/restart"),
        ] {
            let response = app.clone().oneshot(request(method, uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{} {}", method, uri);
            assert_eq!(json_body(response).await["error"], true);
        }
    }

    #[tokio::test]
    async fn test_screenshot_of_stopped_bot_is_unavailable() {
        let f = fixture().await;
        let app = router(f.registry, None);

        let response = app
            .oneshot(request("GET", "/api/v1/bot-1/screenshot"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["error"], true);
    }

    #[tokio::test]
    async fn test_screenshot_and_html_of_running_bot() {
        let f = fixture().await;
        let app = router(Arc::clone(&f.registry), None);

        let response = app
            .clone()
            .oneshot(request("POST", "/api/v1/bot-1/start"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        wait_until_running(&f.registry).await;

        let response = app
            .clone()
            .oneshot(request("GET", "/api/v1/bot-1/screenshot"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], FAKE_PNG);
        assert!(f.launcher.called("capture_screenshot true"));

        let response = app
            .oneshot(request("GET", "/api/v1/bot-1/html"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = json_body(response).await;
        assert!(html.as_str().unwrap().starts_with("<body"));
    }

    #[tokio::test]
    async fn test_start_twice_conflicts() {
        let f = fixture().await;
        let app = router(Arc::clone(&f.registry), None);

        let first = app
            .clone()
            .oneshot(request("POST", "/api/v1/bot-1/start"))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(request("POST", "/api/v1/bot-1/start"))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        assert_eq!(f.launcher.launches(), 1);
    }

    #[tokio::test]
    async fn test_stop_is_ok_when_already_stopped() {
        let f = fixture().await;
        let app = router(Arc::clone(&f.registry), None);

        let response = app
            .oneshot(request("POST", "/api/v1/bot-1/stop"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["success"], true);
    }

    #[tokio::test]
    async fn test_restart_returns_immediately_and_starts_bot() {
        let f = fixture().await;
        let app = router(Arc::clone(&f.registry), None);

        let response = app
            .oneshot(request("POST", "/api/v1/bot-1/restart"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        wait_until_running(&f.registry).await;
        assert_eq!(f.launcher.launches(), 1);
    }

    #[tokio::test]
    async fn test_basic_auth_gate() {
        let f = fixture().await;
        let app = router(f.registry, Some(Credentials::new("admin", "secret")));

        let response = app
            .clone()
            .oneshot(request("GET", "/api/v1/bots"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("Basic"));

        let authorized = Request::builder()
            .uri("/api/v1/bots")
            .header(
                header::AUTHORIZATION,
                format!("Basic {}", STANDARD.encode("admin:secret")),
            )
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(authorized).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(request("GET", "/version")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cors_preflight_for_ui_origin() {
        let f = fixture().await;
        let app = router(f.registry, Some(Credentials::new("admin", "secret")));

        let preflight = |origin: &'static str| {
            Request::builder()
                .method("OPTIONS")
                .uri("/api/v1/bots")
                .header(header::ORIGIN, origin)
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap()
        };

        let response = app
            .clone()
            .oneshot(preflight("http://localhost:5173"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:5173"
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
            "true"
        );

        let response = app.oneshot(preflight("http://evil.example")).await.unwrap();
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }
}
