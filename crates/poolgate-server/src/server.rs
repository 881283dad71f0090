use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use poolgate_auth::{CognitoClient, IdentityProvider, UserProvisioner};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::AppConfig,
    handlers,
    middleware::{self as app_middleware, RequestId},
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub provisioner: Arc<UserProvisioner>,
}

impl AppState {
    pub fn new(provisioner: UserProvisioner) -> Self {
        Self {
            provisioner: Arc::new(provisioner),
        }
    }

    /// Builds the state from configuration around the given provider.
    pub fn from_config(cfg: &AppConfig, provider: Arc<dyn IdentityProvider>) -> Self {
        Self::new(UserProvisioner::new(
            provider,
            cfg.cognito.pool_settings(),
            cfg.provisioning.to_provisioning_config(),
        ))
    }
}

pub struct PoolgateServer {
    addr: SocketAddr,
    app: Router,
}

/// Builds the router with a Cognito client created from `cfg`.
pub async fn build_app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let provider = cognito_provider(cfg).await?;
    Ok(build_router(cfg, AppState::from_config(cfg, provider)))
}

pub fn build_router(cfg: &AppConfig, state: AppState) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    Router::new()
        // Health endpoints
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        // OIDC placeholders
        .route("/authorize", get(handlers::authorize))
        .route("/token", get(handlers::token))
        // Provisioning
        .route("/user", post(handlers::create_user))
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .with_state(state)
        // Middleware stack (order: request id -> trace -> cors -> body limit)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(app_middleware::request_id))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|req: &axum::http::Request<_>| {
                            use tracing::field::Empty;
                            let req_id = req
                                .extensions()
                                .get::<RequestId>()
                                .map(|id| id.as_str().to_string())
                                .unwrap_or_default();
                            tracing::info_span!(
                                "http.request",
                                http.method = %req.method(),
                                http.target = %req.uri(),
                                http.status_code = Empty,
                                request_id = %req_id
                            )
                        })
                        .on_response(
                            |res: &axum::http::Response<_>,
                             latency: std::time::Duration,
                             span: &tracing::Span| {
                                span.record(
                                    "http.status_code",
                                    tracing::field::display(res.status().as_u16()),
                                );
                                tracing::info!(
                                    http.status = %res.status().as_u16(),
                                    elapsed_ms = %latency.as_millis(),
                                    "request handled"
                                );
                            },
                        ),
                )
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
}

async fn cognito_provider(cfg: &AppConfig) -> anyhow::Result<Arc<dyn IdentityProvider>> {
    let missing = cfg.cognito.missing_identifiers();
    if !missing.is_empty() {
        tracing::warn!(
            missing = ?missing,
            "Cognito identifiers are not configured; requests will carry empty values"
        );
    }

    let client_config = cfg
        .cognito
        .to_client_config()
        .await
        .map_err(anyhow::Error::msg)?;
    let client = CognitoClient::new(client_config).context("failed to create Cognito client")?;
    let credentials = client.credential_source();

    tracing::info!(
        endpoint = %client.endpoint(),
        region = %cfg.cognito.effective_region(),
        credentials = credentials.kind(),
        "Cognito client configured"
    );
    if !credentials.is_signed() {
        tracing::warn!("cognito.unsigned is set; Cognito requests will not be signed");
    }

    Ok(Arc::new(client))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    provider: Option<Arc<dyn IdentityProvider>>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            provider: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Uses `provider` instead of a Cognito client built from config.
    pub fn with_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub async fn build(self) -> anyhow::Result<PoolgateServer> {
        let provider = match self.provider {
            Some(provider) => provider,
            None => cognito_provider(&self.config).await?,
        };
        let app = build_router(&self.config, AppState::from_config(&self.config, provider));

        Ok(PoolgateServer {
            addr: self.addr,
            app,
        })
    }
}

impl PoolgateServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("failed to bind {}", self.addr))?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use poolgate_auth::CognitoClientConfig;
    use tower::ServiceExt;

    fn test_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.cognito.region = "eu-west-1".into();
        cfg.cognito.endpoint = Some("http://127.0.0.1:9".into());
        cfg.cognito.unsigned = true;
        cfg
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_stub_routes_respond_without_provider_calls() {
        let app = build_app(&test_config()).await.unwrap();

        for path in ["/authorize", "/token"] {
            let response = app
                .clone()
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            assert_eq!(&bytes[..], br#"{"message":"success"}"#);
        }
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = build_app(&test_config()).await.unwrap();
        let response = app
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({ "error-message": "No route for /nope" })
        );
    }

    #[tokio::test]
    async fn test_wrong_method_is_405() {
        let app = build_app(&test_config()).await.unwrap();
        let response = app
            .oneshot(Request::get("/user").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({ "error-message": "Method GET not allowed for /user" })
        );
    }

    #[tokio::test]
    async fn test_request_id_is_echoed() {
        let app = build_app(&test_config()).await.unwrap();
        let response = app
            .oneshot(
                Request::get("/healthz")
                    .header("x-request-id", "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "req-42");
    }

    #[tokio::test]
    async fn test_builder_uses_config_addr() {
        let mut cfg = test_config();
        cfg.server.host = "127.0.0.1".into();
        cfg.server.port = 9091;
        let server = ServerBuilder::new().with_config(cfg).build().await.unwrap();
        assert_eq!(server.addr(), "127.0.0.1:9091".parse().unwrap());
    }

    #[tokio::test]
    async fn test_builder_addr_and_provider_overrides() {
        let mut cfg = test_config();
        cfg.server.port = 9091;
        // Would resolve the default chain if the builder made its own client.
        cfg.cognito.unsigned = false;
        let provider = CognitoClient::new(
            CognitoClientConfig::new("eu-west-1")
                .with_endpoint("http://127.0.0.1:9".parse().unwrap()),
        )
        .unwrap();

        let server = ServerBuilder::new()
            .with_config(cfg)
            .with_addr("127.0.0.1:7070".parse().unwrap())
            .with_provider(Arc::new(provider))
            .build()
            .await
            .unwrap();
        assert_eq!(server.addr(), "127.0.0.1:7070".parse().unwrap());

        let response = server
            .app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
