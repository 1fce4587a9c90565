use axum::{
    extract::{DefaultBodyLimit, FromRef},
    response::{IntoResponse, Json, Response},
    routing::{any, get, post},
    Router,
};
use axum_extra::extract::cookie::Key;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::modules::session::SessionStore;
use crate::proxy::common::path_remap::PathRemap;
use crate::proxy::config::ProxyConfig;
use crate::proxy::upstream::client::UpstreamClient;
use crate::proxy::views::Views;

/// Axum application state. Everything but the session store is read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<UpstreamClient>,
    pub remap: Arc<PathRemap>,
    pub sessions: Arc<SessionStore>,
    pub views: Arc<Views>,
    pub cookie_key: Key,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

impl AppState {
    pub fn from_config(config: &ProxyConfig) -> Result<Self, String> {
        let session_ttl_hours = config.session_ttl()?;
        let upstream = UpstreamClient::new(
            &config.upstream_origin,
            &config.bypass_header,
            Some(config.upstream_proxy.clone()),
        )?;
        let cookie_key = Key::try_from(config.session_key_bytes()?.as_slice())
            .map_err(|e| format!("Invalid session key: {}", e))?;

        Ok(Self {
            upstream: Arc::new(upstream),
            remap: Arc::new(PathRemap::new(
                &config.reserved_prefix,
                config.path_overrides.clone(),
            )),
            sessions: Arc::new(SessionStore::new(session_ttl_hours)),
            views: Arc::new(Views::new()?),
            cookie_key,
        })
    }
}

/// Build the full application router
pub fn build_router(state: AppState) -> Router {
    use crate::proxy::handlers;

    let static_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("web/assets");
    let prefix = state.remap.prefix().to_string();

    Router::new()
        .route("/", get(handlers::auth::index))
        .route("/login", get(handlers::auth::login_page).post(handlers::auth::login_submit))
        .route("/logout", get(handlers::auth::logout).post(handlers::auth::logout))
        .route(
            "/forgot-password",
            get(handlers::auth::forgot_password_page).post(handlers::auth::forgot_password_request),
        )
        .route("/forgot-password/verify", post(handlers::auth::forgot_password_verify))
        .route("/forgot-password/reset", post(handlers::auth::forgot_password_reset))
        .route("/theme", post(handlers::theme::set_theme))
        // Admin area
        .route("/admin", get(handlers::admin::dashboard))
        .route("/admin/rooms", get(handlers::admin::rooms))
        .route("/admin/rooms/:id", get(handlers::admin::room_detail))
        .route("/admin/classes", get(handlers::admin::classes))
        .route("/admin/classes/:id", get(handlers::admin::class_detail))
        .route("/admin/departments", get(handlers::admin::departments))
        .route("/admin/instructors", get(handlers::admin::instructors))
        .route("/admin/instructors/:id", get(handlers::admin::instructor_detail))
        .route(
            "/admin/settings",
            get(handlers::auth::settings_page).post(handlers::auth::settings_submit),
        )
        // Instructor area
        .route("/instructor", get(handlers::instructor::dashboard))
        .route(
            "/instructor/settings",
            get(handlers::auth::settings_page).post(handlers::auth::settings_submit),
        )
        // Reverse proxy
        .route(&prefix, any(handlers::passthrough::handle_proxy))
        .route(&format!("{}/*path", prefix), any(handlers::passthrough::handle_proxy))
        .route("/healthz", get(health_check_handler))
        .nest_service("/assets", ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::proxy::middleware::route_guard_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Axum server instance
pub struct AxumServer {
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl AxumServer {
    /// Start Axum server
    pub async fn start(
        host: String,
        port: u16,
        state: AppState,
    ) -> Result<(Self, tokio::task::JoinHandle<()>), String> {
        let app = build_router(state);

        let addr = format!("{}:{}", host, port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| format!("Failed to bind address {}: {}", addr, e))?;

        tracing::info!("Portal server started at http://{}", addr);

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let server_instance = Self {
            shutdown_tx: Some(shutdown_tx),
        };

        let handle = tokio::spawn(async move {
            use hyper::server::conn::http1;
            use hyper_util::rt::TokioIo;
            use hyper_util::service::TowerToHyperService;

            loop {
                tokio::select! {
                    res = listener.accept() => {
                        match res {
                            Ok((stream, _)) => {
                                let io = TokioIo::new(stream);
                                let service = TowerToHyperService::new(app.clone());

                                tokio::task::spawn(async move {
                                    if let Err(err) = http1::Builder::new()
                                        .serve_connection(io, service)
                                        .await
                                    {
                                        debug!("Connection handling ended or error: {:?}", err);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept connection: {:?}", e);
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::info!("Portal server stopped listening");
                        break;
                    }
                }
            }
        });

        Ok((server_instance, handle))
    }

    /// Stop the server
    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Health check handler
async fn health_check_handler() -> Response {
    Json(serde_json::json!({
        "status": "ok"
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_check() {
        let state = AppState::from_config(&ProxyConfig::default()).unwrap();
        let app = build_router(state);

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_page_without_session_redirects_to_login() {
        let state = AppState::from_config(&ProxyConfig::default()).unwrap();
        let app = build_router(state);

        let response = app
            .oneshot(Request::builder().uri("/admin/rooms").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/login");
    }

    #[test]
    fn test_out_of_range_session_ttl_fails_startup() {
        for hours in [-1, 0, i64::MAX] {
            let config = ProxyConfig {
                session_ttl_hours: hours,
                ..ProxyConfig::default()
            };
            let err = AppState::from_config(&config).err().unwrap();
            assert!(err.contains("session_ttl_hours"));
        }
    }

    #[test]
    fn test_bad_upstream_origin_fails_startup() {
        let config = ProxyConfig {
            upstream_origin: "::not-a-url".to_string(),
            ..ProxyConfig::default()
        };
        assert!(AppState::from_config(&config).is_err());
    }
}
