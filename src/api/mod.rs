use crate::api::handlers::{
    auth, health,
    posts::{FsMediaStore, MediaState, WebpCoverTransformer},
    root,
};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension,
    body::Body,
    extract::{DefaultBodyLimit, MatchedPath},
    http::{HeaderName, HeaderValue, Method, Request, header::CONTENT_TYPE},
    middleware,
    routing::{get, options},
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::mpsc};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::{SetRequestHeaderLayer, SetResponseHeaderLayer},
    trace::TraceLayer,
};
use tracing::{Span, error, info, info_span};
use ulid::Ulid;
use url::Url;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

// Crate-visible so the CLI layer can reference configs and handlers.
pub(crate) mod email;
pub(crate) mod handlers;
// Route registration is centralized in openapi.rs next to the document.
mod openapi;

pub use openapi::openapi;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

// Request bodies are JSON or raw cover image bytes; uploads top out at
// 5 MiB, so the cap leaves the size rejection to the handler.
const MAX_BODY_BYTES: usize = 6 * 1024 * 1024;

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: String,
    auth_config: auth::AuthConfig,
    email_config: email::EmailWorkerConfig,
    media_root: String,
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    // ctrl-c feeds the shutdown channel; axum drains in-flight requests.
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = tx.send(());
            }
            Err(err) => error!("Failed to listen for shutdown signal: {err}"),
        }
    });

    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let http = reqwest::Client::builder()
        .user_agent(crate::APP_USER_AGENT)
        .build()
        .context("Failed to build HTTP client")?;

    let rate_limiter = Arc::new(auth::PgRateLimiter::new(
        pool.clone(),
        auth_config.rate_limit_window_seconds(),
    ));
    let email_sender = Arc::new(email::LogEmailSender);
    let auth_state = Arc::new(auth::AuthState::new(
        auth_config,
        rate_limiter,
        email_sender.clone(),
        http,
    ));

    // Background worker polls email_outbox (DB-backed queue) for pending rows,
    // delivers/logs them, and retries failures with exponential backoff.
    email::spawn_outbox_worker(pool.clone(), email_sender, email_config);
    // Expired reset tokens, sessions, rate windows, and idle remembered
    // devices are reaped on a fixed cadence.
    auth::spawn_sweeper(pool.clone(), auth_state.config());

    let media_state = Arc::new(MediaState::new(
        Arc::new(FsMediaStore::new(media_root)),
        Arc::new(WebpCoverTransformer::default()),
    ));

    let frontend_origin = frontend_origin(auth_state.config().frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, HeaderName::from_static("x-csrf-token")])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    // Build the router from OpenAPI-wired routes, then extend it with non-doc routes like `/` and
    // preflight-only `OPTIONS /health`. The document itself stays in openapi.rs for the `openapi` binary.
    let (router, openapi) = router().split_for_parts();
    let app = router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
        .route("/", get(root::root))
        .route("/health", options(health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(SetResponseHeaderLayer::if_not_present(
                    HeaderName::from_static("x-app"),
                    HeaderValue::from_static(concat!(
                        env!("CARGO_PKG_NAME"),
                        "-",
                        env!("CARGO_PKG_VERSION")
                    )),
                ))
                .layer(cors)
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
                .layer(Extension(pool.clone()))
                .layer(Extension(auth_state.clone()))
                .layer(Extension(media_state))
                // Runs after the extensions above so it can re-mint sessions
                // from the remember cookie before guards look for one.
                .layer(middleware::from_fn(auth::silent_reauth)),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            rx.recv().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::frontend_origin;

    #[test]
    fn frontend_origin_strips_paths_and_keeps_ports() {
        let origin = frontend_origin("https://verki.dev/app/login").unwrap();
        assert_eq!(origin, "https://verki.dev");

        let origin = frontend_origin("http://localhost:5173").unwrap();
        assert_eq!(origin, "http://localhost:5173");
    }

    #[test]
    fn frontend_origin_rejects_garbage() {
        assert!(frontend_origin("not a url").is_err());
        assert!(frontend_origin("mailto:team@verki.dev").is_err());
    }
}
