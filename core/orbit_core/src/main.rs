use axum::{
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use clap::Parser;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tower_http::cors::CorsLayer;
use tracing::info;

mod api;
mod briefing;
mod due;
mod facts;
mod llm;
mod store;
mod tasks;

use api::AppState;
use llm::GeminiClient;
use store::ProfileStore;

const DEFAULT_PORT: u16 = 17700;
// Template value shipped in sample config files.
const API_KEY_PLACEHOLDER: &str = "PASTE_YOUR";

#[derive(Parser, Debug)]
#[command(name = "orbit_core", version)]
struct Args {
    /// Listen address.
    ///
    /// Accepts:
    /// - ip:port (recommended), e.g. 127.0.0.1:17700
    /// - ip (implies port 17700), e.g. 127.0.0.1
    /// - localhost:port
    #[arg(long, default_value = "127.0.0.1:17700")]
    listen: String,

    /// Profile store (single JSON file shared by all users).
    #[arg(long, default_value = "./data/tasks.json")]
    data: PathBuf,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model used for briefings and facts.
    #[arg(long, default_value = llm::DEFAULT_MODEL)]
    model: String,

    /// Generative Language API base URL.
    #[arg(long, default_value = llm::DEFAULT_API_BASE)]
    api_base: String,

    /// Timeout for a single generation request (seconds).
    #[arg(long, default_value_t = 60)]
    llm_timeout_seconds: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "orbit_core=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    let api_key = resolve_api_key(args.api_key.as_deref())?;

    let llm = GeminiClient::new(
        &api_key,
        &args.model,
        &args.api_base,
        Duration::from_secs(args.llm_timeout_seconds.max(1)),
    )?;
    let state = AppState::new(ProfileStore::new(&args.data), Arc::new(llm), api::local_clock());

    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let app = router(state).layer(cors);

    let addr = parse_listen(&args.listen)?;
    info!("Orbit listening on http://{addr}");
    info!("Data: {}", args.data.display());
    info!("Model: {}", args.model);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/login", post(api::post_login).options(options_ok))
        .route("/users/:user/home", get(api::get_home))
        .route(
            "/users/:user/interests",
            post(api::post_interests).options(options_ok),
        )
        .route(
            "/users/:user/briefing/check",
            post(api::post_briefing_check).options(options_ok),
        )
        .route("/users/:user/fact", post(api::post_fact).options(options_ok))
        .route("/users/:user/tasks", get(api::get_all_tasks))
        .route(
            "/users/:user/tasks/:category",
            get(api::get_category_tasks)
                .post(api::post_add_task)
                .options(options_ok),
        )
        .route(
            "/users/:user/tasks/:category/:index",
            post(api::post_edit_task)
                .delete(api::delete_task)
                .options(options_ok),
        )
        .route(
            "/users/:user/tasks/:category/:index/toggle",
            post(api::post_toggle_task).options(options_ok),
        )
        .with_state(state)
}

/// The service refuses to start without a usable key.
fn resolve_api_key(raw: Option<&str>) -> anyhow::Result<String> {
    match raw.map(str::trim) {
        Some(key) if !key.is_empty() && !key.contains(API_KEY_PLACEHOLDER) => Ok(key.to_string()),
        Some(key) if key.contains(API_KEY_PLACEHOLDER) => Err(anyhow::anyhow!(
            "API key not configured: replace the placeholder in GEMINI_API_KEY / --api-key"
        )),
        _ => Err(anyhow::anyhow!(
            "API key missing! Set GEMINI_API_KEY or pass --api-key."
        )),
    }
}

/// `ip:port`, a bare `ip` (default port), or `localhost[:port]`.
fn parse_listen(input: &str) -> anyhow::Result<SocketAddr> {
    let spelled = match input.strip_prefix("localhost") {
        Some("") => format!("127.0.0.1:{DEFAULT_PORT}"),
        Some(port) if port.starts_with(':') => format!("127.0.0.1{port}"),
        _ => input.to_string(),
    };
    spelled
        .parse::<SocketAddr>()
        .or_else(|_| spelled.parse::<IpAddr>().map(|ip| SocketAddr::new(ip, DEFAULT_PORT)))
        .map_err(|_| {
            anyhow::anyhow!(
                "invalid --listen '{input}': expected ip:port, ip or localhost[:port] (e.g. 127.0.0.1:{DEFAULT_PORT})"
            )
        })
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}

async fn options_ok() -> impl IntoResponse {
    StatusCode::OK
}
