//! kgagent-server: The REST API behind the knowledge-graph UI.
//!
//! Handlers stay thin: they validate input, call into the graph, ingest and
//! RAG crates, and shape JSON for the browser. Long-running document
//! processing is handed to the [`IngestWorker`] and observed through the
//! status endpoint.

pub mod api;
pub mod error;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use kgagent_core::config::ServerConfig;
use kgagent_core::AppConfig;
use kgagent_graph::GraphClient;
use kgagent_ingest::{DocumentPipeline, IngestWorker, StatusTracker};
use kgagent_llm::{EntityExtractor, LlmClient, LlmError};
use kgagent_rag::{GraphSearcher, RagService, SessionStore};

pub use error::{ApiError, ApiResult};

/// Headroom for multipart framing and form fields on top of the file itself.
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

/// Shared state handed to every handler. Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub graph: GraphClient,
    pub llm: LlmClient,
    pub extractor: EntityExtractor,
    pub tracker: StatusTracker,
    pub worker: IngestWorker,
    pub rag: RagService,
    pub sessions: SessionStore,
}

impl AppState {
    /// Wire the services together over an established graph connection.
    pub fn new(config: AppConfig, graph: GraphClient) -> Result<Self, LlmError> {
        let llm = LlmClient::new(&config.openai)?;
        let tracker = StatusTracker::new();
        let use_embeddings = config.openai.use_embeddings;

        let pipeline = DocumentPipeline::new(
            graph.clone(),
            llm.clone(),
            tracker.clone(),
            &config.ingest,
            use_embeddings,
        );
        let worker = IngestWorker::new(pipeline, config.ingest.max_concurrent_jobs);

        let embedder = use_embeddings.then(|| llm.clone());
        let rag = RagService::new(GraphSearcher::new(graph.clone(), embedder), llm.clone());

        Ok(Self {
            config: Arc::new(config),
            extractor: EntityExtractor::new(llm.clone()),
            graph,
            llm,
            tracker,
            worker,
            rag,
            sessions: SessionStore::new(),
        })
    }
}

/// Build the full application router.
pub fn build_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.upload.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(BODY_LIMIT_SLACK);
    let cors = cors_layer(&state.config.server);

    Router::new()
        .route("/", get(api::health::root))
        .route("/health", get(api::health::health))
        .nest("/api/graphs", api::graphs::router())
        .nest("/api/documents", api::documents::router())
        .nest("/api/chat", api::chat::router())
        .nest("/api/visualizations", api::visualizations::router())
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

/// CORS for the configured UI origins, with credentials allowed.
///
/// Credentials rule out wildcard headers and methods, so both are listed.
/// A `*` origin mirrors the caller's origin back.
pub fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let allow_origin = if config.cors_origins.iter().any(|o| o.trim() == "*") {
        AllowOrigin::mirror_request()
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    fn probe_app(config: &ServerConfig) -> Router {
        Router::new()
            .route("/probe", get(|| async { "ok" }))
            .layer(cors_layer(config))
    }

    fn preflight(origin: &str) -> Request<Body> {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/probe")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin_with_credentials() {
        let app = probe_app(&ServerConfig::default());
        let response = app.oneshot(preflight("http://localhost:3000")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:3000"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
    }

    #[tokio::test]
    async fn test_cors_ignores_unknown_origin() {
        let app = probe_app(&ServerConfig::default());
        let response = app.oneshot(preflight("http://evil.example")).await.unwrap();
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }

    #[tokio::test]
    async fn test_cors_wildcard_mirrors_origin() {
        let config = ServerConfig {
            cors_origins: vec!["*".to_string()],
            ..ServerConfig::default()
        };
        let app = probe_app(&config);
        let response = app.oneshot(preflight("http://ui.example")).await.unwrap();
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "http://ui.example"
        );
    }
}
