use axum::{Router, extract::FromRef, http::HeaderName};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod pages;
pub mod policy;
pub mod repository;
pub mod service;

// Module for routing segregation (JSON API, HTML pages).
pub mod routes;
use routes::{api, pages as site};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document for the JSON surface, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_users, handlers::register_user, handlers::obtain_token,
        handlers::get_user, handlers::update_user, handlers::delete_user,
        handlers::list_posts, handlers::create_post, handlers::get_post,
        handlers::update_post, handlers::delete_post,
        handlers::list_comments, handlers::create_comment, handlers::get_comment,
        handlers::update_comment, handlers::delete_comment,
        handlers::list_categories, handlers::create_category, handlers::get_category,
        handlers::update_category, handlers::delete_category,
    ),
    components(
        schemas(
            models::User, models::Post, models::Comment, models::Category,
            models::RegisterUserRequest, models::LoginRequest, models::UpdateUserRequest,
            models::SessionResponse, models::CreatePostRequest, models::UpdatePostRequest,
            models::CreateCommentRequest, models::UpdateCommentRequest,
            models::CreateCategoryRequest, models::UpdateCategoryRequest,
            error::ErrorResponse,
        )
    ),
    tags(
        (name = "blog", description = "Blog posts, comments and categories")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    /// Storage: Postgres in production, in-memory locally and in tests.
    pub repo: RepositoryState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Lets extractors (`Session`, `AuthUser`) pull just the parts they need.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles both surfaces, the API docs and the observability layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api::api_routes())
        .merge(site::page_routes())
        .fallback(handlers::fallback)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                // Request ID Generation: a fresh UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // Request Tracing: one span per request, tagged with the request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // Request ID Propagation: echo x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span so every log line of a request carries its ID.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
