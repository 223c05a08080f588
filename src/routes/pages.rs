use crate::{AppState, pages};
use axum::{Router, routing::get};

/// Pages Router Module
///
/// The browser-facing site. Forms post back to the path that rendered them.
pub fn page_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        .route("/", get(pages::index))
        .route("/login", get(pages::login_form).post(pages::login))
        .route("/reg", get(pages::register_form).post(pages::register))
        .route("/logout", get(pages::logout).post(pages::logout))
        // GET: create form + all posts; POST: create, then back to /edit?id=N
        .route("/edit", get(pages::post_editor).post(pages::create_post))
        // GET: post, comments and comment form; POST: add a comment
        .route("/{id}/", get(pages::post_detail).post(pages::add_comment))
        .route("/{id}/update", get(pages::post_update_form).post(pages::update_post))
        .route("/{id}/delete", get(pages::post_delete_confirm).post(pages::delete_post))
        // {id} is the comment id here.
        .route("/{id}/comment", get(pages::comment_delete_confirm).post(pages::delete_comment))
}
