use crate::{AppState, handlers, policy::EntityKind};
use axum::{
    Router,
    routing::{MethodRouter, get, post},
};

/// Collection and item routers for one resource, mounted under the kind's
/// collection name. Every path is registered with and without the trailing slash,
/// and with the `.json` suffix; `ItemId` peels the suffix off the item id.
fn resource(
    router: Router<AppState>,
    kind: EntityKind,
    list: MethodRouter<AppState>,
    item: MethodRouter<AppState>,
) -> Router<AppState> {
    let base = format!("/{}", kind.collection());
    router
        .route(&base, list.clone())
        .route(&format!("{base}/"), list.clone())
        .route(&format!("{base}.json"), list)
        .route(&format!("{base}/{{id}}/"), item.clone())
        .route(&format!("{base}/{{id}}"), item)
}

/// API Router Module
///
/// Reads are public. Writes require a session (bearer token or `sessionid`
/// cookie) and, for existing records, ownership; both are checked inside the
/// handlers.
pub fn api_routes() -> Router<AppState> {
    let router = Router::new()
        // POST /auth/token
        // Exchanges username/password for a session token.
        .route("/auth/token", post(handlers::obtain_token));

    // /users: list + register; item: retrieve, self-only update/delete.
    let router = resource(
        router,
        EntityKind::User,
        get(handlers::list_users).post(handlers::register_user),
        get(handlers::get_user)
            .put(handlers::update_user)
            .patch(handlers::update_user)
            .delete(handlers::delete_user),
    );

    let router = resource(
        router,
        EntityKind::Post,
        get(handlers::list_posts).post(handlers::create_post),
        get(handlers::get_post)
            .put(handlers::update_post)
            .patch(handlers::update_post)
            .delete(handlers::delete_post),
    );

    let router = resource(
        router,
        EntityKind::Comment,
        get(handlers::list_comments).post(handlers::create_comment),
        get(handlers::get_comment)
            .put(handlers::update_comment)
            .patch(handlers::update_comment)
            .delete(handlers::delete_comment),
    );

    resource(
        router,
        EntityKind::Category,
        get(handlers::list_categories).post(handlers::create_category),
        get(handlers::get_category)
            .put(handlers::update_category)
            .patch(handlers::update_category)
            .delete(handlers::delete_category),
    )
}
