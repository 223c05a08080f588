use crate::{
    AppState,
    auth::{self, AuthUser},
    error::{AppError, AppResult, ErrorResponse},
    extract::{Json, Query},
    models::{
        Category, Comment, CreateCategoryRequest, CreateCommentRequest, CreatePostRequest,
        ListParams, LoginRequest, Paginated, Post, RegisterUserRequest, SessionResponse,
        UpdateCategoryRequest, UpdateCommentRequest, UpdatePostRequest, UpdateUserRequest, User,
    },
    service,
};
use axum::{
    extract::{FromRequestParts, Path, State},
    http::{StatusCode, Uri, header, request::Parts},
    response::IntoResponse,
};
use validator::Validate;

// --- Path Extraction ---

/// ItemId
///
/// Record id taken from an item path. Accepts the bare id (`/posts/7/`) and the
/// `.json` format suffix (`/posts/7.json`); any other suffix is a missing route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemId(pub i64);

impl ItemId {
    pub fn parse(raw: &str) -> AppResult<Self> {
        let digits = raw.strip_suffix(".json").unwrap_or(raw);
        digits
            .parse()
            .map(ItemId)
            .map_err(|_| AppError::NoRoute(raw.to_string()))
    }
}

impl<S> FromRequestParts<S> for ItemId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::NoRoute(e.body_text()))?;
        ItemId::parse(&raw)
    }
}

/// fallback
///
/// JSON 404 for anything the router does not know.
pub async fn fallback(uri: Uri) -> AppError {
    AppError::NoRoute(uri.path().to_string())
}

// --- Users & Sessions ---

/// list_users
///
/// [Public Route] Paginated list of accounts, ordered by id.
#[utoipa::path(
    get,
    path = "/users",
    params(ListParams),
    responses((status = 200, description = "Users", body = Paginated<User>))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Paginated<User>>> {
    let page = service::list_users(state.repo.as_ref(), &params, state.config.page_size).await?;
    Ok(Json(page))
}

/// register_user
///
/// [Public Route] Creates an account and logs it in at once: the response carries
/// a bearer token and sets the `sessionid` cookie.
#[utoipa::path(
    post,
    path = "/users",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "Registered and logged in", body = SessionResponse),
        (status = 400, description = "Invalid username or password", body = ErrorResponse),
        (status = 409, description = "Username taken", body = ErrorResponse)
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterUserRequest>,
) -> AppResult<impl IntoResponse> {
    let (user, token) = auth::register(state.repo.as_ref(), &state.config, payload).await?;
    let cookie = auth::session_cookie(&token, &state.config);
    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(SessionResponse { user, token }),
    ))
}

/// obtain_token
///
/// [Public Route] Exchanges credentials for a session token.
#[utoipa::path(
    post,
    path = "/auth/token",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = SessionResponse),
        (status = 401, description = "Bad credentials", body = ErrorResponse)
    )
)]
pub async fn obtain_token(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let (user, token) = auth::login(state.repo.as_ref(), &state.config, payload).await?;
    let cookie = auth::session_cookie(&token, &state.config);
    Ok(([(header::SET_COOKIE, cookie)], Json(SessionResponse { user, token })))
}

/// get_user
#[utoipa::path(
    get,
    path = "/users/{id}/",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "Found", body = User),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn get_user(State(state): State<AppState>, ItemId(id): ItemId) -> AppResult<Json<User>> {
    Ok(Json(service::load_user(state.repo.as_ref(), id).await?))
}

/// update_user
///
/// [Authenticated Route] Changes the caller's own username and/or password.
#[utoipa::path(
    put,
    path = "/users/{id}/",
    params(("id" = i64, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = User),
        (status = 403, description = "Not this account", body = ErrorResponse)
    )
)]
pub async fn update_user(
    actor: AuthUser,
    State(state): State<AppState>,
    ItemId(id): ItemId,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<User>> {
    Ok(Json(service::update_user(state.repo.as_ref(), &actor, id, payload).await?))
}

/// delete_user
///
/// [Authenticated Route] Deletes the caller's own account and everything it owns.
#[utoipa::path(
    delete,
    path = "/users/{id}/",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not this account", body = ErrorResponse)
    )
)]
pub async fn delete_user(
    actor: AuthUser,
    State(state): State<AppState>,
    ItemId(id): ItemId,
) -> AppResult<StatusCode> {
    service::delete_user(state.repo.as_ref(), &actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Posts ---

/// list_posts
///
/// [Public Route] Posts ordered by creation time, then owner.
#[utoipa::path(
    get,
    path = "/posts/",
    params(ListParams),
    responses((status = 200, description = "Posts", body = Paginated<Post>))
)]
pub async fn list_posts(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Paginated<Post>>> {
    let page = service::list_posts(state.repo.as_ref(), &params, state.config.page_size).await?;
    Ok(Json(page))
}

/// create_post
///
/// [Authenticated Route] The owner is stamped from the session, never from the body.
#[utoipa::path(
    post,
    path = "/posts/",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Created", body = Post),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Not logged in", body = ErrorResponse)
    )
)]
pub async fn create_post(
    actor: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<Post>)> {
    let post = service::create_post(state.repo.as_ref(), &actor, payload).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// get_post
#[utoipa::path(
    get,
    path = "/posts/{id}/",
    params(("id" = i64, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Found", body = Post),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn get_post(State(state): State<AppState>, ItemId(id): ItemId) -> AppResult<Json<Post>> {
    Ok(Json(service::load_post(state.repo.as_ref(), id).await?))
}

/// update_post
///
/// [Authenticated Route] Owner-only partial update (`PUT` and `PATCH`).
#[utoipa::path(
    put,
    path = "/posts/{id}/",
    params(("id" = i64, Path, description = "Post ID")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Updated", body = Post),
        (status = 403, description = "Not Owner", body = ErrorResponse),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn update_post(
    actor: AuthUser,
    State(state): State<AppState>,
    ItemId(id): ItemId,
    Json(payload): Json<UpdatePostRequest>,
) -> AppResult<Json<Post>> {
    Ok(Json(service::update_post(state.repo.as_ref(), &actor, id, payload).await?))
}

/// delete_post
///
/// [Authenticated Route] Owner-only. Comments and category links are removed too.
#[utoipa::path(
    delete,
    path = "/posts/{id}/",
    params(("id" = i64, Path, description = "Post ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not Owner", body = ErrorResponse),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn delete_post(
    actor: AuthUser,
    State(state): State<AppState>,
    ItemId(id): ItemId,
) -> AppResult<StatusCode> {
    service::delete_post(state.repo.as_ref(), &actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Comments ---

/// list_comments
///
/// [Public Route] All comments, oldest first. The `active` flag does not filter.
#[utoipa::path(
    get,
    path = "/comments/",
    params(ListParams),
    responses((status = 200, description = "Comments", body = Paginated<Comment>))
)]
pub async fn list_comments(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Paginated<Comment>>> {
    let page = service::list_comments(state.repo.as_ref(), &params, state.config.page_size).await?;
    Ok(Json(page))
}

/// create_comment
///
/// [Authenticated Route] `post` must name an existing post; an unknown id is a
/// validation failure of the payload rather than a missing route.
#[utoipa::path(
    post,
    path = "/comments/",
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Created", body = Comment),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Not logged in", body = ErrorResponse)
    )
)]
pub async fn create_comment(
    actor: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    payload.validate()?;
    let repo = state.repo.as_ref();
    service::ensure_posts_exist(repo, "post", &[payload.post]).await?;
    let comment = service::create_comment(repo, &actor, payload.post, payload.body).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// get_comment
#[utoipa::path(
    get,
    path = "/comments/{id}/",
    params(("id" = i64, Path, description = "Comment ID")),
    responses(
        (status = 200, description = "Found", body = Comment),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn get_comment(State(state): State<AppState>, ItemId(id): ItemId) -> AppResult<Json<Comment>> {
    Ok(Json(service::load_comment(state.repo.as_ref(), id).await?))
}

/// update_comment
#[utoipa::path(
    put,
    path = "/comments/{id}/",
    params(("id" = i64, Path, description = "Comment ID")),
    request_body = UpdateCommentRequest,
    responses(
        (status = 200, description = "Updated", body = Comment),
        (status = 403, description = "Not Owner", body = ErrorResponse),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn update_comment(
    actor: AuthUser,
    State(state): State<AppState>,
    ItemId(id): ItemId,
    Json(payload): Json<UpdateCommentRequest>,
) -> AppResult<Json<Comment>> {
    Ok(Json(service::update_comment(state.repo.as_ref(), &actor, id, payload).await?))
}

/// delete_comment
///
/// [Authenticated Route] Only the comment's author may delete it.
#[utoipa::path(
    delete,
    path = "/comments/{id}/",
    params(("id" = i64, Path, description = "Comment ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not Owner", body = ErrorResponse),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn delete_comment(
    actor: AuthUser,
    State(state): State<AppState>,
    ItemId(id): ItemId,
) -> AppResult<StatusCode> {
    service::delete_comment(state.repo.as_ref(), &actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Categories ---

/// list_categories
#[utoipa::path(
    get,
    path = "/categories/",
    params(ListParams),
    responses((status = 200, description = "Categories", body = Paginated<Category>))
)]
pub async fn list_categories(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Paginated<Category>>> {
    let page = service::list_categories(state.repo.as_ref(), &params, state.config.page_size).await?;
    Ok(Json(page))
}

/// create_category
///
/// [Authenticated Route] Every id in `posts` must exist.
#[utoipa::path(
    post,
    path = "/categories/",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Created", body = Category),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Not logged in", body = ErrorResponse)
    )
)]
pub async fn create_category(
    actor: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateCategoryRequest>,
) -> AppResult<(StatusCode, Json<Category>)> {
    let category = service::create_category(state.repo.as_ref(), &actor, payload).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// get_category
#[utoipa::path(
    get,
    path = "/categories/{id}/",
    params(("id" = i64, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Found", body = Category),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn get_category(State(state): State<AppState>, ItemId(id): ItemId) -> AppResult<Json<Category>> {
    Ok(Json(service::load_category(state.repo.as_ref(), id).await?))
}

/// update_category
///
/// [Authenticated Route] Owner-only. A `posts` array replaces the linked set.
#[utoipa::path(
    put,
    path = "/categories/{id}/",
    params(("id" = i64, Path, description = "Category ID")),
    request_body = UpdateCategoryRequest,
    responses(
        (status = 200, description = "Updated", body = Category),
        (status = 403, description = "Not Owner", body = ErrorResponse),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn update_category(
    actor: AuthUser,
    State(state): State<AppState>,
    ItemId(id): ItemId,
    Json(payload): Json<UpdateCategoryRequest>,
) -> AppResult<Json<Category>> {
    Ok(Json(service::update_category(state.repo.as_ref(), &actor, id, payload).await?))
}

/// delete_category
///
/// [Authenticated Route] Owner-only. Linked posts are detached, not deleted.
#[utoipa::path(
    delete,
    path = "/categories/{id}/",
    params(("id" = i64, Path, description = "Category ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not Owner", body = ErrorResponse),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn delete_category(
    actor: AuthUser,
    State(state): State<AppState>,
    ItemId(id): ItemId,
) -> AppResult<StatusCode> {
    service::delete_category(state.repo.as_ref(), &actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
