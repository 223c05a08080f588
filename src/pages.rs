//! Server-rendered HTML surface.
//!
//! Pages share the service layer with the JSON API; only the presentation differs.
//! Anonymous writes redirect to `/login`, other failures render `error.html`, and
//! form validation failures re-render the form they came from.

use askama::Template;
use axum::{
    extract::{FromRequest, FromRequestParts, Path, Request, State},
    http::{StatusCode, header, request::Parts},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::{Deserialize, de::DeserializeOwned};

use crate::{
    AppState,
    auth::{self, Session},
    error::AppError,
    models::{
        Comment, CreatePostRequest, ListParams, LoginRequest, Page, Post, RegisterUserRequest,
        UpdatePostRequest,
    },
    policy::{Access, authorize, is_owner},
    service,
};

/// PageError
///
/// `AppError` as seen by a browser.
#[derive(Debug)]
pub struct PageError(pub AppError);

impl From<AppError> for PageError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let err = self.0;
        if matches!(err, AppError::LoginRequired) {
            return Redirect::to("/login").into_response();
        }

        let status = err.status_code();
        let page = ErrorTemplate {
            viewer: None,
            status: status.as_u16(),
            message: err.public_message(),
        };
        match page.render() {
            Ok(html) => (status, Html(html)).into_response(),
            Err(e) => {
                tracing::error!("error page failed to render: {}", e);
                (status, page.message).into_response()
            }
        }
    }
}

type PageResult = Result<Response, PageError>;

/// Form
///
/// URL-encoded body. An unreadable body renders as a 400 error page.
pub struct Form<T>(pub T);

impl<T, S> FromRequest<S> for Form<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = PageError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Form(value) = axum::Form::<T>::from_request(req, state)
            .await
            .map_err(AppError::from)?;
        Ok(Form(value))
    }
}

/// Query
pub struct Query<T>(pub T);

impl<T, S> FromRequestParts<S> for Query<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = PageError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let axum::extract::Query(value) = axum::extract::Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(AppError::from)?;
        Ok(Query(value))
    }
}

fn render<T: Template>(status: StatusCode, page: &T) -> PageResult {
    let html = page.render().map_err(AppError::from)?;
    Ok((status, Html(html)).into_response())
}

fn parse_id(raw: &str) -> Result<i64, PageError> {
    raw.parse()
        .map_err(|_| PageError(AppError::NoRoute(format!("/{raw}/"))))
}

fn viewer(session: &Session) -> Option<String> {
    session.user().map(|u| u.username.clone())
}

/// Keeps post-login redirects on this site.
fn local_path(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path,
        _ => "/",
    }
}

fn with_session(cookie: String, to: &str) -> Response {
    ([(header::SET_COOKIE, cookie)], Redirect::to(to)).into_response()
}

// --- Templates ---

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorTemplate {
    viewer: Option<String>,
    status: u16,
    message: String,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    viewer: Option<String>,
    posts: Vec<Post>,
    count: i64,
    next: Option<u32>,
    previous: Option<u32>,
}

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    viewer: Option<String>,
    error: Option<String>,
    username: String,
    next: String,
}

#[derive(Template)]
#[template(path = "register.html")]
struct RegisterTemplate {
    viewer: Option<String>,
    error: Option<String>,
    username: String,
}

#[derive(Template)]
#[template(path = "changer.html")]
struct ChangerTemplate {
    viewer: Option<String>,
    error: Option<String>,
    title: String,
    body: String,
    rows: Vec<EditorRow>,
}

struct EditorRow {
    post: Post,
    selected: bool,
}

struct CommentView {
    comment: Comment,
    deletable: bool,
}

#[derive(Template)]
#[template(path = "post_detail.html")]
struct PostDetailTemplate {
    viewer: Option<String>,
    error: Option<String>,
    post: Post,
    editable: bool,
    comments: Vec<CommentView>,
}

#[derive(Template)]
#[template(path = "post_update.html")]
struct PostUpdateTemplate {
    viewer: Option<String>,
    error: Option<String>,
    post: Post,
}

#[derive(Template)]
#[template(path = "confirm.html")]
struct ConfirmTemplate {
    viewer: Option<String>,
    question: String,
    action: String,
    cancel: String,
}

// --- Forms ---

#[derive(Debug, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

// Missing fields arrive empty so the form re-renders with a message.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EditorQuery {
    pub id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PostForm {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommentForm {
    pub body: String,
}

// --- Listing ---

/// `GET /`
pub async fn index(
    session: Session,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> PageResult {
    let page = service::list_posts(state.repo.as_ref(), &params, state.config.page_size).await?;
    render(
        StatusCode::OK,
        &IndexTemplate {
            viewer: viewer(&session),
            posts: page.results,
            count: page.count,
            next: page.next,
            previous: page.previous,
        },
    )
}

// --- Session pages ---

pub async fn login_form(session: Session, Query(query): Query<NextQuery>) -> PageResult {
    render(
        StatusCode::OK,
        &LoginTemplate {
            viewer: viewer(&session),
            error: None,
            username: String::new(),
            next: local_path(query.next.as_deref()).to_string(),
        },
    )
}

/// `POST /login`
///
/// Bad credentials re-render the form with one generic message.
pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> PageResult {
    let next = local_path(form.next.as_deref()).to_string();
    let credentials = LoginRequest {
        username: form.username.clone(),
        password: form.password,
    };
    match auth::login(state.repo.as_ref(), &state.config, credentials).await {
        Ok((_, token)) => Ok(with_session(auth::session_cookie(&token, &state.config), &next)),
        Err(AppError::Authentication) => render(
            StatusCode::UNAUTHORIZED,
            &LoginTemplate {
                viewer: None,
                error: Some(AppError::Authentication.to_string()),
                username: form.username,
                next,
            },
        ),
        Err(e) => Err(e.into()),
    }
}

pub async fn register_form(session: Session) -> PageResult {
    render(
        StatusCode::OK,
        &RegisterTemplate {
            viewer: viewer(&session),
            error: None,
            username: String::new(),
        },
    )
}

/// `POST /reg`
///
/// Creates the account and logs it in straight away.
pub async fn register(State(state): State<AppState>, Form(form): Form<RegisterUserRequest>) -> PageResult {
    let username = form.username.clone();
    match auth::register(state.repo.as_ref(), &state.config, form).await {
        Ok((_, token)) => Ok(with_session(auth::session_cookie(&token, &state.config), "/")),
        Err(e @ (AppError::Validation(_) | AppError::Conflict(_))) => render(
            StatusCode::BAD_REQUEST,
            &RegisterTemplate {
                viewer: None,
                error: Some(e.to_string()),
                username,
            },
        ),
        Err(e) => Err(e.into()),
    }
}

/// `GET|POST /logout`
pub async fn logout(session: Session) -> Response {
    if let Some(user) = session.user() {
        tracing::info!(user_id = user.id, "logout");
    }
    with_session(auth::clear_session_cookie(), "/")
}

// --- Post editor ---

async fn editor(
    state: &AppState,
    session: &Session,
    status: StatusCode,
    error: Option<String>,
    form: PostForm,
    selected: Option<i64>,
) -> PageResult {
    let (mut posts, _) = state
        .repo
        .list_posts(Page::all())
        .await
        .map_err(AppError::from)?;
    posts.sort_by(|a, b| b.id.cmp(&a.id));
    let rows = posts
        .into_iter()
        .map(|post| EditorRow {
            selected: Some(post.id) == selected,
            post,
        })
        .collect();
    render(
        status,
        &ChangerTemplate {
            viewer: viewer(session),
            error,
            title: form.title,
            body: form.body,
            rows,
        },
    )
}

/// `GET /edit`
///
/// The create form plus every post, newest first. Login required.
pub async fn post_editor(
    session: Session,
    State(state): State<AppState>,
    Query(query): Query<EditorQuery>,
) -> PageResult {
    session.require()?;
    let blank = PostForm {
        title: String::new(),
        body: String::new(),
    };
    editor(&state, &session, StatusCode::OK, None, blank, query.id).await
}

/// `POST /edit`
pub async fn create_post(
    session: Session,
    State(state): State<AppState>,
    Form(form): Form<PostForm>,
) -> PageResult {
    let actor = session.require()?;
    let req = CreatePostRequest {
        title: form.title.clone(),
        body: form.body.clone(),
    };
    match service::create_post(state.repo.as_ref(), actor, req).await {
        Ok(post) => Ok(Redirect::to(&format!("/edit?id={}", post.id)).into_response()),
        Err(e @ AppError::Validation(_)) => {
            editor(&state, &session, StatusCode::BAD_REQUEST, Some(e.to_string()), form, None).await
        }
        Err(e) => Err(e.into()),
    }
}

// --- Post detail & comments ---

async fn detail(
    state: &AppState,
    session: &Session,
    post_id: i64,
    status: StatusCode,
    error: Option<String>,
) -> PageResult {
    let repo = state.repo.as_ref();
    let post = service::load_post(repo, post_id).await?;
    let comments = repo
        .comments_for_post(post_id)
        .await
        .map_err(AppError::from)?
        .into_iter()
        .map(|comment| CommentView {
            deletable: is_owner(&comment, session.user()),
            comment,
        })
        .collect();
    render(
        status,
        &PostDetailTemplate {
            viewer: viewer(session),
            error,
            editable: is_owner(&post, session.user()),
            post,
            comments,
        },
    )
}

/// `GET /{id}/`
pub async fn post_detail(session: Session, State(state): State<AppState>, Path(raw): Path<String>) -> PageResult {
    let id = parse_id(&raw)?;
    detail(&state, &session, id, StatusCode::OK, None).await
}

/// `POST /{id}/`
///
/// Adds a comment to the post; the post comes from the path, the owner from the session.
pub async fn add_comment(
    session: Session,
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Form(form): Form<CommentForm>,
) -> PageResult {
    let id = parse_id(&raw)?;
    let actor = session.require()?;
    match service::create_comment(state.repo.as_ref(), actor, id, form.body).await {
        Ok(_) => Ok(Redirect::to(&format!("/{id}/")).into_response()),
        Err(e @ AppError::Validation(_)) => {
            detail(&state, &session, id, StatusCode::BAD_REQUEST, Some(e.to_string())).await
        }
        Err(e) => Err(e.into()),
    }
}

/// `GET /{id}/comment`
pub async fn comment_delete_confirm(
    session: Session,
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> PageResult {
    let id = parse_id(&raw)?;
    let comment = service::load_comment(state.repo.as_ref(), id).await?;
    authorize(&comment, session.user(), Access::Write)?;
    render(
        StatusCode::OK,
        &ConfirmTemplate {
            viewer: viewer(&session),
            question: "Delete this comment?".to_string(),
            action: format!("/{id}/comment"),
            cancel: format!("/{}/", comment.post_id),
        },
    )
}

/// `POST /{id}/comment`
pub async fn delete_comment(session: Session, State(state): State<AppState>, Path(raw): Path<String>) -> PageResult {
    let id = parse_id(&raw)?;
    let actor = session.require()?;
    service::delete_comment(state.repo.as_ref(), actor, id).await?;
    Ok(Redirect::to("/").into_response())
}

// --- Post update & delete ---

/// `GET /{id}/update`
pub async fn post_update_form(
    session: Session,
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> PageResult {
    let id = parse_id(&raw)?;
    let actor = session.require()?;
    let post = service::load_post_for_write(state.repo.as_ref(), actor, id).await?;
    render(
        StatusCode::OK,
        &PostUpdateTemplate {
            viewer: viewer(&session),
            error: None,
            post,
        },
    )
}

/// `POST /{id}/update`
pub async fn update_post(
    session: Session,
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Form(form): Form<PostForm>,
) -> PageResult {
    let id = parse_id(&raw)?;
    let actor = session.require()?;
    let req = UpdatePostRequest {
        title: Some(form.title.clone()),
        body: Some(form.body.clone()),
    };
    match service::update_post(state.repo.as_ref(), actor, id, req).await {
        Ok(post) => Ok(Redirect::to(&format!("/edit?id={}", post.id)).into_response()),
        Err(e @ AppError::Validation(_)) => {
            // Show what was typed, not what is stored.
            let mut post = service::load_post(state.repo.as_ref(), id).await?;
            post.title = form.title;
            post.body = form.body;
            render(
                StatusCode::BAD_REQUEST,
                &PostUpdateTemplate {
                    viewer: viewer(&session),
                    error: Some(e.to_string()),
                    post,
                },
            )
        }
        Err(e) => Err(e.into()),
    }
}

/// `GET /{id}/delete`
pub async fn post_delete_confirm(
    session: Session,
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> PageResult {
    let id = parse_id(&raw)?;
    let actor = session.require()?;
    let post = service::load_post_for_write(state.repo.as_ref(), actor, id).await?;
    render(
        StatusCode::OK,
        &ConfirmTemplate {
            viewer: viewer(&session),
            question: format!("Delete \"{}\" and all of its comments?", post.title),
            action: format!("/{id}/delete"),
            cancel: format!("/{id}/"),
        },
    )
}

/// `POST /{id}/delete`
pub async fn delete_post(session: Session, State(state): State<AppState>, Path(raw): Path<String>) -> PageResult {
    let id = parse_id(&raw)?;
    let actor = session.require()?;
    service::delete_post(state.repo.as_ref(), actor, id).await?;
    Ok(Redirect::to("/edit").into_response())
}
