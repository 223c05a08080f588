use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

// --- Records (mapped to database rows) ---

/// User
///
/// Public representation of an account: identity plus the ids of everything it owns.
/// The password hash lives in [`Credentials`] and is never serialized.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[ts(type = "string")]
    pub date_joined: DateTime<Utc>,
    // Ids of owned posts, comments and categories (loaded via ARRAY subqueries).
    pub posts: Vec<i64>,
    pub comments: Vec<i64>,
    pub categories: Vec<i64>,
}

/// Credentials
///
/// Internal row used only by the login flow.
#[derive(Clone, FromRow)]
pub struct Credentials {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

/// Post
///
/// A blog entry. Lists are ordered by `(created, owner_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub body: String,
    #[ts(type = "string")]
    pub created: DateTime<Utc>,
    // Null for anonymously authored posts; such posts are read-only for everyone.
    pub owner_id: Option<i64>,
    // Owner's username, loaded via a LEFT JOIN.
    pub owner: Option<String>,
    // Comment ids in creation order.
    pub comments: Vec<i64>,
    pub categories: Vec<i64>,
}

/// Comment
///
/// A reader comment attached to exactly one post. `active` is a stored moderation
/// flag; nothing in this service filters on it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Comment {
    pub id: i64,
    #[serde(rename = "post")]
    pub post_id: i64,
    pub owner_id: Option<i64>,
    pub owner: Option<String>,
    pub body: String,
    #[ts(type = "string")]
    pub created: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated: DateTime<Utc>,
    pub active: bool,
}

/// Category
///
/// A named label owned by one user and linked to any number of posts.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub owner: String,
    pub posts: Vec<i64>,
}

// --- Request payloads ---

/// validate_username
///
/// Usernames accept letters, digits and `@ . + - _` only.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let valid = username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));
    if valid {
        Ok(())
    } else {
        let mut error = ValidationError::new("username_chars");
        error.message = Some("may contain only letters, digits and @/./+/-/_".into());
        Err(error)
    }
}

/// Required text must carry something besides whitespace.
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some("must not be blank".into());
        return Err(error);
    }
    Ok(())
}

/// RegisterUserRequest
///
/// Input for `/reg` (form) and `POST /users` (JSON). A successful registration
/// immediately opens a session for the new account.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct RegisterUserRequest {
    #[validate(
        length(min = 1, max = 150, message = "must be between 1 and 150 characters"),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: String,
}

/// LoginRequest
///
/// Credentials for `POST /auth/token`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// UpdateUserRequest
///
/// Partial update of the caller's own account. Absent fields are unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(
        length(min = 1, max = 150, message = "must be between 1 and 150 characters"),
        custom(function = "validate_username")
    )]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: Option<String>,
}

/// Storage-level account changes: the password is already hashed.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub password_hash: Option<String>,
}

/// SessionResponse
///
/// Returned by registration and token login: the account plus a bearer token for
/// API clients (browsers get the same token as the `sessionid` cookie).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionResponse {
    pub user: User,
    pub token: String,
}

/// CreatePostRequest
///
/// Input for creating a post. There is no owner field: the owner is always the
/// session identity.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreatePostRequest {
    #[validate(
        length(min = 1, max = 100, message = "must be between 1 and 100 characters"),
        custom(function = "not_blank")
    )]
    pub title: String,
    #[validate(length(min = 1, message = "must not be empty"), custom(function = "not_blank"))]
    pub body: String,
}

/// UpdatePostRequest
///
/// Partial update payload (`PUT`/`PATCH /posts/{id}/`, `/{id}/update`).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdatePostRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(
        length(min = 1, max = 100, message = "must be between 1 and 100 characters"),
        custom(function = "not_blank")
    )]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "must not be empty"), custom(function = "not_blank"))]
    pub body: Option<String>,
}

/// CreateCommentRequest
///
/// API input for a new comment. `post` must reference an existing post.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateCommentRequest {
    pub post: i64,
    #[validate(length(min = 1, message = "must not be empty"), custom(function = "not_blank"))]
    pub body: String,
}

/// UpdateCommentRequest
///
/// Only the body is editable; `active` is a moderation flag outside the owner's reach.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateCommentRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "must not be empty"), custom(function = "not_blank"))]
    pub body: Option<String>,
}

/// CreateCategoryRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateCategoryRequest {
    #[validate(
        length(min = 1, max = 100, message = "must be between 1 and 100 characters"),
        custom(function = "not_blank")
    )]
    pub name: String,
    #[serde(default)]
    pub posts: Vec<i64>,
}

/// UpdateCategoryRequest
///
/// `posts`, when present, replaces the full set of linked posts.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateCategoryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(
        length(min = 1, max = 100, message = "must be between 1 and 100 characters"),
        custom(function = "not_blank")
    )]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posts: Option<Vec<i64>>,
}

// --- Pagination ---

/// ListParams
///
/// Query parameters accepted by every collection endpoint.
#[derive(Debug, Clone, Copy, Deserialize, Validate, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// 1-based page number (default 1).
    #[validate(range(min = 1, message = "must be at least 1"))]
    pub page: Option<u32>,
    /// Items per page (default from configuration, at most 100).
    #[validate(range(min = 1, max = 100, message = "must be between 1 and 100"))]
    pub page_size: Option<u32>,
}

impl ListParams {
    /// Resolves defaults into a concrete `(page, page_size)` pair.
    pub fn resolve(&self, default_page_size: u32) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let page_size = self.page_size.unwrap_or(default_page_size).clamp(1, 100);
        (page, page_size)
    }
}

/// Page
///
/// A LIMIT/OFFSET window handed to the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            limit: i64::from(page_size),
            offset: i64::from(page.saturating_sub(1)) * i64::from(page_size),
        }
    }

    /// Every row.
    pub fn all() -> Self {
        Self {
            limit: i64::MAX,
            offset: 0,
        }
    }
}

/// Paginated
///
/// Envelope returned by list endpoints. `next`/`previous` are page numbers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Paginated<T> {
    pub count: i64,
    pub page: u32,
    pub page_size: u32,
    pub next: Option<u32>,
    pub previous: Option<u32>,
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn new(results: Vec<T>, count: i64, page: u32, page_size: u32) -> Self {
        let seen = i64::from(page) * i64::from(page_size);
        Self {
            count,
            page,
            page_size,
            next: (seen < count).then_some(page + 1),
            previous: (page > 1).then(|| page - 1),
            results,
        }
    }
}
