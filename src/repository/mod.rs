use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    error::RepoError,
    models::{
        Category, Comment, CreateCategoryRequest, CreatePostRequest, Credentials, Page, Post,
        UpdateCategoryRequest, UpdateCommentRequest, UpdatePostRequest, User, UserChanges,
    },
};

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository Trait
///
/// Abstract contract for all persistence operations. Handlers and services talk to
/// `Arc<dyn Repository>` and never know whether Postgres or the in-memory store is
/// behind it.
///
/// Ownership is *not* checked here: callers load the record, apply the permission
/// policy, then call the mutating method. Deletions perform their cascades
/// explicitly:
///
/// * `delete_post` removes the post's comments and category links.
/// * `delete_category` removes its post links, never the posts.
/// * `delete_comment` touches nothing else.
/// * `delete_user` removes everything the account owns.
///
/// List methods return the requested window plus the total row count.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    /// Fails with `RepoError::Conflict` when the username is taken.
    async fn create_user(&self, username: &str, password_hash: &str) -> RepoResult<User>;
    async fn get_user(&self, id: i64) -> RepoResult<Option<User>>;
    async fn get_credentials(&self, username: &str) -> RepoResult<Option<Credentials>>;
    async fn list_users(&self, page: Page) -> RepoResult<(Vec<User>, i64)>;
    async fn update_user(&self, id: i64, changes: UserChanges) -> RepoResult<Option<User>>;
    async fn delete_user(&self, id: i64) -> RepoResult<bool>;

    // --- Posts ---
    /// Ordered by creation time, then owner id (ownerless last), then id.
    async fn list_posts(&self, page: Page) -> RepoResult<(Vec<Post>, i64)>;
    async fn get_post(&self, id: i64) -> RepoResult<Option<Post>>;
    async fn create_post(&self, req: CreatePostRequest, owner_id: i64) -> RepoResult<Post>;
    async fn update_post(&self, id: i64, req: UpdatePostRequest) -> RepoResult<Option<Post>>;
    async fn delete_post(&self, id: i64) -> RepoResult<bool>;

    // --- Comments ---
    /// Ordered by creation time, then id.
    async fn list_comments(&self, page: Page) -> RepoResult<(Vec<Comment>, i64)>;
    async fn comments_for_post(&self, post_id: i64) -> RepoResult<Vec<Comment>>;
    async fn get_comment(&self, id: i64) -> RepoResult<Option<Comment>>;
    async fn create_comment(&self, post_id: i64, owner_id: i64, body: String) -> RepoResult<Comment>;
    async fn update_comment(&self, id: i64, req: UpdateCommentRequest) -> RepoResult<Option<Comment>>;
    async fn delete_comment(&self, id: i64) -> RepoResult<bool>;

    // --- Categories ---
    /// Ordered by id.
    async fn list_categories(&self, page: Page) -> RepoResult<(Vec<Category>, i64)>;
    async fn get_category(&self, id: i64) -> RepoResult<Option<Category>>;
    async fn create_category(&self, req: CreateCategoryRequest, owner_id: i64) -> RepoResult<Category>;
    async fn update_category(&self, id: i64, req: UpdateCategoryRequest) -> RepoResult<Option<Category>>;
    async fn delete_category(&self, id: i64) -> RepoResult<bool>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;
