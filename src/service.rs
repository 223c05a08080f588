//! Operations shared by the JSON API and the HTML pages.
//!
//! Every mutation follows the same shape: load the record (`NotFound` if absent),
//! apply the permission policy, validate the input, then write. Nothing is changed
//! before the permission check has passed.

use validator::Validate;

use crate::{
    auth::{self, AuthUser},
    error::{AppError, AppResult},
    models::{
        Category, Comment, CreateCategoryRequest, CreatePostRequest, ListParams, Page, Paginated,
        Post, UpdateCategoryRequest, UpdateCommentRequest, UpdatePostRequest, UpdateUserRequest,
        User, UserChanges, not_blank,
    },
    policy::{Access, EntityKind, authorize},
    repository::Repository,
};

/// Validates the list parameters and turns them into a repository window.
fn window(params: &ListParams, default_page_size: u32) -> AppResult<(u32, u32, Page)> {
    params.validate()?;
    let (page, page_size) = params.resolve(default_page_size);
    Ok((page, page_size, Page::new(page, page_size)))
}

// --- Users ---

pub async fn list_users(
    repo: &dyn Repository,
    params: &ListParams,
    default_page_size: u32,
) -> AppResult<Paginated<User>> {
    let (page, page_size, window) = window(params, default_page_size)?;
    let (users, count) = repo.list_users(window).await?;
    Ok(Paginated::new(users, count, page, page_size))
}

pub async fn load_user(repo: &dyn Repository, id: i64) -> AppResult<User> {
    repo.get_user(id)
        .await?
        .ok_or(AppError::not_found(EntityKind::User, id))
}

/// Changes the caller's own username and/or password.
pub async fn update_user(
    repo: &dyn Repository,
    actor: &AuthUser,
    id: i64,
    req: UpdateUserRequest,
) -> AppResult<User> {
    let user = load_user(repo, id).await?;
    authorize(&user, Some(actor), Access::Write)?;
    req.validate()?;

    let password_hash = req.password.as_deref().map(auth::hash_password).transpose()?;
    let changes = UserChanges {
        username: req.username,
        password_hash,
    };
    let user = repo
        .update_user(id, changes)
        .await?
        .ok_or(AppError::not_found(EntityKind::User, id))?;
    tracing::info!(user_id = id, "account updated");
    Ok(user)
}

/// Deletes the caller's own account together with everything it owns.
pub async fn delete_user(repo: &dyn Repository, actor: &AuthUser, id: i64) -> AppResult<()> {
    let user = load_user(repo, id).await?;
    authorize(&user, Some(actor), Access::Write)?;
    if !repo.delete_user(id).await? {
        return Err(AppError::not_found(EntityKind::User, id));
    }
    tracing::info!(user_id = id, "account deleted");
    Ok(())
}

// --- Posts ---

pub async fn list_posts(
    repo: &dyn Repository,
    params: &ListParams,
    default_page_size: u32,
) -> AppResult<Paginated<Post>> {
    let (page, page_size, window) = window(params, default_page_size)?;
    let (posts, count) = repo.list_posts(window).await?;
    Ok(Paginated::new(posts, count, page, page_size))
}

pub async fn load_post(repo: &dyn Repository, id: i64) -> AppResult<Post> {
    repo.get_post(id)
        .await?
        .ok_or(AppError::not_found(EntityKind::Post, id))
}

/// Loads a post and checks that `actor` may change it.
pub async fn load_post_for_write(repo: &dyn Repository, actor: &AuthUser, id: i64) -> AppResult<Post> {
    let post = load_post(repo, id).await?;
    authorize(&post, Some(actor), Access::Write)?;
    Ok(post)
}

/// The owner is always `actor`; request bodies cannot name one.
pub async fn create_post(repo: &dyn Repository, actor: &AuthUser, req: CreatePostRequest) -> AppResult<Post> {
    req.validate()?;
    let post = repo.create_post(req, actor.id).await?;
    tracing::info!(post_id = post.id, owner_id = actor.id, "post created");
    Ok(post)
}

pub async fn update_post(
    repo: &dyn Repository,
    actor: &AuthUser,
    id: i64,
    req: UpdatePostRequest,
) -> AppResult<Post> {
    load_post_for_write(repo, actor, id).await?;
    req.validate()?;
    let post = repo
        .update_post(id, req)
        .await?
        .ok_or(AppError::not_found(EntityKind::Post, id))?;
    tracing::info!(post_id = id, "post updated");
    Ok(post)
}

/// Deletes a post; its comments and category links go with it.
pub async fn delete_post(repo: &dyn Repository, actor: &AuthUser, id: i64) -> AppResult<()> {
    load_post_for_write(repo, actor, id).await?;
    if !repo.delete_post(id).await? {
        return Err(AppError::not_found(EntityKind::Post, id));
    }
    tracing::info!(post_id = id, "post deleted");
    Ok(())
}

// --- Comments ---

pub async fn list_comments(
    repo: &dyn Repository,
    params: &ListParams,
    default_page_size: u32,
) -> AppResult<Paginated<Comment>> {
    let (page, page_size, window) = window(params, default_page_size)?;
    let (comments, count) = repo.list_comments(window).await?;
    Ok(Paginated::new(comments, count, page, page_size))
}

pub async fn load_comment(repo: &dyn Repository, id: i64) -> AppResult<Comment> {
    repo.get_comment(id)
        .await?
        .ok_or(AppError::not_found(EntityKind::Comment, id))
}

pub async fn load_comment_for_write(repo: &dyn Repository, actor: &AuthUser, id: i64) -> AppResult<Comment> {
    let comment = load_comment(repo, id).await?;
    authorize(&comment, Some(actor), Access::Write)?;
    Ok(comment)
}

/// create_comment
///
/// The parent post is resolved here, from the id the caller routed on; an unknown
/// post is `NotFound`. Owner comes from the session.
pub async fn create_comment(
    repo: &dyn Repository,
    actor: &AuthUser,
    post_id: i64,
    body: String,
) -> AppResult<Comment> {
    let post = load_post(repo, post_id).await?;
    if not_blank(&body).is_err() {
        return Err(AppError::Validation("body: must not be blank".to_string()));
    }
    let comment = repo.create_comment(post.id, actor.id, body).await?;
    tracing::info!(comment_id = comment.id, post_id = post.id, owner_id = actor.id, "comment created");
    Ok(comment)
}

pub async fn update_comment(
    repo: &dyn Repository,
    actor: &AuthUser,
    id: i64,
    req: UpdateCommentRequest,
) -> AppResult<Comment> {
    load_comment_for_write(repo, actor, id).await?;
    req.validate()?;
    let comment = repo
        .update_comment(id, req)
        .await?
        .ok_or(AppError::not_found(EntityKind::Comment, id))?;
    tracing::info!(comment_id = id, "comment updated");
    Ok(comment)
}

/// delete_comment
///
/// Same owner rule as every other mutation: only the comment's author may delete
/// it. Removes nothing but the comment.
pub async fn delete_comment(repo: &dyn Repository, actor: &AuthUser, id: i64) -> AppResult<()> {
    load_comment_for_write(repo, actor, id).await?;
    if !repo.delete_comment(id).await? {
        return Err(AppError::not_found(EntityKind::Comment, id));
    }
    tracing::info!(comment_id = id, "comment deleted");
    Ok(())
}

// --- Categories ---

pub async fn list_categories(
    repo: &dyn Repository,
    params: &ListParams,
    default_page_size: u32,
) -> AppResult<Paginated<Category>> {
    let (page, page_size, window) = window(params, default_page_size)?;
    let (categories, count) = repo.list_categories(window).await?;
    Ok(Paginated::new(categories, count, page, page_size))
}

pub async fn load_category(repo: &dyn Repository, id: i64) -> AppResult<Category> {
    repo.get_category(id)
        .await?
        .ok_or(AppError::not_found(EntityKind::Category, id))
}

/// Rejects references to posts that do not exist.
pub async fn ensure_posts_exist(repo: &dyn Repository, field: &str, ids: &[i64]) -> AppResult<()> {
    for id in ids {
        if repo.get_post(*id).await?.is_none() {
            return Err(AppError::Validation(format!(
                "{field}: invalid pk \"{id}\" - object does not exist"
            )));
        }
    }
    Ok(())
}

pub async fn create_category(
    repo: &dyn Repository,
    actor: &AuthUser,
    req: CreateCategoryRequest,
) -> AppResult<Category> {
    req.validate()?;
    ensure_posts_exist(repo, "posts", &req.posts).await?;
    let category = repo.create_category(req, actor.id).await?;
    tracing::info!(category_id = category.id, owner_id = actor.id, "category created");
    Ok(category)
}

pub async fn update_category(
    repo: &dyn Repository,
    actor: &AuthUser,
    id: i64,
    req: UpdateCategoryRequest,
) -> AppResult<Category> {
    let category = load_category(repo, id).await?;
    authorize(&category, Some(actor), Access::Write)?;
    req.validate()?;
    if let Some(posts) = &req.posts {
        ensure_posts_exist(repo, "posts", posts).await?;
    }
    let category = repo
        .update_category(id, req)
        .await?
        .ok_or(AppError::not_found(EntityKind::Category, id))?;
    tracing::info!(category_id = id, "category updated");
    Ok(category)
}

/// Deletes a category; linked posts are detached, not deleted.
pub async fn delete_category(repo: &dyn Repository, actor: &AuthUser, id: i64) -> AppResult<()> {
    let category = load_category(repo, id).await?;
    authorize(&category, Some(actor), Access::Write)?;
    if !repo.delete_category(id).await? {
        return Err(AppError::not_found(EntityKind::Category, id));
    }
    tracing::info!(category_id = id, "category deleted");
    Ok(())
}
