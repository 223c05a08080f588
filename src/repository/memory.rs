use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

use super::{RepoResult, Repository};
use crate::{
    error::RepoError,
    models::{
        Category, Comment, CreateCategoryRequest, CreatePostRequest, Credentials, Page, Post,
        UpdateCategoryRequest, UpdateCommentRequest, UpdatePostRequest, User, UserChanges,
    },
};

struct UserRow {
    username: String,
    password_hash: String,
    date_joined: DateTime<Utc>,
}

struct PostRow {
    title: String,
    body: String,
    created: DateTime<Utc>,
    owner_id: Option<i64>,
}

struct CommentRow {
    post_id: i64,
    owner_id: Option<i64>,
    body: String,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
    active: bool,
}

struct CategoryRow {
    name: String,
    owner_id: i64,
}

#[derive(Default)]
struct Store {
    users: BTreeMap<i64, UserRow>,
    posts: BTreeMap<i64, PostRow>,
    comments: BTreeMap<i64, CommentRow>,
    categories: BTreeMap<i64, CategoryRow>,
    // (category_id, post_id)
    links: BTreeSet<(i64, i64)>,
    last_id: i64,
}

/// MemoryRepository
///
/// `Repository` backed by ordered maps behind a single `RwLock`. Same ordering and
/// cascade rules as `PostgresRepository`; every write holds the lock for its whole
/// duration, which gives the all-or-nothing behavior a transaction would.
///
/// Used when running locally without `DATABASE_URL`, and by the test suite.
#[derive(Default)]
pub struct MemoryRepository {
    store: RwLock<Store>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a post without an owner, as legacy or imported rows may be.
    pub async fn insert_ownerless_post(&self, title: &str, body: &str) -> Post {
        let mut store = self.store.write().await;
        let id = store.next_id();
        store.posts.insert(
            id,
            PostRow {
                title: title.to_string(),
                body: body.to_string(),
                created: Utc::now(),
                owner_id: None,
            },
        );
        store.post(id)
    }
}

fn window<T>(rows: Vec<T>, page: Page) -> Vec<T> {
    let offset = usize::try_from(page.offset).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);
    rows.into_iter().skip(offset).take(limit).collect()
}

impl Store {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn username(&self, id: Option<i64>) -> Option<String> {
        id.and_then(|id| self.users.get(&id)).map(|u| u.username.clone())
    }

    fn user(&self, id: i64) -> User {
        let row = &self.users[&id];
        User {
            id,
            username: row.username.clone(),
            date_joined: row.date_joined,
            posts: self
                .posts
                .iter()
                .filter(|(_, p)| p.owner_id == Some(id))
                .map(|(pid, _)| *pid)
                .collect(),
            comments: self
                .comments
                .iter()
                .filter(|(_, c)| c.owner_id == Some(id))
                .map(|(cid, _)| *cid)
                .collect(),
            categories: self
                .categories
                .iter()
                .filter(|(_, k)| k.owner_id == id)
                .map(|(kid, _)| *kid)
                .collect(),
        }
    }

    fn post(&self, id: i64) -> Post {
        let row = &self.posts[&id];
        Post {
            id,
            title: row.title.clone(),
            body: row.body.clone(),
            created: row.created,
            owner_id: row.owner_id,
            owner: self.username(row.owner_id),
            comments: self
                .comments_of(id)
                .into_iter()
                .map(|c| c.id)
                .collect(),
            categories: self
                .links
                .iter()
                .filter(|(_, post_id)| *post_id == id)
                .map(|(category_id, _)| *category_id)
                .collect(),
        }
    }

    fn comment(&self, id: i64) -> Comment {
        let row = &self.comments[&id];
        Comment {
            id,
            post_id: row.post_id,
            owner_id: row.owner_id,
            owner: self.username(row.owner_id),
            body: row.body.clone(),
            created: row.created,
            updated: row.updated,
            active: row.active,
        }
    }

    fn category(&self, id: i64) -> Category {
        let row = &self.categories[&id];
        Category {
            id,
            name: row.name.clone(),
            owner_id: row.owner_id,
            owner: self.username(Some(row.owner_id)).unwrap_or_default(),
            posts: self
                .links
                .range((id, i64::MIN)..=(id, i64::MAX))
                .map(|(_, post_id)| *post_id)
                .collect(),
        }
    }

    fn comments_of(&self, post_id: i64) -> Vec<Comment> {
        let mut comments: Vec<Comment> = self
            .comments
            .iter()
            .filter(|(_, c)| c.post_id == post_id)
            .map(|(id, _)| self.comment(*id))
            .collect();
        comments.sort_by_key(|c| (c.created, c.id));
        comments
    }

    fn username_taken(&self, username: &str, except: Option<i64>) -> bool {
        self.users
            .iter()
            .any(|(id, u)| u.username == username && Some(*id) != except)
    }

    fn set_links(&mut self, category_id: i64, posts: &[i64]) {
        self.links.retain(|(k, _)| *k != category_id);
        for post_id in posts {
            if self.posts.contains_key(post_id) {
                self.links.insert((category_id, *post_id));
            }
        }
    }

    fn remove_post(&mut self, id: i64) -> bool {
        self.links.retain(|(_, post_id)| *post_id != id);
        self.comments.retain(|_, c| c.post_id != id);
        self.posts.remove(&id).is_some()
    }

    fn remove_category(&mut self, id: i64) -> bool {
        self.links.retain(|(category_id, _)| *category_id != id);
        self.categories.remove(&id).is_some()
    }
}

fn conflict() -> RepoError {
    RepoError::Conflict("a user with that username already exists".to_string())
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_user(&self, username: &str, password_hash: &str) -> RepoResult<User> {
        let mut store = self.store.write().await;
        if store.username_taken(username, None) {
            return Err(conflict());
        }
        let id = store.next_id();
        store.users.insert(
            id,
            UserRow {
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                date_joined: Utc::now(),
            },
        );
        Ok(store.user(id))
    }

    async fn get_user(&self, id: i64) -> RepoResult<Option<User>> {
        let store = self.store.read().await;
        Ok(store.users.contains_key(&id).then(|| store.user(id)))
    }

    async fn get_credentials(&self, username: &str) -> RepoResult<Option<Credentials>> {
        let store = self.store.read().await;
        Ok(store
            .users
            .iter()
            .find(|(_, u)| u.username == username)
            .map(|(id, u)| Credentials {
                id: *id,
                username: u.username.clone(),
                password_hash: u.password_hash.clone(),
            }))
    }

    async fn list_users(&self, page: Page) -> RepoResult<(Vec<User>, i64)> {
        let store = self.store.read().await;
        let users: Vec<User> = store.users.keys().map(|id| store.user(*id)).collect();
        let count = users.len() as i64;
        Ok((window(users, page), count))
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> RepoResult<Option<User>> {
        let mut store = self.store.write().await;
        if !store.users.contains_key(&id) {
            return Ok(None);
        }
        if let Some(username) = &changes.username {
            if store.username_taken(username, Some(id)) {
                return Err(conflict());
            }
        }
        if let Some(row) = store.users.get_mut(&id) {
            if let Some(username) = changes.username {
                row.username = username;
            }
            if let Some(hash) = changes.password_hash {
                row.password_hash = hash;
            }
        }
        Ok(Some(store.user(id)))
    }

    async fn delete_user(&self, id: i64) -> RepoResult<bool> {
        let mut store = self.store.write().await;
        if !store.users.contains_key(&id) {
            return Ok(false);
        }
        store.comments.retain(|_, c| c.owner_id != Some(id));
        let owned_posts: Vec<i64> = store
            .posts
            .iter()
            .filter(|(_, p)| p.owner_id == Some(id))
            .map(|(pid, _)| *pid)
            .collect();
        for post_id in owned_posts {
            store.remove_post(post_id);
        }
        let owned_categories: Vec<i64> = store
            .categories
            .iter()
            .filter(|(_, k)| k.owner_id == id)
            .map(|(kid, _)| *kid)
            .collect();
        for category_id in owned_categories {
            store.remove_category(category_id);
        }
        Ok(store.users.remove(&id).is_some())
    }

    async fn list_posts(&self, page: Page) -> RepoResult<(Vec<Post>, i64)> {
        let store = self.store.read().await;
        let mut posts: Vec<Post> = store.posts.keys().map(|id| store.post(*id)).collect();
        // Ownerless posts sort after owned ones, like NULLS LAST.
        posts.sort_by_key(|p| (p.created, p.owner_id.is_none(), p.owner_id, p.id));
        let count = posts.len() as i64;
        Ok((window(posts, page), count))
    }

    async fn get_post(&self, id: i64) -> RepoResult<Option<Post>> {
        let store = self.store.read().await;
        Ok(store.posts.contains_key(&id).then(|| store.post(id)))
    }

    async fn create_post(&self, req: CreatePostRequest, owner_id: i64) -> RepoResult<Post> {
        let mut store = self.store.write().await;
        let id = store.next_id();
        store.posts.insert(
            id,
            PostRow {
                title: req.title,
                body: req.body,
                created: Utc::now(),
                owner_id: Some(owner_id),
            },
        );
        Ok(store.post(id))
    }

    async fn update_post(&self, id: i64, req: UpdatePostRequest) -> RepoResult<Option<Post>> {
        let mut store = self.store.write().await;
        let Some(row) = store.posts.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(title) = req.title {
            row.title = title;
        }
        if let Some(body) = req.body {
            row.body = body;
        }
        Ok(Some(store.post(id)))
    }

    async fn delete_post(&self, id: i64) -> RepoResult<bool> {
        Ok(self.store.write().await.remove_post(id))
    }

    async fn list_comments(&self, page: Page) -> RepoResult<(Vec<Comment>, i64)> {
        let store = self.store.read().await;
        let mut comments: Vec<Comment> = store.comments.keys().map(|id| store.comment(*id)).collect();
        comments.sort_by_key(|c| (c.created, c.id));
        let count = comments.len() as i64;
        Ok((window(comments, page), count))
    }

    async fn comments_for_post(&self, post_id: i64) -> RepoResult<Vec<Comment>> {
        Ok(self.store.read().await.comments_of(post_id))
    }

    async fn get_comment(&self, id: i64) -> RepoResult<Option<Comment>> {
        let store = self.store.read().await;
        Ok(store.comments.contains_key(&id).then(|| store.comment(id)))
    }

    async fn create_comment(&self, post_id: i64, owner_id: i64, body: String) -> RepoResult<Comment> {
        let mut store = self.store.write().await;
        let id = store.next_id();
        let now = Utc::now();
        store.comments.insert(
            id,
            CommentRow {
                post_id,
                owner_id: Some(owner_id),
                body,
                created: now,
                updated: now,
                active: true,
            },
        );
        Ok(store.comment(id))
    }

    async fn update_comment(&self, id: i64, req: UpdateCommentRequest) -> RepoResult<Option<Comment>> {
        let mut store = self.store.write().await;
        let Some(row) = store.comments.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(body) = req.body {
            row.body = body;
        }
        row.updated = Utc::now();
        Ok(Some(store.comment(id)))
    }

    async fn delete_comment(&self, id: i64) -> RepoResult<bool> {
        Ok(self.store.write().await.comments.remove(&id).is_some())
    }

    async fn list_categories(&self, page: Page) -> RepoResult<(Vec<Category>, i64)> {
        let store = self.store.read().await;
        let categories: Vec<Category> = store.categories.keys().map(|id| store.category(*id)).collect();
        let count = categories.len() as i64;
        Ok((window(categories, page), count))
    }

    async fn get_category(&self, id: i64) -> RepoResult<Option<Category>> {
        let store = self.store.read().await;
        Ok(store.categories.contains_key(&id).then(|| store.category(id)))
    }

    async fn create_category(&self, req: CreateCategoryRequest, owner_id: i64) -> RepoResult<Category> {
        let mut store = self.store.write().await;
        let id = store.next_id();
        store.categories.insert(
            id,
            CategoryRow {
                name: req.name,
                owner_id,
            },
        );
        store.set_links(id, &req.posts);
        Ok(store.category(id))
    }

    async fn update_category(&self, id: i64, req: UpdateCategoryRequest) -> RepoResult<Option<Category>> {
        let mut store = self.store.write().await;
        let Some(row) = store.categories.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = req.name {
            row.name = name;
        }
        if let Some(posts) = req.posts {
            store.set_links(id, &posts);
        }
        Ok(Some(store.category(id)))
    }

    async fn delete_category(&self, id: i64) -> RepoResult<bool> {
        Ok(self.store.write().await.remove_category(id))
    }
}
