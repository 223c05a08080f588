use async_trait::async_trait;
use sqlx::PgPool;

use super::{RepoResult, Repository};
use crate::{
    error::RepoError,
    models::{
        Category, Comment, CreateCategoryRequest, CreatePostRequest, Credentials, Page, Post,
        UpdateCategoryRequest, UpdateCommentRequest, UpdatePostRequest, User, UserChanges,
    },
};

// Relation ids are folded into each row with ARRAY subqueries so that one query
// yields a complete record.

const USER_SELECT: &str = r#"
    SELECT u.id, u.username, u.date_joined,
           ARRAY(SELECT p.id FROM posts p WHERE p.owner_id = u.id ORDER BY p.id) AS posts,
           ARRAY(SELECT c.id FROM comments c WHERE c.owner_id = u.id ORDER BY c.id) AS comments,
           ARRAY(SELECT k.id FROM categories k WHERE k.owner_id = u.id ORDER BY k.id) AS categories
    FROM users u
"#;

const POST_SELECT: &str = r#"
    SELECT p.id, p.title, p.body, p.created, p.owner_id, u.username AS owner,
           ARRAY(SELECT c.id FROM comments c WHERE c.post_id = p.id ORDER BY c.created, c.id) AS comments,
           ARRAY(SELECT cp.category_id FROM category_posts cp WHERE cp.post_id = p.id ORDER BY cp.category_id) AS categories
    FROM posts p
    LEFT JOIN users u ON u.id = p.owner_id
"#;

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.post_id, c.owner_id, u.username AS owner, c.body, c.created, c.updated, c.active
    FROM comments c
    LEFT JOIN users u ON u.id = c.owner_id
"#;

const CATEGORY_SELECT: &str = r#"
    SELECT k.id, k.name, k.owner_id, u.username AS owner,
           ARRAY(SELECT cp.post_id FROM category_posts cp WHERE cp.category_id = k.id ORDER BY cp.post_id) AS posts
    FROM categories k
    JOIN users u ON u.id = k.owner_id
"#;

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
/// Multi-statement operations (cascading deletes, link replacement) run inside a
/// single transaction so a failure never leaves orphan rows behind.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn count(&self, table: &'static str) -> RepoResult<i64> {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .map_err(logged("count"))
    }
}

/// Logs a database failure under the operation name before propagating it.
fn logged(op: &'static str) -> impl Fn(sqlx::Error) -> RepoError {
    move |e| {
        tracing::error!("{} error: {:?}", op, e);
        RepoError::Database(e)
    }
}

/// Maps a unique-constraint violation on `users.username` to a conflict.
fn username_conflict(op: &'static str) -> impl Fn(sqlx::Error) -> RepoError {
    move |e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            RepoError::Conflict("a user with that username already exists".to_string())
        }
        other => logged(op)(other),
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- USERS ---

    async fn create_user(&self, username: &str, password_hash: &str) -> RepoResult<User> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (username, password_hash) VALUES ($1, $2) RETURNING id",
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(username_conflict("create_user"))?;

        sqlx::query_as::<_, User>(&format!("{USER_SELECT} WHERE u.id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(logged("create_user"))
    }

    async fn get_user(&self, id: i64) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!("{USER_SELECT} WHERE u.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(logged("get_user"))
    }

    async fn get_credentials(&self, username: &str) -> RepoResult<Option<Credentials>> {
        sqlx::query_as::<_, Credentials>(
            "SELECT id, username, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(logged("get_credentials"))
    }

    async fn list_users(&self, page: Page) -> RepoResult<(Vec<User>, i64)> {
        let users = sqlx::query_as::<_, User>(&format!(
            "{USER_SELECT} ORDER BY u.id LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(logged("list_users"))?;
        Ok((users, self.count("users").await?))
    }

    /// update_user
    ///
    /// Uses `COALESCE` so that only the provided fields change.
    async fn update_user(&self, id: i64, changes: UserChanges) -> RepoResult<Option<User>> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET username = COALESCE($2, username),
                password_hash = COALESCE($3, password_hash)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(changes.username)
        .bind(changes.password_hash)
        .execute(&self.pool)
        .await
        .map_err(username_conflict("update_user"))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_user(id).await
    }

    /// delete_user
    ///
    /// Removes the account and everything it owns: its comments, its posts (with
    /// the comments and category links hanging off them) and its categories (with
    /// their links).
    async fn delete_user(&self, id: i64) -> RepoResult<bool> {
        let mut tx = self.pool.begin().await.map_err(logged("delete_user"))?;

        let statements = [
            "DELETE FROM comments WHERE owner_id = $1",
            "DELETE FROM category_posts WHERE post_id IN (SELECT id FROM posts WHERE owner_id = $1)",
            "DELETE FROM comments WHERE post_id IN (SELECT id FROM posts WHERE owner_id = $1)",
            "DELETE FROM posts WHERE owner_id = $1",
            "DELETE FROM category_posts WHERE category_id IN (SELECT id FROM categories WHERE owner_id = $1)",
            "DELETE FROM categories WHERE owner_id = $1",
        ];
        for statement in statements {
            sqlx::query(statement)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(logged("delete_user"))?;
        }

        let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(logged("delete_user"))?
            .rows_affected();

        tx.commit().await.map_err(logged("delete_user"))?;
        Ok(deleted > 0)
    }

    // --- POSTS ---

    async fn list_posts(&self, page: Page) -> RepoResult<(Vec<Post>, i64)> {
        let posts = sqlx::query_as::<_, Post>(&format!(
            "{POST_SELECT} ORDER BY p.created ASC, p.owner_id ASC NULLS LAST, p.id ASC LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(logged("list_posts"))?;
        Ok((posts, self.count("posts").await?))
    }

    async fn get_post(&self, id: i64) -> RepoResult<Option<Post>> {
        sqlx::query_as::<_, Post>(&format!("{POST_SELECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(logged("get_post"))
    }

    async fn create_post(&self, req: CreatePostRequest, owner_id: i64) -> RepoResult<Post> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO posts (title, body, owner_id) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(req.title)
        .bind(req.body)
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await
        .map_err(logged("create_post"))?;

        sqlx::query_as::<_, Post>(&format!("{POST_SELECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(logged("create_post"))
    }

    async fn update_post(&self, id: i64, req: UpdatePostRequest) -> RepoResult<Option<Post>> {
        let result = sqlx::query(
            "UPDATE posts SET title = COALESCE($2, title), body = COALESCE($3, body) WHERE id = $1",
        )
        .bind(id)
        .bind(req.title)
        .bind(req.body)
        .execute(&self.pool)
        .await
        .map_err(logged("update_post"))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_post(id).await
    }

    /// delete_post
    ///
    /// Cascade: category links and comments go first, then the post itself.
    async fn delete_post(&self, id: i64) -> RepoResult<bool> {
        let mut tx = self.pool.begin().await.map_err(logged("delete_post"))?;

        for statement in [
            "DELETE FROM category_posts WHERE post_id = $1",
            "DELETE FROM comments WHERE post_id = $1",
        ] {
            sqlx::query(statement)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(logged("delete_post"))?;
        }

        let deleted = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(logged("delete_post"))?
            .rows_affected();

        tx.commit().await.map_err(logged("delete_post"))?;
        Ok(deleted > 0)
    }

    // --- COMMENTS ---

    async fn list_comments(&self, page: Page) -> RepoResult<(Vec<Comment>, i64)> {
        let comments = sqlx::query_as::<_, Comment>(&format!(
            "{COMMENT_SELECT} ORDER BY c.created ASC, c.id ASC LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(logged("list_comments"))?;
        Ok((comments, self.count("comments").await?))
    }

    async fn comments_for_post(&self, post_id: i64) -> RepoResult<Vec<Comment>> {
        sqlx::query_as::<_, Comment>(&format!(
            "{COMMENT_SELECT} WHERE c.post_id = $1 ORDER BY c.created ASC, c.id ASC"
        ))
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(logged("comments_for_post"))
    }

    async fn get_comment(&self, id: i64) -> RepoResult<Option<Comment>> {
        sqlx::query_as::<_, Comment>(&format!("{COMMENT_SELECT} WHERE c.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(logged("get_comment"))
    }

    async fn create_comment(&self, post_id: i64, owner_id: i64, body: String) -> RepoResult<Comment> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO comments (post_id, owner_id, body) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(post_id)
        .bind(owner_id)
        .bind(body)
        .fetch_one(&self.pool)
        .await
        .map_err(logged("create_comment"))?;

        sqlx::query_as::<_, Comment>(&format!("{COMMENT_SELECT} WHERE c.id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(logged("create_comment"))
    }

    async fn update_comment(&self, id: i64, req: UpdateCommentRequest) -> RepoResult<Option<Comment>> {
        let result = sqlx::query(
            "UPDATE comments SET body = COALESCE($2, body), updated = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(req.body)
        .execute(&self.pool)
        .await
        .map_err(logged("update_comment"))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_comment(id).await
    }

    async fn delete_comment(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(logged("delete_comment"))?;
        Ok(result.rows_affected() > 0)
    }

    // --- CATEGORIES ---

    async fn list_categories(&self, page: Page) -> RepoResult<(Vec<Category>, i64)> {
        let categories = sqlx::query_as::<_, Category>(&format!(
            "{CATEGORY_SELECT} ORDER BY k.id LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(logged("list_categories"))?;
        Ok((categories, self.count("categories").await?))
    }

    async fn get_category(&self, id: i64) -> RepoResult<Option<Category>> {
        sqlx::query_as::<_, Category>(&format!("{CATEGORY_SELECT} WHERE k.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(logged("get_category"))
    }

    async fn create_category(&self, req: CreateCategoryRequest, owner_id: i64) -> RepoResult<Category> {
        let mut tx = self.pool.begin().await.map_err(logged("create_category"))?;

        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO categories (name, owner_id) VALUES ($1, $2) RETURNING id",
        )
        .bind(req.name)
        .bind(owner_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(logged("create_category"))?;

        sqlx::query(
            "INSERT INTO category_posts (category_id, post_id) SELECT $1, UNNEST($2::BIGINT[]) ON CONFLICT DO NOTHING",
        )
        .bind(id)
        .bind(&req.posts)
        .execute(&mut *tx)
        .await
        .map_err(logged("create_category"))?;

        tx.commit().await.map_err(logged("create_category"))?;

        sqlx::query_as::<_, Category>(&format!("{CATEGORY_SELECT} WHERE k.id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(logged("create_category"))
    }

    /// update_category
    ///
    /// When `posts` is given, the link set is replaced wholesale within the same
    /// transaction as the rename.
    async fn update_category(&self, id: i64, req: UpdateCategoryRequest) -> RepoResult<Option<Category>> {
        let mut tx = self.pool.begin().await.map_err(logged("update_category"))?;

        let updated = sqlx::query("UPDATE categories SET name = COALESCE($2, name) WHERE id = $1")
            .bind(id)
            .bind(req.name)
            .execute(&mut *tx)
            .await
            .map_err(logged("update_category"))?
            .rows_affected();

        if updated == 0 {
            // Dropping the transaction rolls it back.
            return Ok(None);
        }

        if let Some(posts) = req.posts {
            sqlx::query("DELETE FROM category_posts WHERE category_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(logged("update_category"))?;
            sqlx::query(
                "INSERT INTO category_posts (category_id, post_id) SELECT $1, UNNEST($2::BIGINT[]) ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(&posts)
            .execute(&mut *tx)
            .await
            .map_err(logged("update_category"))?;
        }

        tx.commit().await.map_err(logged("update_category"))?;
        self.get_category(id).await
    }

    /// delete_category
    ///
    /// Detaches the linked posts; the posts themselves survive.
    async fn delete_category(&self, id: i64) -> RepoResult<bool> {
        let mut tx = self.pool.begin().await.map_err(logged("delete_category"))?;

        sqlx::query("DELETE FROM category_posts WHERE category_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(logged("delete_category"))?;

        let deleted = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(logged("delete_category"))?
            .rows_affected();

        tx.commit().await.map_err(logged("delete_category"))?;
        Ok(deleted > 0)
    }
}
