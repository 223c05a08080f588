//! Runs against a real Postgres. Ignored by default:
//! `DATABASE_URL=postgres://... cargo test -- --ignored`

use blog_portal::{
    error::RepoError,
    models::{CreateCategoryRequest, CreatePostRequest, Page, UpdateCommentRequest, User},
    repository::{PostgresRepository, Repository},
};
use chrono::Utc;
use sqlx::PgPool;
use tokio::test;

// --- Test Context and Setup ---

struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        let context = DbTestContext { pool };
        context
            .repository()
            .migrate()
            .await
            .expect("Failed to run database migrations.");
        context
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

/// Usernames must be unique across runs against the same database.
async fn create_test_user(repo: &PostgresRepository, prefix: &str) -> User {
    let username = format!("{prefix}{}", Utc::now().timestamp_nanos_opt().unwrap_or_default());
    repo.create_user(&username, "test-hash")
        .await
        .expect("Failed to create test user")
}

fn post_req(title: &str) -> CreatePostRequest {
    CreatePostRequest {
        title: title.to_string(),
        body: "integration body".to_string(),
    }
}

// --- Tests ---

#[test]
#[ignore]
async fn test_user_round_trip_and_conflict() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&repo, "alice").await;

    let fetched = repo.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(fetched.username, user.username);
    assert!(fetched.posts.is_empty());

    let creds = repo.get_credentials(&user.username).await.unwrap().unwrap();
    assert_eq!(creds.password_hash, "test-hash");

    let duplicate = repo.create_user(&user.username, "other").await;
    assert!(matches!(duplicate, Err(RepoError::Conflict(_))));

    assert!(repo.delete_user(user.id).await.unwrap());
}

#[test]
#[ignore]
async fn test_post_delete_cascades() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let owner = create_test_user(&repo, "owner").await;

    let post = repo.create_post(post_req("cascade"), owner.id).await.unwrap();
    assert_eq!(post.owner.as_deref(), Some(owner.username.as_str()));
    let comment = repo
        .create_comment(post.id, owner.id, "soon gone".to_string())
        .await
        .unwrap();
    let category = repo
        .create_category(
            CreateCategoryRequest {
                name: "cascade".to_string(),
                posts: vec![post.id],
            },
            owner.id,
        )
        .await
        .unwrap();
    assert_eq!(category.posts, vec![post.id]);

    assert!(repo.delete_post(post.id).await.unwrap());
    assert!(repo.get_comment(comment.id).await.unwrap().is_none());
    let category = repo.get_category(category.id).await.unwrap().unwrap();
    assert!(category.posts.is_empty());

    assert!(repo.delete_user(owner.id).await.unwrap());
    assert!(repo.get_category(category.id).await.unwrap().is_none());
}

#[test]
#[ignore]
async fn test_comment_update_refreshes_timestamp() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let owner = create_test_user(&repo, "commenter").await;
    let post = repo.create_post(post_req("thread"), owner.id).await.unwrap();
    let comment = repo
        .create_comment(post.id, owner.id, "first".to_string())
        .await
        .unwrap();
    assert!(comment.active);

    let updated = repo
        .update_comment(
            comment.id,
            UpdateCommentRequest {
                body: Some("second".to_string()),
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.body, "second");
    assert!(updated.updated >= comment.updated);

    repo.delete_user(owner.id).await.unwrap();
}

#[test]
#[ignore]
async fn test_post_listing_order_and_count() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let owner = create_test_user(&repo, "lister").await;
    repo.create_post(post_req("one"), owner.id).await.unwrap();
    repo.create_post(post_req("two"), owner.id).await.unwrap();

    let (posts, count) = repo.list_posts(Page::all()).await.unwrap();
    assert!(count >= 2);
    assert!(posts.windows(2).all(|w| w[0].created <= w[1].created));

    repo.delete_user(owner.id).await.unwrap();
}
