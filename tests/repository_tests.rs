use blog_portal::{
    MemoryRepository,
    error::RepoError,
    models::{
        CreateCategoryRequest, CreatePostRequest, Page, UpdateCategoryRequest, UpdateCommentRequest,
        UpdatePostRequest, UserChanges,
    },
    repository::Repository,
};
use std::time::Duration;

// --- Test Utilities ---

fn post_req(title: &str) -> CreatePostRequest {
    CreatePostRequest {
        title: title.to_string(),
        body: format!("{title} body"),
    }
}

fn category_req(name: &str, posts: Vec<i64>) -> CreateCategoryRequest {
    CreateCategoryRequest {
        name: name.to_string(),
        posts,
    }
}

// --- Users ---

#[tokio::test]
async fn test_usernames_are_unique() {
    let repo = MemoryRepository::new();
    repo.create_user("alice", "hash").await.unwrap();

    let duplicate = repo.create_user("alice", "other").await;
    assert!(matches!(duplicate, Err(RepoError::Conflict(_))));

    let bob = repo.create_user("bob", "hash").await.unwrap();
    let rename = repo
        .update_user(
            bob.id,
            UserChanges {
                username: Some("alice".to_string()),
                password_hash: None,
            },
        )
        .await;
    assert!(matches!(rename, Err(RepoError::Conflict(_))));
}

#[tokio::test]
async fn test_credentials_lookup() {
    let repo = MemoryRepository::new();
    let alice = repo.create_user("alice", "stored-hash").await.unwrap();

    let creds = repo.get_credentials("alice").await.unwrap().unwrap();
    assert_eq!(creds.id, alice.id);
    assert_eq!(creds.password_hash, "stored-hash");
    assert!(repo.get_credentials("nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn test_user_lists_owned_ids() {
    let repo = MemoryRepository::new();
    let alice = repo.create_user("alice", "h").await.unwrap();
    let post = repo.create_post(post_req("first"), alice.id).await.unwrap();
    let comment = repo
        .create_comment(post.id, alice.id, "nice".to_string())
        .await
        .unwrap();
    let category = repo
        .create_category(category_req("rust", vec![post.id]), alice.id)
        .await
        .unwrap();

    let alice = repo.get_user(alice.id).await.unwrap().unwrap();
    assert_eq!(alice.posts, vec![post.id]);
    assert_eq!(alice.comments, vec![comment.id]);
    assert_eq!(alice.categories, vec![category.id]);
}

#[tokio::test]
async fn test_delete_user_removes_everything_owned() {
    let repo = MemoryRepository::new();
    let alice = repo.create_user("alice", "h").await.unwrap();
    let bob = repo.create_user("bob", "h").await.unwrap();

    let alice_post = repo.create_post(post_req("alice's"), alice.id).await.unwrap();
    let bob_post = repo.create_post(post_req("bob's"), bob.id).await.unwrap();
    // Bob comments under Alice's post; Alice comments under Bob's.
    let bob_on_alice = repo
        .create_comment(alice_post.id, bob.id, "hi alice".to_string())
        .await
        .unwrap();
    let alice_on_bob = repo
        .create_comment(bob_post.id, alice.id, "hi bob".to_string())
        .await
        .unwrap();
    let alice_cat = repo
        .create_category(category_req("mine", vec![bob_post.id]), alice.id)
        .await
        .unwrap();

    assert!(repo.delete_user(alice.id).await.unwrap());

    assert!(repo.get_user(alice.id).await.unwrap().is_none());
    assert!(repo.get_post(alice_post.id).await.unwrap().is_none());
    assert!(repo.get_comment(bob_on_alice.id).await.unwrap().is_none());
    assert!(repo.get_comment(alice_on_bob.id).await.unwrap().is_none());
    assert!(repo.get_category(alice_cat.id).await.unwrap().is_none());

    // Bob's post survives, detached from the deleted category.
    let bob_post = repo.get_post(bob_post.id).await.unwrap().unwrap();
    assert!(bob_post.categories.is_empty());
    assert!(bob_post.comments.is_empty());

    assert!(!repo.delete_user(alice.id).await.unwrap());
}

// --- Posts ---

#[tokio::test]
async fn test_posts_are_ordered_by_creation_then_owner() {
    let repo = MemoryRepository::new();
    let alice = repo.create_user("alice", "h").await.unwrap();
    let bob = repo.create_user("bob", "h").await.unwrap();

    // Distinct timestamps, so creation time alone decides.
    let first = repo.create_post(post_req("one"), bob.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2)).await;
    let second = repo.create_post(post_req("two"), alice.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2)).await;
    let third = repo.create_post(post_req("three"), bob.id).await.unwrap();

    let (posts, count) = repo.list_posts(Page::all()).await.unwrap();
    assert_eq!(count, 3);
    let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![first.id, second.id, third.id]);
    assert!(posts.windows(2).all(|w| w[0].created <= w[1].created));
}

#[tokio::test]
async fn test_post_pagination_window() {
    let repo = MemoryRepository::new();
    let alice = repo.create_user("alice", "h").await.unwrap();
    for i in 0..5 {
        repo.create_post(post_req(&format!("post {i}")), alice.id).await.unwrap();
    }

    let (page, count) = repo.list_posts(Page::new(2, 2)).await.unwrap();
    assert_eq!(count, 5);
    let titles: Vec<&str> = page.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["post 2", "post 3"]);

    let (past_end, count) = repo.list_posts(Page::new(9, 2)).await.unwrap();
    assert!(past_end.is_empty());
    assert_eq!(count, 5);
}

#[tokio::test]
async fn test_post_partial_update() {
    let repo = MemoryRepository::new();
    let alice = repo.create_user("alice", "h").await.unwrap();
    let post = repo.create_post(post_req("draft"), alice.id).await.unwrap();

    let updated = repo
        .update_post(
            post.id,
            UpdatePostRequest {
                title: Some("final".to_string()),
                body: None,
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.title, "final");
    assert_eq!(updated.body, "draft body");
    assert_eq!(updated.owner_id, Some(alice.id));
    assert_eq!(updated.owner.as_deref(), Some("alice"));

    assert!(repo.update_post(999_999, UpdatePostRequest::default()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_post_cascades_to_comments_and_links() {
    let repo = MemoryRepository::new();
    let alice = repo.create_user("alice", "h").await.unwrap();
    let doomed = repo.create_post(post_req("doomed"), alice.id).await.unwrap();
    let kept = repo.create_post(post_req("kept"), alice.id).await.unwrap();

    let c1 = repo.create_comment(doomed.id, alice.id, "a".to_string()).await.unwrap();
    let c2 = repo.create_comment(doomed.id, alice.id, "b".to_string()).await.unwrap();
    let other = repo.create_comment(kept.id, alice.id, "c".to_string()).await.unwrap();
    let category = repo
        .create_category(category_req("both", vec![doomed.id, kept.id]), alice.id)
        .await
        .unwrap();

    assert!(repo.delete_post(doomed.id).await.unwrap());

    assert!(repo.get_comment(c1.id).await.unwrap().is_none());
    assert!(repo.get_comment(c2.id).await.unwrap().is_none());
    assert!(repo.get_comment(other.id).await.unwrap().is_some());
    let category = repo.get_category(category.id).await.unwrap().unwrap();
    assert_eq!(category.posts, vec![kept.id]);

    let (remaining, count) = repo.list_comments(Page::all()).await.unwrap();
    assert_eq!(count, 1);
    assert!(remaining.iter().all(|c| c.post_id != doomed.id));
}

// --- Comments ---

#[tokio::test]
async fn test_comments_ordered_by_creation() {
    let repo = MemoryRepository::new();
    let alice = repo.create_user("alice", "h").await.unwrap();
    let post = repo.create_post(post_req("p"), alice.id).await.unwrap();
    let first = repo.create_comment(post.id, alice.id, "1".to_string()).await.unwrap();
    let second = repo.create_comment(post.id, alice.id, "2".to_string()).await.unwrap();

    let ids: Vec<i64> = repo
        .comments_for_post(post.id)
        .await
        .unwrap()
        .iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec![first.id, second.id]);

    let post = repo.get_post(post.id).await.unwrap().unwrap();
    assert_eq!(post.comments, vec![first.id, second.id]);
}

#[tokio::test]
async fn test_comment_defaults_and_update() {
    let repo = MemoryRepository::new();
    let alice = repo.create_user("alice", "h").await.unwrap();
    let post = repo.create_post(post_req("p"), alice.id).await.unwrap();
    let comment = repo.create_comment(post.id, alice.id, "old".to_string()).await.unwrap();

    assert!(comment.active);
    assert_eq!(comment.created, comment.updated);
    assert_eq!(comment.owner.as_deref(), Some("alice"));

    let updated = repo
        .update_comment(
            comment.id,
            UpdateCommentRequest {
                body: Some("new".to_string()),
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.body, "new");
    assert!(updated.updated >= comment.updated);
    assert_eq!(updated.created, comment.created);
}

#[tokio::test]
async fn test_delete_comment_touches_nothing_else() {
    let repo = MemoryRepository::new();
    let alice = repo.create_user("alice", "h").await.unwrap();
    let post = repo.create_post(post_req("p"), alice.id).await.unwrap();
    let gone = repo.create_comment(post.id, alice.id, "x".to_string()).await.unwrap();
    let stays = repo.create_comment(post.id, alice.id, "y".to_string()).await.unwrap();

    assert!(repo.delete_comment(gone.id).await.unwrap());
    assert!(!repo.delete_comment(gone.id).await.unwrap());

    let post = repo.get_post(post.id).await.unwrap().unwrap();
    assert_eq!(post.comments, vec![stays.id]);
}

// --- Categories ---

#[tokio::test]
async fn test_delete_category_detaches_posts() {
    let repo = MemoryRepository::new();
    let alice = repo.create_user("alice", "h").await.unwrap();
    let post = repo.create_post(post_req("p"), alice.id).await.unwrap();
    let category = repo
        .create_category(category_req("news", vec![post.id]), alice.id)
        .await
        .unwrap();
    assert_eq!(category.posts, vec![post.id]);
    assert_eq!(category.owner, "alice");

    let post_before = repo.get_post(post.id).await.unwrap().unwrap();
    assert_eq!(post_before.categories, vec![category.id]);

    assert!(repo.delete_category(category.id).await.unwrap());

    let post_after = repo.get_post(post.id).await.unwrap().unwrap();
    assert!(post_after.categories.is_empty());
}

#[tokio::test]
async fn test_category_update_replaces_links() {
    let repo = MemoryRepository::new();
    let alice = repo.create_user("alice", "h").await.unwrap();
    let a = repo.create_post(post_req("a"), alice.id).await.unwrap();
    let b = repo.create_post(post_req("b"), alice.id).await.unwrap();
    let category = repo
        .create_category(category_req("tag", vec![a.id]), alice.id)
        .await
        .unwrap();

    let renamed = repo
        .update_category(
            category.id,
            UpdateCategoryRequest {
                name: Some("renamed".to_string()),
                posts: None,
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(renamed.name, "renamed");
    assert_eq!(renamed.posts, vec![a.id]);

    let relinked = repo
        .update_category(
            category.id,
            UpdateCategoryRequest {
                name: None,
                posts: Some(vec![b.id]),
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(relinked.posts, vec![b.id]);
}

#[tokio::test]
async fn test_ownerless_posts_sort_last_among_equals() {
    let repo = MemoryRepository::new();
    let alice = repo.create_user("alice", "h").await.unwrap();
    let owned = repo.create_post(post_req("owned"), alice.id).await.unwrap();
    let orphan = repo.insert_ownerless_post("orphan", "no owner").await;

    assert_eq!(orphan.owner_id, None);
    assert_eq!(orphan.owner, None);

    let (posts, _) = repo.list_posts(Page::all()).await.unwrap();
    let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![owned.id, orphan.id]);
}
