use blog_portal::{
    AppError,
    auth::AuthUser,
    models::{Category, Comment, Post, User},
    policy::{Access, EntityKind, Owned, authorize, is_owner},
};

fn user(id: i64) -> AuthUser {
    AuthUser {
        id,
        username: format!("user{id}"),
    }
}

fn post_owned_by(owner_id: Option<i64>) -> Post {
    Post {
        id: 10,
        title: "t".to_string(),
        owner_id,
        ..Post::default()
    }
}

#[test]
fn test_reads_are_always_granted() {
    let post = post_owned_by(Some(1));
    assert!(authorize(&post, None, Access::Read).is_ok());
    assert!(authorize(&post, Some(&user(2)), Access::Read).is_ok());
}

#[test]
fn test_owner_may_write() {
    let post = post_owned_by(Some(1));
    assert!(authorize(&post, Some(&user(1)), Access::Write).is_ok());
}

#[test]
fn test_non_owner_write_is_denied() {
    let post = post_owned_by(Some(1));
    let result = authorize(&post, Some(&user(2)), Access::Write);
    assert!(matches!(result, Err(AppError::PermissionDenied)));
}

#[test]
fn test_anonymous_write_requires_login() {
    let post = post_owned_by(Some(1));
    let result = authorize(&post, None, Access::Write);
    assert!(matches!(result, Err(AppError::LoginRequired)));
}

#[test]
fn test_ownerless_record_is_read_only_for_everyone() {
    let post = post_owned_by(None);
    assert!(!is_owner(&post, Some(&user(1))));
    for id in [1, 2, 3] {
        assert!(matches!(
            authorize(&post, Some(&user(id)), Access::Write),
            Err(AppError::PermissionDenied)
        ));
    }
}

#[test]
fn test_comment_uses_the_same_owner_rule() {
    let comment = Comment {
        id: 5,
        post_id: 10,
        owner_id: Some(1),
        ..Comment::default()
    };
    assert!(authorize(&comment, Some(&user(1)), Access::Write).is_ok());
    assert!(matches!(
        authorize(&comment, Some(&user(2)), Access::Write),
        Err(AppError::PermissionDenied)
    ));
}

#[test]
fn test_category_and_user_ownership() {
    let category = Category {
        id: 4,
        owner_id: 3,
        ..Category::default()
    };
    assert!(is_owner(&category, Some(&user(3))));
    assert!(!is_owner(&category, Some(&user(4))));

    let account = User {
        id: 3,
        ..User::default()
    };
    assert_eq!(account.owner_id(), Some(3));
    assert!(is_owner(&account, Some(&user(3))));
    assert!(!is_owner(&account, None));
}

#[test]
fn test_entity_kind_table() {
    assert_eq!(<Post as Owned>::KIND, EntityKind::Post);
    assert_eq!(<Comment as Owned>::KIND, EntityKind::Comment);
    assert_eq!(EntityKind::Category.collection(), "categories");
    assert_eq!(EntityKind::User.to_string(), "user");
}

#[test]
fn test_every_kind_has_a_distinct_collection() {
    let kinds = [EntityKind::User, EntityKind::Post, EntityKind::Comment, EntityKind::Category];
    let mut collections: Vec<&str> = kinds.iter().map(|k| k.collection()).collect();
    collections.sort_unstable();
    collections.dedup();
    assert_eq!(collections.len(), kinds.len());
}
