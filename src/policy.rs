//! Owner-or-read-only permission policy.
//!
//! One rule covers every record type: anyone may read, only the record's owner may
//! update or delete it. A record without an owner is read-only for everybody.

use std::fmt;

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{Category, Comment, Post, User},
};

/// EntityKind
///
/// Tag for each record type the service exposes. Used in errors, logs and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Post,
    Comment,
    Category,
}

impl EntityKind {
    pub fn name(self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Post => "post",
            EntityKind::Comment => "comment",
            EntityKind::Category => "category",
        }
    }

    /// Collection segment of the REST API (`/posts/`, `/categories/`, ...).
    pub fn collection(self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Post => "posts",
            EntityKind::Comment => "comments",
            EntityKind::Category => "categories",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    /// Update or delete.
    Write,
}

/// Owned
///
/// Implemented by every record the policy guards.
pub trait Owned {
    const KIND: EntityKind;

    fn id(&self) -> i64;

    fn owner_id(&self) -> Option<i64>;
}

impl Owned for Post {
    const KIND: EntityKind = EntityKind::Post;

    fn id(&self) -> i64 {
        self.id
    }

    fn owner_id(&self) -> Option<i64> {
        self.owner_id
    }
}

impl Owned for Comment {
    const KIND: EntityKind = EntityKind::Comment;

    fn id(&self) -> i64 {
        self.id
    }

    fn owner_id(&self) -> Option<i64> {
        self.owner_id
    }
}

impl Owned for Category {
    const KIND: EntityKind = EntityKind::Category;

    fn id(&self) -> i64 {
        self.id
    }

    fn owner_id(&self) -> Option<i64> {
        Some(self.owner_id)
    }
}

/// An account owns itself.
impl Owned for User {
    const KIND: EntityKind = EntityKind::User;

    fn id(&self) -> i64 {
        self.id
    }

    fn owner_id(&self) -> Option<i64> {
        Some(self.id)
    }
}

/// True only when both sides are present and equal. An ownerless record matches nobody.
pub fn is_owner<R: Owned>(record: &R, identity: Option<&AuthUser>) -> bool {
    matches!((record.owner_id(), identity), (Some(owner), Some(user)) if owner == user.id)
}

/// authorize
///
/// Applies the policy before any mutation happens.
///
/// * `Read` is always granted.
/// * `Write` without a session fails with `LoginRequired`.
/// * `Write` by anyone but the owner fails with `PermissionDenied`.
pub fn authorize<R: Owned>(record: &R, identity: Option<&AuthUser>, access: Access) -> AppResult<()> {
    match (access, identity) {
        (Access::Read, _) => Ok(()),
        (Access::Write, None) => Err(AppError::LoginRequired),
        (Access::Write, Some(user)) if is_owner(record, Some(user)) => Ok(()),
        (Access::Write, Some(user)) => {
            tracing::warn!(
                entity = %R::KIND,
                id = record.id(),
                user_id = user.id,
                "write denied: requester is not the owner"
            );
            Err(AppError::PermissionDenied)
        }
    }
}
