use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use chrono::Utc;
use cookie::{Cookie, SameSite, time::Duration};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use validator::Validate;

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    models::{LoginRequest, RegisterUserRequest, User},
    repository::{Repository, RepositoryState},
};

/// Name of the cookie carrying the session token for browser clients.
pub const SESSION_COOKIE: &str = "sessionid";

/// Claims
///
/// Payload of a session token. Signed with the configured session secret and
/// validated on every request that presents it.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id, as a decimal string.
    pub sub: String,
    /// Expiration time (seconds since the epoch).
    pub exp: usize,
    /// Issued at.
    pub iat: usize,
}

/// AuthUser
///
/// The resolved identity of an authenticated request. As an extractor it rejects
/// anonymous requests with `AppError::LoginRequired` before the handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
        }
    }
}

/// Session
///
/// The request's identity made explicit: `Some` for a logged-in user, `None` for
/// an anonymous visitor. Never rejects; handlers decide what anonymity means.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub user: Option<AuthUser>,
}

impl Session {
    pub fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    /// Turns an anonymous session into `LoginRequired`.
    pub fn require(&self) -> AppResult<&AuthUser> {
        self.user.as_ref().ok_or(AppError::LoginRequired)
    }
}

// --- Password hashing ---

/// Hashes a password into an argon2 PHC string.
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing: {e}")))
}

/// Checks a password against a stored hash. A malformed hash never verifies.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!("stored password hash is unreadable: {}", e);
            false
        }
    }
}

// --- Session tokens ---

/// Issues a signed session token for `user_id`, valid for the configured TTL.
pub fn issue_token(user_id: i64, config: &AppConfig) -> AppResult<String> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now as usize,
        exp: (now + config.session_ttl_secs) as usize,
    };
    let key = EncodingKey::from_secret(config.session_secret.as_bytes());
    Ok(encode(&Header::default(), &claims, &key)?)
}

/// Validates a token's signature and expiry and returns the user id it names.
pub fn verify_token(token: &str, config: &AppConfig) -> Option<i64> {
    let key = DecodingKey::from_secret(config.session_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    match decode::<Claims>(token, &key, &validation) {
        Ok(data) => data.claims.sub.parse().ok(),
        Err(e) => {
            tracing::debug!("rejected session token: {}", e);
            None
        }
    }
}

/// The `Set-Cookie` value that opens a browser session.
pub fn session_cookie(token: &str, config: &AppConfig) -> String {
    Cookie::build((SESSION_COOKIE, token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookies())
        .max_age(Duration::seconds(config.session_ttl_secs))
        .build()
        .to_string()
}

/// The `Set-Cookie` value that destroys the browser session.
pub fn clear_session_cookie() -> String {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::ZERO)
        .build()
        .to_string()
}

/// Pulls a token from `Authorization: Bearer ...`, falling back to the session cookie.
fn presented_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == SESSION_COOKIE && !c.value().is_empty())
        .map(|c| c.value().to_string())
}

/// resolve_identity
///
/// Resolution order:
/// 1. Development bypass: only when `DEV_AUTH_BYPASS` is set in `Env::Local`, an
///    `x-user-id` header naming an existing user is accepted as-is.
/// 2. A bearer token, or else the `sessionid` cookie.
/// 3. The user named by the token must still exist, so deleted accounts lose
///    access immediately.
///
/// Any failure yields `None` (anonymous).
pub async fn resolve_identity(
    headers: &HeaderMap,
    repo: &dyn Repository,
    config: &AppConfig,
) -> Option<AuthUser> {
    let user_id = match local_bypass(headers, config) {
        Some(id) => id,
        None => verify_token(&presented_token(headers)?, config)?,
    };

    match repo.get_user(user_id).await {
        Ok(Some(user)) => Some(AuthUser::from(&user)),
        Ok(None) => None,
        Err(e) => {
            tracing::error!("identity lookup failed: {}", e);
            None
        }
    }
}

fn local_bypass(headers: &HeaderMap, config: &AppConfig) -> Option<i64> {
    if !config.header_identity_allowed() {
        return None;
    }
    headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|id| id.parse().ok())
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);
        let user = resolve_identity(&parts.headers, repo.as_ref(), &config).await;
        Ok(Session { user })
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(session) = Session::from_request_parts(parts, state).await;
        session.user.ok_or(AppError::LoginRequired)
    }
}

// --- Flows ---

/// register
///
/// Creates the account and immediately opens a session for it: the caller gets
/// the new user and a token, with no separate login step.
pub async fn register(
    repo: &dyn Repository,
    config: &AppConfig,
    req: RegisterUserRequest,
) -> AppResult<(User, String)> {
    req.validate()?;
    let hash = hash_password(&req.password)?;
    let user = repo.create_user(&req.username, &hash).await?;
    let token = issue_token(user.id, config)?;
    tracing::info!(user_id = user.id, username = %user.username, "registered new account");
    Ok((user, token))
}

/// login
///
/// Verifies credentials. Unknown usernames and wrong passwords produce the same
/// `AppError::Authentication`.
pub async fn login(
    repo: &dyn Repository,
    config: &AppConfig,
    req: LoginRequest,
) -> AppResult<(User, String)> {
    let credentials = repo.get_credentials(&req.username).await?;

    let Some(credentials) = credentials.filter(|c| verify_password(&req.password, &c.password_hash))
    else {
        tracing::warn!(username = %req.username, "failed login attempt");
        return Err(AppError::Authentication);
    };

    let user = repo
        .get_user(credentials.id)
        .await?
        .ok_or(AppError::Authentication)?;
    let token = issue_token(user.id, config)?;
    tracing::info!(user_id = user.id, "login");
    Ok((user, token))
}
