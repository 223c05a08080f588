use std::env;

/// Fallback signing secret for local development and tests. Never valid in production.
const LOCAL_SESSION_SECRET: &str = "insecure-local-session-secret-change-me";

/// Two weeks, the usual lifetime of a browser login.
const DEFAULT_SESSION_TTL_SECS: i64 = 1_209_600;

const DEFAULT_PAGE_SIZE: u32 = 10;

/// AppConfig
///
/// Holds the application's entire configuration state. Loaded once at startup and
/// shared read-only through `AppState` (pulled into handlers via `FromRef`).
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Postgres connection string. `None` (local only) selects the in-memory store.
    pub db_url: Option<String>,
    // Runtime environment marker. Controls cookie hardening and required secrets.
    pub env: Env,
    // Accept an `x-user-id` header as the session identity. Opt-in, local only.
    pub dev_auth_bypass: bool,
    // HMAC secret used to sign and verify session tokens.
    pub session_secret: String,
    // Lifetime of a session token and of the session cookie, in seconds.
    pub session_ttl_secs: i64,
    // Page size used by list endpoints when the client does not ask for one.
    pub page_size: u32,
    // Socket address the HTTP server binds to.
    pub bind_addr: String,
}

/// Env
///
/// Defines the runtime context: `Local` allows development conveniences
/// (optional database, opt-in header identity), `Production` demands every secret.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// default
    ///
    /// Safe, non-panicking configuration for test scaffolding. No environment
    /// variables are read.
    fn default() -> Self {
        Self {
            db_url: None,
            env: Env::Local,
            dev_auth_bypass: false,
            session_secret: LOCAL_SESSION_SECRET.to_string(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            page_size: DEFAULT_PAGE_SIZE,
            bind_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables, following the
    /// **fail-fast** principle.
    ///
    /// # Panics
    /// Panics in production when `DATABASE_URL` or `SESSION_SECRET` is missing, and
    /// in any environment when a numeric variable cannot be parsed. Starting with a
    /// half-configured process is worse than not starting.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").unwrap_or_else(|_| "local".to_string()).as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let session_ttl_secs = numeric_var("SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS);
        let page_size = numeric_var("PAGE_SIZE", DEFAULT_PAGE_SIZE);
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        match env {
            Env::Local => Self {
                env,
                dev_auth_bypass: flag_var("DEV_AUTH_BYPASS"),
                // Local runs may skip Postgres entirely and use the in-memory store.
                db_url: env::var("DATABASE_URL").ok(),
                session_secret: env::var("SESSION_SECRET")
                    .unwrap_or_else(|_| LOCAL_SESSION_SECRET.to_string()),
                session_ttl_secs,
                page_size,
                bind_addr,
            },
            Env::Production => Self {
                env,
                // Never honored in production, whatever the environment says.
                dev_auth_bypass: false,
                db_url: Some(
                    env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in production"),
                ),
                session_secret: env::var("SESSION_SECRET")
                    .expect("FATAL: SESSION_SECRET must be set in production."),
                session_ttl_secs,
                page_size,
                bind_addr,
            },
        }
    }

    /// Whether an `x-user-id` header may stand in for a session.
    pub fn header_identity_allowed(&self) -> bool {
        self.dev_auth_bypass && self.env == Env::Local
    }

    /// Whether cookies must carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.env == Env::Production
    }
}

fn numeric_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("FATAL: {name} must be a number, got {raw:?}")),
        Err(_) => default,
    }
}

fn flag_var(name: &str) -> bool {
    env::var(name)
        .map(|raw| matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
