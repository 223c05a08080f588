use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use blog_portal::{AppConfig, AppState, MemoryRepository, create_router, repository::Repository};
use std::sync::Arc;
use tower::ServiceExt;

// --- Test Utilities ---

struct Site {
    router: Router,
    repo: Arc<MemoryRepository>,
}

fn site() -> Site {
    let repo = Arc::new(MemoryRepository::new());
    let state = AppState {
        repo: repo.clone(),
        config: AppConfig::default(),
    };
    Site {
        router: create_router(state),
        repo,
    }
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl Reply {
    fn location(&self) -> &str {
        self.headers[header::LOCATION].to_str().unwrap()
    }

    /// `name=value` of the session cookie this reply sets.
    fn session_cookie(&self) -> String {
        let raw = self.headers[header::SET_COOKIE].to_str().unwrap();
        raw.split(';').next().unwrap().to_string()
    }
}

async fn send(site: &Site, request: Request<Body>) -> Reply {
    let response = site.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    Reply {
        status,
        headers,
        body: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}

async fn get(site: &Site, uri: &str, cookie: Option<&str>) -> Reply {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    send(site, builder.body(Body::empty()).unwrap()).await
}

async fn post_form(site: &Site, uri: &str, form: &str, cookie: Option<&str>) -> Reply {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    send(site, builder.body(Body::from(form.to_string())).unwrap()).await
}

/// Registers through the form and returns the session cookie.
async fn sign_up(site: &Site, username: &str) -> String {
    let reply = post_form(site, "/reg", &format!("username={username}&password=pw123456"), None).await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(reply.location(), "/");
    reply.session_cookie()
}

/// Creates a post through `/edit` and returns its id.
async fn write_post(site: &Site, cookie: &str, title: &str) -> i64 {
    let reply = post_form(site, "/edit", &format!("title={title}&body=Some+text"), Some(cookie)).await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    reply
        .location()
        .strip_prefix("/edit?id=")
        .unwrap()
        .parse()
        .unwrap()
}

// --- Tests ---

#[tokio::test]
async fn test_index_lists_posts() {
    let site = site();
    let cookie = sign_up(&site, "alice").await;
    write_post(&site, &cookie, "Hello").await;

    let reply = get(&site, "/", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains("Hello"));
    assert!(reply.body.contains("alice"));
    assert!(reply.body.contains("Log in"));
}

#[tokio::test]
async fn test_registration_logs_in() {
    let site = site();
    let cookie = sign_up(&site, "alice").await;
    assert!(cookie.starts_with("sessionid="));

    let reply = get(&site, "/", Some(&cookie)).await;
    assert!(reply.body.contains("Signed in as alice"));
}

#[tokio::test]
async fn test_invalid_registration_rerenders_form() {
    let site = site();
    let reply = post_form(&site, "/reg", "username=bad+name&password=pw123456", None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.body.contains("<form"));
    assert!(!reply.headers.contains_key(header::SET_COOKIE));
}

#[tokio::test]
async fn test_login_and_logout() {
    let site = site();
    sign_up(&site, "alice").await;

    let failed = post_form(&site, "/login", "username=alice&password=wrong-pass", None).await;
    assert_eq!(failed.status, StatusCode::UNAUTHORIZED);
    assert!(failed.body.contains("invalid username or password"));

    let ok = post_form(&site, "/login", "username=alice&password=pw123456&next=/edit", None).await;
    assert_eq!(ok.status, StatusCode::SEE_OTHER);
    assert_eq!(ok.location(), "/edit");
    let cookie = ok.session_cookie();

    let logout = post_form(&site, "/logout", "", Some(&cookie)).await;
    assert_eq!(logout.status, StatusCode::SEE_OTHER);
    assert_eq!(logout.location(), "/");
    let cleared = logout.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cleared.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_login_next_must_be_local() {
    let site = site();
    sign_up(&site, "alice").await;

    let reply = post_form(
        &site,
        "/login",
        "username=alice&password=pw123456&next=//evil.example",
        None,
    )
    .await;
    assert_eq!(reply.location(), "/");
}

#[tokio::test]
async fn test_anonymous_write_redirects_to_login() {
    let site = site();
    let reply = post_form(&site, "/edit", "title=x&body=y", None).await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(reply.location(), "/login");
}

#[tokio::test]
async fn test_editor_lists_newest_first() {
    let site = site();
    let cookie = sign_up(&site, "alice").await;
    let older = write_post(&site, &cookie, "Older").await;
    let newer = write_post(&site, &cookie, "Newer").await;
    assert!(newer > older);

    let reply = get(&site, &format!("/edit?id={newer}"), Some(&cookie)).await;
    assert_eq!(reply.status, StatusCode::OK);
    let newer_at = reply.body.find("Newer").unwrap();
    let older_at = reply.body.find("Older").unwrap();
    assert!(newer_at < older_at);
}

#[tokio::test]
async fn test_empty_post_rerenders_editor() {
    let site = site();
    let cookie = sign_up(&site, "alice").await;
    let reply = post_form(&site, "/edit", "title=&body=text", Some(&cookie)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.body.contains("title"));
}

#[tokio::test]
async fn test_post_detail_and_comments() {
    let site = site();
    let alice = sign_up(&site, "alice").await;
    let bob = sign_up(&site, "bob").await;
    let id = write_post(&site, &alice, "Topic").await;

    let reply = post_form(&site, &format!("/{id}/"), "body=First%21", Some(&bob)).await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(reply.location(), format!("/{id}/"));

    let reply = get(&site, &format!("/{id}/"), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains("Topic"));
    assert!(reply.body.contains("First!"));

    let anonymous = post_form(&site, &format!("/{id}/"), "body=hi", None).await;
    assert_eq!(anonymous.location(), "/login");

    let empty = post_form(&site, &format!("/{id}/"), "body=+++", Some(&bob)).await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_post_page_is_not_found() {
    let site = site();
    let reply = get(&site, "/999999/", None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert!(reply.body.contains("404"));

    let reply = get(&site, "/not-a-number/", None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_comment_delete_page_owner_rule() {
    let site = site();
    let alice = sign_up(&site, "alice").await;
    let bob = sign_up(&site, "bob").await;
    let post_id = write_post(&site, &alice, "Topic").await;
    post_form(&site, &format!("/{post_id}/"), "body=mine", Some(&bob)).await;

    let comment_id = site.repo.comments_for_post(post_id).await.unwrap()[0].id;

    // Post owner is not the comment owner.
    let denied = post_form(&site, &format!("/{comment_id}/comment"), "", Some(&alice)).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let confirm = get(&site, &format!("/{comment_id}/comment"), Some(&bob)).await;
    assert_eq!(confirm.status, StatusCode::OK);
    assert!(confirm.body.contains("Delete this comment?"));

    let deleted = post_form(&site, &format!("/{comment_id}/comment"), "", Some(&bob)).await;
    assert_eq!(deleted.status, StatusCode::SEE_OTHER);
    assert_eq!(deleted.location(), "/");
    assert!(site.repo.get_comment(comment_id).await.unwrap().is_none());

    let missing = get(&site, "/999999/comment", Some(&bob)).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_and_delete_pages() {
    let site = site();
    let alice = sign_up(&site, "alice").await;
    let bob = sign_up(&site, "bob").await;
    let id = write_post(&site, &alice, "Draft").await;

    let denied = get(&site, &format!("/{id}/update"), Some(&bob)).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let form = get(&site, &format!("/{id}/update"), Some(&alice)).await;
    assert_eq!(form.status, StatusCode::OK);
    assert!(form.body.contains("Draft"));

    let updated = post_form(&site, &format!("/{id}/update"), "title=Final&body=Done", Some(&alice)).await;
    assert_eq!(updated.status, StatusCode::SEE_OTHER);
    assert_eq!(updated.location(), format!("/edit?id={id}"));
    let post = site.repo.get_post(id).await.unwrap().unwrap();
    assert_eq!(post.title, "Final");

    let confirm = get(&site, &format!("/{id}/delete"), Some(&alice)).await;
    assert_eq!(confirm.status, StatusCode::OK);

    let deleted = post_form(&site, &format!("/{id}/delete"), "", Some(&alice)).await;
    assert_eq!(deleted.status, StatusCode::SEE_OTHER);
    assert_eq!(deleted.location(), "/edit");
    assert!(site.repo.get_post(id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_editor_requires_login() {
    let site = site();
    let reply = get(&site, "/edit", None).await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(reply.location(), "/login");
}

#[tokio::test]
async fn test_incomplete_or_blank_post_form_rerenders_editor() {
    let site = site();
    let cookie = sign_up(&site, "alice").await;

    let missing_body = post_form(&site, "/edit", "title=Hello", Some(&cookie)).await;
    assert_eq!(missing_body.status, StatusCode::BAD_REQUEST);
    assert!(missing_body.headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/html"));

    let blank = post_form(&site, "/edit", "title=+++&body=%20", Some(&cookie)).await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);

    let (_, count) = site.repo.list_posts(blog_portal::models::Page::all()).await.unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_unreadable_query_renders_error_page() {
    let site = site();
    let reply = get(&site, "/?page=abc", None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/html"));
}
