use std::collections::HashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, StatusCode, header},
};
use bytes::Bytes;
use futures::{StreamExt, stream::BoxStream};
use time::{OffsetDateTime, macros::datetime};
use tower::ServiceExt;
use uuid::Uuid;

use folio::application::auth::{
    AdminUser, AuthService, AuthTokens, IdentityError, IdentityProvider,
};
use folio::application::composer::PostComposer;
use folio::application::content::ContentService;
use folio::application::deploy::{DeployError, DeployHook, DeployReceipt, DeployService};
use folio::application::markdown::MarkdownService;
use folio::application::pages::{SiteInfo, SitePages};
use folio::application::repos::{
    ContentRepo, ContentWriteRepo, CreatePostParams, RecordUploadParams, RepoError, UploadsRepo,
};
use folio::application::storage::{ObjectStore, StorageError};
use folio::application::uploads::UploadService;
use folio::domain::entities::{ContentRecord, PendingUploadRecord, SlugLocale};
use folio::domain::locale::Locale;
use folio::infra::http::{
    AdminState, AuthState, HealthCheck, HttpState, RouterState, build_router,
};

const WEBHOOK_SECRET: &str = "hook-secret";

#[derive(Default)]
struct MemoryContent {
    rows: Mutex<Vec<ContentRecord>>,
}

impl MemoryContent {
    fn with_post(self, slug: &str, locale: Locale, title: &str, published_at: OffsetDateTime) -> Self {
        self.rows.lock().expect("lock").push(ContentRecord {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            locale,
            title: title.to_string(),
            description: format!("{title} description"),
            markdown_path: format!("{slug}/{}.md", locale.code()),
            tags: vec!["notes".to_string()],
            author: Some("author@example.com".to_string()),
            published_at,
            created_at: published_at,
            updated_at: published_at,
        });
        self
    }

    fn slugs(&self) -> Vec<String> {
        self.rows
            .lock()
            .expect("lock")
            .iter()
            .map(|row| row.slug.clone())
            .collect()
    }
}

#[async_trait]
impl ContentRepo for MemoryContent {
    async fn list_posts(&self, locale: Locale) -> Result<Vec<ContentRecord>, RepoError> {
        let mut rows: Vec<ContentRecord> = self
            .rows
            .lock()
            .expect("lock")
            .iter()
            .filter(|row| row.locale == locale)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok(rows)
    }

    async fn find_post(&self, slug: &str, locale: Locale) -> Result<ContentRecord, RepoError> {
        self.rows
            .lock()
            .expect("lock")
            .iter()
            .find(|row| row.slug == slug && row.locale == locale)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn list_locale_codes(&self, slug: &str) -> Result<Vec<String>, RepoError> {
        Ok(self
            .rows
            .lock()
            .expect("lock")
            .iter()
            .filter(|row| row.slug == slug)
            .map(|row| row.locale.code().to_string())
            .collect())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError> {
        Ok(self.rows.lock().expect("lock").iter().any(|row| row.slug == slug))
    }

    fn stream_slug_locales(&self) -> BoxStream<'_, Result<SlugLocale, RepoError>> {
        let pairs: Vec<Result<SlugLocale, RepoError>> = self
            .rows
            .lock()
            .expect("lock")
            .iter()
            .map(|row| {
                Ok(SlugLocale {
                    slug: row.slug.clone(),
                    locale: row.locale,
                })
            })
            .collect();
        futures::stream::iter(pairs).boxed()
    }
}

#[async_trait]
impl ContentWriteRepo for MemoryContent {
    async fn create_post(&self, params: CreatePostParams) -> Result<ContentRecord, RepoError> {
        let mut rows = self.rows.lock().expect("lock");
        if rows.iter().any(|row| row.slug == params.slug) {
            return Err(RepoError::Duplicate {
                constraint: "posts_slug_key".to_string(),
            });
        }
        let record = ContentRecord {
            id: Uuid::new_v4(),
            slug: params.slug,
            locale: params.locale,
            title: params.title,
            description: params.description,
            markdown_path: params.markdown_path,
            tags: params.tags,
            author: params.author,
            published_at: params.published_at,
            created_at: params.published_at,
            updated_at: params.published_at,
        };
        rows.push(record.clone());
        Ok(record)
    }
}

#[derive(Default)]
struct MemoryUploads {
    rows: Mutex<Vec<PendingUploadRecord>>,
}

#[async_trait]
impl UploadsRepo for MemoryUploads {
    async fn record_pending(&self, params: RecordUploadParams) -> Result<(), RepoError> {
        self.rows.lock().expect("lock").push(PendingUploadRecord {
            path: params.path,
            public_url: params.public_url,
            uploaded_by: params.uploaded_by,
            created_at: OffsetDateTime::now_utc(),
            claimed_at: None,
        });
        Ok(())
    }

    async fn claim_referenced(&self, body: &str) -> Result<u64, RepoError> {
        let mut claimed = 0;
        for row in self.rows.lock().expect("lock").iter_mut() {
            if row.claimed_at.is_none() && body.contains(&row.public_url) {
                row.claimed_at = Some(OffsetDateTime::now_utc());
                claimed += 1;
            }
        }
        Ok(claimed)
    }

    async fn release_unclaimed(
        &self,
        paths: &[String],
    ) -> Result<Vec<PendingUploadRecord>, RepoError> {
        let mut rows = self.rows.lock().expect("lock");
        let (released, kept): (Vec<_>, Vec<_>) = rows
            .drain(..)
            .partition(|row| row.claimed_at.is_none() && paths.contains(&row.path));
        *rows = kept;
        Ok(released)
    }

    async fn restore_pending(&self, record: &PendingUploadRecord) -> Result<(), RepoError> {
        let mut rows = self.rows.lock().expect("lock");
        if !rows.iter().any(|row| row.path == record.path) {
            rows.push(record.clone());
        }
        Ok(())
    }

    async fn list_unclaimed_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<Vec<PendingUploadRecord>, RepoError> {
        Ok(self
            .rows
            .lock()
            .expect("lock")
            .iter()
            .filter(|row| row.claimed_at.is_none() && row.created_at < cutoff)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct MemoryStore {
    objects: Mutex<HashMap<(String, String), Bytes>>,
}

impl MemoryStore {
    fn insert(&self, bucket: &str, path: &str, body: &str) {
        self.objects.lock().expect("lock").insert(
            (bucket.to_string(), path.to_string()),
            Bytes::from(body.to_string()),
        );
    }

    fn contains(&self, bucket: &str, path: &str) -> bool {
        self.objects
            .lock()
            .expect("lock")
            .contains_key(&(bucket.to_string(), path.to_string()))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, bucket: &str, path: &str) -> Result<Bytes, StorageError> {
        self.objects
            .lock()
            .expect("lock")
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::Missing {
                bucket: bucket.to_string(),
                path: path.to_string(),
            })
    }

    async fn put(
        &self,
        bucket: &str,
        path: &str,
        _content_type: &str,
        data: Bytes,
    ) -> Result<(), StorageError> {
        let mut objects = self.objects.lock().expect("lock");
        let key = (bucket.to_string(), path.to_string());
        if objects.contains_key(&key) {
            return Err(StorageError::Conflict {
                bucket: bucket.to_string(),
                path: path.to_string(),
            });
        }
        objects.insert(key, data);
        Ok(())
    }

    async fn delete(&self, bucket: &str, path: &str) -> Result<(), StorageError> {
        self.objects
            .lock()
            .expect("lock")
            .remove(&(bucket.to_string(), path.to_string()));
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("https://cdn.test/{bucket}/{path}")
    }
}

/// Accepts the access token `good-token` and the authorization code `good-code`.
struct FakeIdentity;

fn author() -> AdminUser {
    AdminUser {
        id: "user-1".to_string(),
        email: Some("author@example.com".to_string()),
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    fn authorize_url(
        &self,
        provider: &str,
        _redirect_to: &str,
        code_challenge: &str,
    ) -> Result<String, IdentityError> {
        Ok(format!(
            "https://idp.test/authorize?provider={provider}&code_challenge={code_challenge}"
        ))
    }

    async fn exchange_code(
        &self,
        auth_code: &str,
        _code_verifier: &str,
    ) -> Result<AuthTokens, IdentityError> {
        if auth_code == "good-code" {
            Ok(AuthTokens {
                access_token: "good-token".to_string(),
                refresh_token: Some("good-refresh".to_string()),
                expires_in: Some(3600),
                user: Some(author()),
            })
        } else {
            Err(IdentityError::Rejected {
                status: 400,
                body: "invalid grant".to_string(),
            })
        }
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<AuthTokens, IdentityError> {
        Err(IdentityError::Unauthorized)
    }

    async fn get_user(&self, access_token: &str) -> Result<AdminUser, IdentityError> {
        if access_token == "good-token" {
            Ok(author())
        } else {
            Err(IdentityError::Unauthorized)
        }
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), IdentityError> {
        Ok(())
    }
}

#[derive(Default)]
struct CountingHook {
    calls: AtomicUsize,
}

#[async_trait]
impl DeployHook for CountingHook {
    async fn trigger(&self) -> Result<DeployReceipt, DeployError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(DeployReceipt {
            job_id: Some("job-42".to_string()),
        })
    }
}

struct Healthy;

#[async_trait]
impl HealthCheck for Healthy {
    async fn check(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

struct Fixture {
    content: Arc<MemoryContent>,
    uploads: Arc<MemoryUploads>,
    store: Arc<MemoryStore>,
    hook: Arc<CountingHook>,
}

impl Fixture {
    fn seeded() -> Self {
        let content = MemoryContent::default()
            .with_post("hello", Locale::En, "Hello", datetime!(2024-01-01 00:00 UTC))
            .with_post("hello", Locale::ZhTw, "你好", datetime!(2024-01-01 00:00 UTC))
            .with_post("solo", Locale::En, "Solo", datetime!(2024-02-01 00:00 UTC));
        let store = MemoryStore::default();
        store.insert("posts", "hello/en.md", "# Hello\n\nSome **bold** words.");
        store.insert("posts", "hello/zh-TW.md", "你好，世界");
        store.insert("posts", "solo/en.md", "Only in English.");

        Self {
            content: Arc::new(content),
            uploads: Arc::new(MemoryUploads::default()),
            store: Arc::new(store),
            hook: Arc::new(CountingHook::default()),
        }
    }

    fn router(&self, with_hook: bool) -> Router {
        let store: Arc<dyn ObjectStore> = self.store.clone();
        let content = ContentService::new(self.content.clone());
        let pages = SitePages::new(
            content.clone(),
            MarkdownService::new(store.clone(), "posts"),
            SiteInfo {
                title: "Folio".to_string(),
                description: "Notes in two languages".to_string(),
                public_url: "https://blog.test".to_string(),
            },
        );
        let hook: Option<Arc<dyn DeployHook>> = if with_hook {
            Some(self.hook.clone())
        } else {
            None
        };
        let deploy = DeployService::new(hook, Some(WEBHOOK_SECRET.to_string()));
        let uploads = UploadService::new(store.clone(), self.uploads.clone(), "images", 1024 * 1024);
        let composer = PostComposer::new(
            self.content.clone(),
            self.content.clone(),
            self.uploads.clone(),
            store,
            "posts",
            deploy.clone(),
        );

        build_router(RouterState {
            http: HttpState {
                pages,
                health: Arc::new(Healthy),
                uploads: None,
            },
            auth: AuthState {
                service: AuthService::new(Arc::new(FakeIdentity), "google", "https://blog.test"),
                cookie_secure: false,
            },
            admin: AdminState {
                site_title: "Folio".to_string(),
                content,
                composer,
                uploads,
                deploy,
                max_upload_bytes: 1024 * 1024,
            },
        })
    }
}

async fn send(router: Router, request: Request<Body>) -> Response<Body> {
    router.oneshot(request).await.expect("router response")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn signed_in(builder: axum::http::request::Builder) -> axum::http::request::Builder {
    builder.header(header::COOKIE, "folio_access_token=good-token")
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn root_redirects_to_default_locale() {
    let response = send(Fixture::seeded().router(true), get("/")).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/zh-TW");
}

#[tokio::test]
async fn legacy_post_url_redirects_into_default_locale() {
    let response = send(Fixture::seeded().router(true), get("/posts/hello")).await;
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(location(&response), "/zh-TW/posts/hello");
}

#[tokio::test]
async fn locale_index_lists_only_that_locale() {
    let response = send(Fixture::seeded().router(true), get("/zh-TW")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("你好"), "{html}");
    assert!(!html.contains("Solo"), "{html}");
    assert!(html.contains("lang=\"zh-TW\""), "{html}");
}

#[tokio::test]
async fn english_index_is_newest_first() {
    let html = body_text(send(Fixture::seeded().router(true), get("/en")).await).await;
    let solo = html.find("Solo").expect("solo listed");
    let hello = html.find("Hello").expect("hello listed");
    assert!(solo < hello, "{html}");
}

#[tokio::test]
async fn unknown_locale_is_not_found() {
    let response = send(Fixture::seeded().router(true), get("/fr")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn post_page_renders_markdown_and_switcher() {
    let response = send(Fixture::seeded().router(true), get("/en/posts/hello")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("<strong>bold</strong>"), "{html}");
    assert!(html.contains("/zh-TW/posts/hello"), "{html}");
    assert!(html.contains("Jan 01, 2024"), "{html}");
}

#[tokio::test]
async fn post_in_other_locale_only_is_not_found() {
    let response = send(Fixture::seeded().router(true), get("/zh-TW/posts/solo")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn raw_markdown_is_served_as_text() {
    let response = send(Fixture::seeded().router(true), get("/en/posts/solo/markdown")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/markdown"), "{content_type}");
    assert_eq!(body_text(response).await, "Only in English.");
}

#[tokio::test]
async fn static_paths_lists_every_pair() {
    let response = send(Fixture::seeded().router(true), get("/api/paths")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let paths: Vec<serde_json::Value> =
        serde_json::from_str(&body_text(response).await).expect("json");
    assert_eq!(paths.len(), 3);
    assert!(paths.contains(&serde_json::json!({ "slug": "hello", "locale": "zh-TW" })));
}

#[tokio::test]
async fn health_endpoint_reports_no_content() {
    let response = send(Fixture::seeded().router(true), get("/_health/db")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn admin_requires_session() {
    let response = send(Fixture::seeded().router(true), get("/admin/write")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/login?redirect=%2Fadmin%2Fwrite");
}

#[tokio::test]
async fn unknown_admin_path_requires_session() {
    let response = send(Fixture::seeded().router(true), get("/admin/drafts?page=2")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        "/auth/login?redirect=%2Fadmin%2Fdrafts%3Fpage%3D2"
    );

    let response = send(Fixture::seeded().router(true), get("/admin/posts/hello")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/login?redirect=%2Fadmin%2Fposts%2Fhello");
}

#[tokio::test]
async fn unknown_admin_path_with_session_is_not_found() {
    let request = signed_in(Request::builder().uri("/admin/drafts"))
        .body(Body::empty())
        .expect("request");
    let response = send(Fixture::seeded().router(true), request).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn public_pages_ignore_stale_session_cookies() {
    let request = Request::builder()
        .uri("/en")
        .header(header::COOKIE, "folio_access_token=expired")
        .body(Body::empty())
        .expect("request");
    let response = send(Fixture::seeded().router(true), request).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn dashboard_shows_signed_in_author() {
    let request = signed_in(Request::builder().uri("/admin"))
        .body(Body::empty())
        .expect("request");
    let response = send(Fixture::seeded().router(true), request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("author@example.com"), "{html}");
    assert!(html.contains("/en/posts/solo"), "{html}");
}

#[tokio::test]
async fn publishing_stores_post_and_triggers_deploy() {
    let fixture = Fixture::seeded();
    let request = signed_in(
        Request::builder()
            .method("POST")
            .uri("/admin/posts")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded"),
    )
    .body(Body::from(
        "title=Hello+Again&body=Fresh+words.&tags=rust%2C+notes&language=en",
    ))
    .expect("request");

    let response = send(fixture.router(true), request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Article published successfully!"), "{html}");
    assert!(html.contains("/en/posts/hello-again"), "{html}");

    assert!(fixture.content.slugs().contains(&"hello-again".to_string()));
    assert!(fixture.store.contains("posts", "hello-again/en.md"));
    assert_eq!(fixture.hook.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn publishing_colliding_title_gets_fresh_slug() {
    let fixture = Fixture::seeded();
    let request = signed_in(
        Request::builder()
            .method("POST")
            .uri("/admin/posts")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded"),
    )
    .body(Body::from("title=Hello&body=Again.&tags=&language=en"))
    .expect("request");

    let response = send(fixture.router(true), request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let slugs = fixture.content.slugs();
    let fresh: Vec<&String> = slugs
        .iter()
        .filter(|slug| slug.starts_with("hello-"))
        .collect();
    assert_eq!(fresh.len(), 1, "{slugs:?}");

    let original = body_text(send(fixture.router(true), get("/en/posts/hello")).await).await;
    assert!(original.contains("<strong>bold</strong>"), "{original}");
}

#[tokio::test]
async fn publishing_without_title_refills_form() {
    let request = signed_in(
        Request::builder()
            .method("POST")
            .uri("/admin/posts")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded"),
    )
    .body(Body::from("title=&body=Draft+body&tags=&language=en"))
    .expect("request");

    let response = send(Fixture::seeded().router(true), request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let html = body_text(response).await;
    assert!(html.contains("Title is required"), "{html}");
    assert!(html.contains("Draft body"), "{html}");
}

#[tokio::test]
async fn image_upload_returns_markdown_and_updated_body() {
    let fixture = Fixture::seeded();
    let boundary = "folio-test-boundary";
    let payload = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"body\"\r\n\r\n\
         Intro\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"cat.png\"\r\n\
         Content-Type: image/png\r\n\r\n\
         PNGDATA\r\n\
         --{boundary}--\r\n"
    );
    let request = signed_in(
        Request::builder()
            .method("POST")
            .uri("/admin/uploads")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            ),
    )
    .body(Body::from(payload))
    .expect("request");

    let response = send(fixture.router(true), request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value =
        serde_json::from_str(&body_text(response).await).expect("json");

    let path = json["path"].as_str().expect("path");
    assert!(path.ends_with(".png"), "{path}");
    assert!(fixture.store.contains("images", path));
    let url = format!("https://cdn.test/images/{path}");
    assert_eq!(json["url"], url.as_str());
    assert_eq!(json["markdown"], format!("![image]({url})").as_str());
    assert_eq!(json["body"], format!("Intro\n![image]({url})").as_str());
}

#[tokio::test]
async fn non_image_upload_is_rejected() {
    let boundary = "folio-test-boundary";
    let payload = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"notes.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         hello\r\n\
         --{boundary}--\r\n"
    );
    let request = signed_in(
        Request::builder()
            .method("POST")
            .uri("/admin/uploads")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            ),
    )
    .body(Body::from(payload))
    .expect("request");

    let response = send(Fixture::seeded().router(true), request).await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn discarding_uploads_removes_unclaimed_objects() {
    let fixture = Fixture::seeded();
    fixture.store.insert("images", "1-abc.png", "png");
    fixture.uploads.rows.lock().expect("lock").push(PendingUploadRecord {
        path: "1-abc.png".to_string(),
        public_url: "https://cdn.test/images/1-abc.png".to_string(),
        uploaded_by: None,
        created_at: OffsetDateTime::now_utc(),
        claimed_at: None,
    });

    let request = signed_in(
        Request::builder()
            .method("POST")
            .uri("/admin/uploads/discard")
            .header(header::CONTENT_TYPE, "application/json"),
    )
    .body(Body::from(r#"{"paths":["1-abc.png"]}"#))
    .expect("request");

    let response = send(fixture.router(true), request).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!fixture.store.contains("images", "1-abc.png"));
}

#[tokio::test]
async fn webhook_rejects_anonymous_callers() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/webhooks/deploy")
        .body(Body::empty())
        .expect("request");
    let response = send(Fixture::seeded().router(true), request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_accepts_bearer_secret() {
    let fixture = Fixture::seeded();
    let request = Request::builder()
        .method("POST")
        .uri("/api/webhooks/deploy")
        .header(header::AUTHORIZATION, format!("Bearer {WEBHOOK_SECRET}"))
        .body(Body::empty())
        .expect("request");

    let response = send(fixture.router(true), request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value =
        serde_json::from_str(&body_text(response).await).expect("json");
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "Deploy triggered");
    assert_eq!(json["job_id"], "job-42");
    assert_eq!(fixture.hook.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn webhook_without_hook_is_server_error() {
    let request = signed_in(Request::builder().method("POST").uri("/api/webhooks/deploy"))
        .body(Body::empty())
        .expect("request");
    let response = send(Fixture::seeded().router(false), request).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json: serde_json::Value =
        serde_json::from_str(&body_text(response).await).expect("json");
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn login_sets_verifier_and_redirects_to_provider() {
    let response = send(
        Fixture::seeded().router(true),
        get("/auth/login?provider=github&redirect=%2Fadmin%2Fwrite"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("https://idp.test/authorize?provider=github"));
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    assert!(cookie.starts_with("folio_pkce_verifier="), "{cookie}");
    assert!(cookie.contains("HttpOnly"), "{cookie}");
}

#[tokio::test]
async fn callback_sets_session_and_redirects_to_target() {
    let request = Request::builder()
        .uri("/auth/callback?code=good-code&redirect=%2Fadmin%2Fwrite")
        .header(header::COOKIE, "folio_pkce_verifier=verifier")
        .body(Body::empty())
        .expect("request");
    let response = send(Fixture::seeded().router(true), request).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/admin/write");
    let cookies: Vec<&str> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    assert!(
        cookies
            .iter()
            .any(|cookie| cookie.starts_with("folio_access_token=good-token")),
        "{cookies:?}"
    );
}

#[tokio::test]
async fn callback_with_external_redirect_falls_back_to_admin() {
    let request = Request::builder()
        .uri("/auth/callback?code=good-code&redirect=%2F%2Fevil.example")
        .header(header::COOKIE, "folio_pkce_verifier=verifier")
        .body(Body::empty())
        .expect("request");
    let response = send(Fixture::seeded().router(true), request).await;
    assert_eq!(location(&response), "/admin");
}

#[tokio::test]
async fn failed_callback_goes_to_error_page() {
    let request = Request::builder()
        .uri("/auth/callback?code=bad-code")
        .header(header::COOKIE, "folio_pkce_verifier=verifier")
        .body(Body::empty())
        .expect("request");
    let response = send(Fixture::seeded().router(true), request).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/error");
}
