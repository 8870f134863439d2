use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use bytes::Bytes;
use futures::TryStreamExt;
use tracing::error;

use crate::{
    application::{error::HttpError, pages::post_path},
    domain::locale::Locale,
    presentation::views::{
        ErrorPageView, ErrorTemplate, IndexTemplate, LayoutChrome, LayoutContext, PostTemplate,
        render_not_found_response, render_template_response,
    },
};

use super::{HttpState, RouterState, db_health_response};

pub(super) fn routes() -> Router<RouterState> {
    Router::new()
        .route("/", get(root))
        .route("/{locale}", get(locale_index))
        .route("/{locale}/posts/{slug}", get(post_detail))
        .route("/{locale}/posts/{slug}/markdown", get(post_markdown))
        .route("/posts/{slug}", get(legacy_post))
        .route("/api/paths", get(static_paths))
        .route("/_health/db", get(public_health))
        .route("/uploads/{bucket}/{*path}", get(serve_upload))
}

async fn root() -> Redirect {
    Redirect::temporary(&format!("/{}", Locale::DEFAULT.code()))
}

/// Posts published before per-locale URLs existed live under the default locale.
async fn legacy_post(Path(slug): Path<String>) -> Redirect {
    Redirect::permanent(&post_path(Locale::DEFAULT.code(), &slug))
}

async fn locale_index(State(state): State<HttpState>, Path(code): Path<String>) -> Response {
    let Some(locale) = Locale::parse(&code) else {
        return not_found(&state, Locale::DEFAULT, &format!("/{code}"));
    };
    let path = format!("/{}", locale.code());
    let chrome = state.pages.chrome(locale, &path);

    match state.pages.index_view(locale).await {
        Ok(content) => render_template_response(
            IndexTemplate {
                view: LayoutContext::new(chrome, content),
            },
            StatusCode::OK,
        ),
        Err(err) => unavailable(chrome, err),
    }
}

async fn post_detail(
    State(state): State<HttpState>,
    Path((code, slug)): Path<(String, String)>,
) -> Response {
    let Some(locale) = Locale::parse(&code) else {
        return not_found(&state, Locale::DEFAULT, &post_path(&code, &slug));
    };
    let path = post_path(locale.code(), &slug);
    let chrome = state.pages.chrome(locale, &path);

    match state.pages.post_view(&slug, locale).await {
        Ok(Some(content)) => {
            let chrome = chrome.with_page_title(&content.title);
            let chrome = if content.description.is_empty() {
                chrome
            } else {
                chrome.with_description(&content.description)
            };
            render_template_response(
                PostTemplate {
                    view: LayoutContext::new(chrome, content),
                },
                StatusCode::OK,
            )
        }
        Ok(None) => render_not_found_response(chrome),
        Err(err) => unavailable(chrome, err),
    }
}

async fn post_markdown(
    State(state): State<HttpState>,
    Path((code, slug)): Path<(String, String)>,
) -> Response {
    const SOURCE: &str = "infra::http::public::post_markdown";

    let not_found = || {
        HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Article not found",
            format!("no `{code}` translation for `{slug}`"),
        )
        .into_response()
    };

    let Some(locale) = Locale::parse(&code) else {
        return not_found();
    };
    let record = match state.pages.content().get_post(&slug, locale).await {
        Ok(Some(record)) => record,
        Ok(None) => return not_found(),
        Err(err) => return HttpError::from(err).into_response(),
    };

    match state.pages.markdown().get_markdown(&record.markdown_path).await {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/markdown; charset=utf-8")
            .body(Body::from(body))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn static_paths(State(state): State<HttpState>) -> Response {
    match state
        .pages
        .content()
        .all_slug_locale_pairs()
        .try_collect::<Vec<_>>()
        .await
    {
        Ok(paths) => Json(paths).into_response(),
        Err(err) => HttpError::from(err).json().into_response(),
    }
}

async fn public_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.check().await)
}

async fn serve_upload(
    State(state): State<HttpState>,
    Path((bucket, path)): Path<(String, String)>,
) -> Response {
    const SOURCE: &str = "infra::http::public::serve_upload";

    let missing = || {
        HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Upload not found",
            "The requested upload is not available",
        )
        .into_response()
    };

    let Some(served) = state.uploads.as_ref().filter(|served| served.bucket == bucket) else {
        return missing();
    };

    match served.store.get(&bucket, &path).await {
        Ok(bytes) => build_upload_response(&path, bytes),
        Err(err) if err.is_missing() => missing(),
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored upload"
            );
            HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read uploaded file",
                &err,
            )
            .into_response()
        }
    }
}

pub(super) async fn fallback(State(state): State<HttpState>, uri: axum::http::Uri) -> Response {
    not_found(&state, Locale::DEFAULT, uri.path())
}

fn not_found(state: &HttpState, locale: Locale, path: &str) -> Response {
    render_not_found_response(state.pages.chrome(locale, path))
}

/// Error page for backend failures; the diagnostic stays attached for the log middleware.
fn unavailable(chrome: LayoutChrome, err: HttpError) -> Response {
    let status = err.status();
    let content = ErrorPageView::unavailable(&chrome, err.public_message());
    let mut response = render_template_response(
        ErrorTemplate {
            view: LayoutContext::new(chrome, content),
        },
        status,
    );
    err.into_report().attach(&mut response);
    response
}

fn build_upload_response(path: &str, bytes: Bytes) -> Response {
    let len = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}
