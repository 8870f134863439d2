use axum::{
    Extension, Form, Json, Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::Multipart;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{
    application::{
        auth::AdminSession,
        composer::ComposeInput,
        error::{ErrorReport, HttpError},
        pages::post_path,
    },
    domain::{entities::ContentRecord, locale::Locale, posts::append_image_reference},
    presentation::{
        admin::{
            AdminChrome, AdminPostRow, ComposerTemplate, ComposerView, DashboardTemplate,
            DashboardView, LanguageOption, PublishResultTemplate, PublishResultView,
        },
        views::render_template_response,
    },
};

use super::{AdminState, RouterState};

const SOURCE_BASE: &str = "infra::http::admin";

/// Multipart framing and the optional `body` field on top of the image itself.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

pub(super) fn routes(max_upload_bytes: u64) -> Router<RouterState> {
    let body_limit = usize::try_from(max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/admin", get(dashboard))
        .route("/admin/write", get(write))
        .route("/admin/posts", post(publish))
        .route(
            "/admin/uploads",
            post(upload_image).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/admin/uploads/discard", post(discard_uploads))
}

fn chrome(state: &AdminState, session: &AdminSession) -> AdminChrome {
    AdminChrome {
        site_title: state.site_title.clone(),
        user_email: session
            .user
            .email
            .clone()
            .unwrap_or_else(|| session.user.id.clone()),
    }
}

async fn dashboard(
    State(state): State<AdminState>,
    Extension(session): Extension<AdminSession>,
) -> Response {
    let mut records: Vec<ContentRecord> = Vec::new();
    for locale in Locale::ALL {
        match state.content.list_posts(locale).await {
            Ok(mut posts) => records.append(&mut posts),
            Err(err) => return HttpError::from(err).into_response(),
        }
    }
    records.sort_by(|a, b| b.published_at.cmp(&a.published_at));

    let posts = records
        .iter()
        .map(|record| AdminPostRow {
            title: record.title.clone(),
            href: post_path(record.locale.code(), &record.slug),
            locale: record.locale.code(),
            published: record.locale.format_date(record.published_at),
        })
        .collect();

    let view = DashboardView {
        chrome: chrome(&state, &session),
        user_id: session.user.id.clone(),
        posts,
        deploy_configured: state.deploy.is_configured(),
    };
    render_template_response(DashboardTemplate { view }, StatusCode::OK)
}

async fn write(
    State(state): State<AdminState>,
    Extension(session): Extension<AdminSession>,
) -> Response {
    let view = ComposerView {
        chrome: chrome(&state, &session),
        languages: LanguageOption::all(None),
        title: String::new(),
        body: String::new(),
        tags: String::new(),
        error: None,
    };
    render_template_response(ComposerTemplate { view }, StatusCode::OK)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PublishForm {
    title: String,
    body: String,
    tags: String,
    language: String,
}

async fn publish(
    State(state): State<AdminState>,
    Extension(session): Extension<AdminSession>,
    Form(form): Form<PublishForm>,
) -> Response {
    let input = ComposeInput {
        title: form.title.clone(),
        body: form.body.clone(),
        tags: form.tags.clone(),
        language: form.language.clone(),
    };

    match state.composer.publish(input, Some(&session.user)).await {
        Ok(outcome) => {
            info!(
                target = "folio::http::admin",
                slug = %outcome.record.slug,
                locale = outcome.record.locale.code(),
                degraded = outcome.is_degraded(),
                "post published"
            );
            let view = PublishResultView {
                chrome: chrome(&state, &session),
                degraded: outcome.is_degraded(),
                message: outcome.message(),
                post_href: post_path(outcome.record.locale.code(), &outcome.record.slug),
                post_title: outcome.record.title.clone(),
            };
            render_template_response(PublishResultTemplate { view }, StatusCode::OK)
        }
        Err(err) => {
            let status = err.status();
            let view = ComposerView {
                chrome: chrome(&state, &session),
                languages: LanguageOption::all(Locale::parse(form.language.trim())),
                title: form.title,
                body: form.body,
                tags: form.tags,
                error: Some(err.user_message()),
            };
            let mut response = render_template_response(ComposerTemplate { view }, status);
            ErrorReport::from_error("infra::http::admin::publish", status, &err)
                .attach(&mut response);
            response
        }
    }
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    path: String,
    url: String,
    markdown: String,
    body: String,
}

struct ImagePart {
    file_name: String,
    content_type: String,
    data: Bytes,
}

async fn upload_image(
    State(state): State<AdminState>,
    Extension(session): Extension<AdminSession>,
    mut multipart: Multipart,
) -> Response {
    const SOURCE: &str = "infra::http::admin::upload_image";

    let mut image: Option<ImagePart> = None;
    let mut body = String::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                let status = err.status();
                error!(
                    target = SOURCE_BASE,
                    status = status.as_u16(),
                    error = %err,
                    "failed to read multipart payload"
                );
                let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
                    "Uploaded file is too large"
                } else {
                    "Invalid upload form"
                };
                return HttpError::from_error(SOURCE, status, message, &err)
                    .json()
                    .into_response();
            }
        };

        match field.name() {
            Some("file") => {
                let file_name = field
                    .file_name()
                    .map(|value| value.to_string())
                    .filter(|value| !value.trim().is_empty())
                    .unwrap_or_else(|| "image".to_string());
                let content_type = field
                    .content_type()
                    .map(|mime| mime.to_string())
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let data = match field.bytes().await {
                    Ok(data) => data,
                    Err(err) => {
                        return HttpError::from_error(
                            SOURCE,
                            err.status(),
                            "Invalid upload form",
                            &err,
                        )
                        .json()
                        .into_response();
                    }
                };
                image = Some(ImagePart {
                    file_name,
                    content_type,
                    data,
                });
            }
            Some("body") => match field.text().await {
                Ok(text) => body = text,
                Err(err) => {
                    return HttpError::from_error(
                        SOURCE,
                        err.status(),
                        "Invalid upload form",
                        &err,
                    )
                    .json()
                    .into_response();
                }
            },
            _ => continue,
        }
    }

    let Some(image) = image else {
        return HttpError::new(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "No file was provided",
            "multipart payload had no `file` field",
        )
        .json()
        .into_response();
    };

    let uploaded_by = session
        .user
        .email
        .clone()
        .or_else(|| Some(session.user.id.clone()));
    match state
        .uploads
        .upload_image(&image.file_name, &image.content_type, image.data, uploaded_by)
        .await
    {
        Ok(uploaded) => Json(UploadResponse {
            body: append_image_reference(&body, &uploaded.url),
            path: uploaded.path,
            url: uploaded.url,
            markdown: uploaded.markdown,
        })
        .into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DiscardRequest {
    paths: Vec<String>,
}

async fn discard_uploads(
    State(state): State<AdminState>,
    Json(request): Json<DiscardRequest>,
) -> StatusCode {
    let summary = state.uploads.discard(&request.paths).await;
    info!(
        target = "folio::http::admin",
        removed = summary.removed,
        failed = summary.failed,
        "discarded draft uploads"
    );
    StatusCode::NO_CONTENT
}
