use crate::application::error::{ErrorReport, HttpError};
use crate::domain::locale::{Locale, UiStrings};
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(chrome: LayoutChrome) -> Response {
    let content = ErrorPageView::not_found(&chrome);
    let view = LayoutContext::new(chrome, content);
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

#[derive(Clone)]
pub struct BrandView {
    pub title: String,
    pub href: String,
}

/// Entry of the language switcher.
#[derive(Clone)]
pub struct LocaleLink {
    pub code: &'static str,
    pub label: &'static str,
    pub href: String,
    pub is_current: bool,
}

#[derive(Clone)]
pub struct PageMetaView {
    pub title: String,
    pub description: String,
    pub canonical: String,
}

impl PageMetaView {
    pub fn with_canonical(self, canonical: String) -> Self {
        Self { canonical, ..self }
    }
}

#[derive(Clone)]
pub struct LayoutChrome {
    pub brand: BrandView,
    pub lang: &'static str,
    pub strings: &'static UiStrings,
    pub locales: Vec<LocaleLink>,
    pub meta: PageMetaView,
}

impl LayoutChrome {
    /// Chrome for `locale` with a language switcher pointing at each locale's home.
    pub fn for_locale(site_title: &str, site_description: &str, locale: Locale) -> Self {
        let locales = Locale::ALL
            .iter()
            .map(|candidate| LocaleLink {
                code: candidate.code(),
                label: candidate.display_name(),
                href: format!("/{}", candidate.code()),
                is_current: *candidate == locale,
            })
            .collect();

        Self {
            brand: BrandView {
                title: site_title.to_string(),
                href: format!("/{}", locale.code()),
            },
            lang: locale.code(),
            strings: locale.strings(),
            locales,
            meta: PageMetaView {
                title: site_title.to_string(),
                description: site_description.to_string(),
                canonical: String::new(),
            },
        }
    }

    pub fn with_canonical(self, canonical: String) -> Self {
        Self {
            meta: self.meta.with_canonical(canonical),
            ..self
        }
    }

    pub fn with_description(self, description: &str) -> Self {
        Self {
            meta: PageMetaView {
                description: description.to_string(),
                ..self.meta
            },
            ..self
        }
    }

    pub fn with_page_title(self, title: &str) -> Self {
        let full = format!("{title} · {}", self.brand.title);
        Self {
            meta: PageMetaView {
                title: full,
                ..self.meta
            },
            ..self
        }
    }
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub brand: BrandView,
    pub lang: &'static str,
    pub strings: &'static UiStrings,
    pub locales: Vec<LocaleLink>,
    pub meta: PageMetaView,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, content: T) -> Self {
        Self {
            brand: chrome.brand,
            lang: chrome.lang,
            strings: chrome.strings,
            locales: chrome.locales,
            meta: chrome.meta,
            content,
        }
    }
}

#[derive(Clone)]
pub struct PostCard {
    pub href: String,
    pub title: String,
    pub description: String,
    pub iso_date: String,
    pub published: String,
    pub tags: Vec<String>,
}

pub struct IndexView {
    pub heading: String,
    pub posts: Vec<PostCard>,
    pub has_results: bool,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<IndexView>,
}

pub struct PostView {
    pub title: String,
    pub description: String,
    pub iso_date: String,
    pub published: String,
    pub author: Option<String>,
    pub tags: Vec<String>,
    /// Other translations of the post. Empty when the post exists in one locale only.
    pub translations: Vec<LocaleLink>,
    pub content_html: String,
    pub markdown_href: String,
    pub back_href: String,
}

#[derive(Template)]
#[template(path = "post.html")]
pub struct PostTemplate {
    pub view: LayoutContext<PostView>,
}

pub struct ErrorPageView {
    pub title: String,
    pub message: String,
    pub action_href: String,
    pub action_label: String,
}

impl ErrorPageView {
    pub fn not_found(chrome: &LayoutChrome) -> Self {
        Self {
            title: chrome.strings.not_found.to_string(),
            message: chrome.strings.article_not_found.to_string(),
            action_href: chrome.brand.href.clone(),
            action_label: chrome.strings.back_to_home.to_string(),
        }
    }

    pub fn unavailable(chrome: &LayoutChrome, message: &str) -> Self {
        Self {
            title: "Something went wrong".to_string(),
            message: message.to_string(),
            action_href: chrome.brand.href.clone(),
            action_label: chrome.strings.back_to_home.to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

pub struct AuthErrorView {
    pub message: String,
    pub retry_href: String,
}

#[derive(Template)]
#[template(path = "auth_error.html")]
pub struct AuthErrorTemplate {
    pub view: LayoutContext<AuthErrorView>,
}
