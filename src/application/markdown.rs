//! Markdown retrieval from object storage and GFM rendering.

use std::collections::HashSet;
use std::sync::Arc;

use ammonia::Builder as AmmoniaBuilder;
use axum::http::StatusCode;
use comrak::{markdown_to_html, options::Options};
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::application::error::HttpError;
use crate::application::storage::{ObjectStore, StorageError};

#[derive(Debug, Error)]
pub enum MarkdownError {
    #[error("markdown object `{path}` is missing")]
    Missing {
        path: String,
        #[source]
        source: StorageError,
    },
    #[error("failed to fetch markdown object `{path}`")]
    Fetch {
        path: String,
        #[source]
        source: StorageError,
    },
}

impl From<MarkdownError> for HttpError {
    fn from(err: MarkdownError) -> Self {
        HttpError::from_error(
            "application::markdown",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Article body is unavailable",
            &err,
        )
    }
}

/// Fetches raw markdown bodies. Every call goes to the store; nothing is cached.
#[derive(Clone)]
pub struct MarkdownService {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl MarkdownService {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub async fn get_markdown(&self, path: &str) -> Result<String, MarkdownError> {
        match self.store.get(&self.bucket, path).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(source) if source.is_missing() => Err(MarkdownError::Missing {
                path: path.to_string(),
                source,
            }),
            Err(source) => Err(MarkdownError::Fetch {
                path: path.to_string(),
                source,
            }),
        }
    }
}

static OPTIONS: Lazy<Options<'static>> = Lazy::new(default_options);
static SANITIZER: Lazy<AmmoniaBuilder<'static>> = Lazy::new(build_sanitizer);

/// Render GFM with raw HTML allowed, then sanitize the result.
pub fn render_markdown(markdown: &str) -> String {
    let html = markdown_to_html(markdown, &OPTIONS);
    SANITIZER.clean(&html).to_string()
}

fn default_options() -> Options<'static> {
    let mut options = Options::default();

    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.tagfilter = false;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.footnotes = true;
    ext.cjk_friendly_emphasis = true;

    let render = &mut options.render;
    render.github_pre_lang = true;
    render.tasklist_classes = true;
    render.r#unsafe = true;

    options
}

fn build_sanitizer() -> AmmoniaBuilder<'static> {
    let mut builder = AmmoniaBuilder::default();

    builder.add_tags(["input", "section", "figure", "figcaption", "mark", "details", "summary"]);

    let generic: HashSet<&'static str> = HashSet::from([
        "class",
        "id",
        "title",
        "lang",
        "dir",
        "aria-hidden",
        "aria-label",
        "role",
        "data-footnote-ref",
        "data-footnotes",
        "data-footnote-backref",
    ]);
    builder.generic_attributes(generic);

    builder.add_tag_attributes("img", ["width", "height", "loading"]);
    builder.add_tag_attributes("pre", ["lang"]);
    builder.add_tag_attributes("input", ["type", "checked", "disabled"]);
    builder.add_tag_attributes("th", ["align"]);
    builder.add_tag_attributes("td", ["align"]);

    builder.add_url_schemes(["http", "https", "mailto", "tel"]);

    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::storage::tests::MemoryStore;

    #[tokio::test]
    async fn fetches_markdown_text() {
        let store = MemoryStore::default();
        store.insert("posts", "hello/en.md", "# Hello");
        let service = MarkdownService::new(Arc::new(store), "posts");

        let text = service.get_markdown("hello/en.md").await.expect("markdown");
        assert_eq!(text, "# Hello");
    }

    #[tokio::test]
    async fn missing_object_is_reported_as_missing() {
        let service = MarkdownService::new(Arc::new(MemoryStore::default()), "posts");
        let err = service
            .get_markdown("nope.md")
            .await
            .expect_err("missing object");
        assert!(matches!(err, MarkdownError::Missing { .. }));
    }

    #[test]
    fn renders_gfm_tables_and_strikethrough() {
        let html = render_markdown("| a |\n|---|\n| b |\n\n~~gone~~");
        assert!(html.contains("<table>"), "{html}");
        assert!(html.contains("<del>gone</del>"), "{html}");
    }

    #[test]
    fn raw_html_is_kept_but_scripts_are_removed() {
        let html = render_markdown("<mark>hi</mark>\n\n<script>alert(1)</script>");
        assert!(html.contains("<mark>hi</mark>"), "{html}");
        assert!(!html.contains("<script"), "{html}");
    }
}
