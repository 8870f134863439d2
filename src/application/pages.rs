use axum::http::StatusCode;
use time::format_description::well_known::Rfc3339;

use crate::application::content::ContentService;
use crate::application::error::HttpError;
use crate::application::markdown::{MarkdownService, render_markdown};
use crate::domain::entities::ContentRecord;
use crate::domain::locale::Locale;
use crate::presentation::views::{
    IndexView, LayoutChrome, LocaleLink, PostCard, PostView,
};

const SOURCE: &str = "application::pages::SitePages";

/// Site-wide identity shown in the layout.
#[derive(Debug, Clone)]
pub struct SiteInfo {
    pub title: String,
    pub description: String,
    pub public_url: String,
}

/// Builds the public page views for a locale.
#[derive(Clone)]
pub struct SitePages {
    content: ContentService,
    markdown: MarkdownService,
    site: SiteInfo,
}

impl SitePages {
    pub fn new(content: ContentService, markdown: MarkdownService, site: SiteInfo) -> Self {
        Self {
            content,
            markdown,
            site,
        }
    }

    pub fn content(&self) -> &ContentService {
        &self.content
    }

    pub fn markdown(&self) -> &MarkdownService {
        &self.markdown
    }

    pub fn site(&self) -> &SiteInfo {
        &self.site
    }

    pub fn chrome(&self, locale: Locale, path: &str) -> LayoutChrome {
        LayoutChrome::for_locale(&self.site.title, &self.site.description, locale)
            .with_canonical(self.canonical_url(path))
    }

    pub fn canonical_url(&self, path: &str) -> String {
        format!("{}{}", self.site.public_url.trim_end_matches('/'), path)
    }

    pub async fn index_view(&self, locale: Locale) -> Result<IndexView, HttpError> {
        let posts = self.content.list_posts(locale).await?;
        let cards: Vec<PostCard> = posts.iter().map(post_card).collect();

        Ok(IndexView {
            heading: locale.strings().posts.to_string(),
            has_results: !cards.is_empty(),
            posts: cards,
        })
    }

    /// `None` when the slug has no translation in `locale`.
    pub async fn post_view(
        &self,
        slug: &str,
        locale: Locale,
    ) -> Result<Option<PostView>, HttpError> {
        let Some(record) = self.content.get_post(slug, locale).await? else {
            return Ok(None);
        };

        let markdown = self
            .markdown
            .get_markdown(&record.markdown_path)
            .await
            .map_err(|err| {
                HttpError::from_error(
                    SOURCE,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Article body is unavailable",
                    &err,
                )
            })?;

        let locales = self.content.list_locales_for_slug(slug).await?;
        let translations = if locales.len() > 1 {
            locales
                .iter()
                .map(|candidate| LocaleLink {
                    code: candidate.code(),
                    label: candidate.display_name(),
                    href: post_path(candidate.code(), slug),
                    is_current: *candidate == locale,
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(Some(PostView {
            iso_date: iso_date(&record),
            published: locale.format_date(record.published_at),
            markdown_href: format!("{}/markdown", post_path(locale.code(), slug)),
            back_href: format!("/{}", locale.code()),
            content_html: render_markdown(&markdown),
            title: record.title,
            description: record.description,
            author: record.author,
            tags: record.tags,
            translations,
        }))
    }
}

pub fn post_path(locale_code: &str, slug: &str) -> String {
    format!("/{locale_code}/posts/{slug}")
}

fn post_card(record: &ContentRecord) -> PostCard {
    PostCard {
        href: post_path(record.locale.code(), &record.slug),
        title: record.title.clone(),
        description: record.description.clone(),
        iso_date: iso_date(record),
        published: record.locale.format_date(record.published_at),
        tags: record.tags.clone(),
    }
}

fn iso_date(record: &ContentRecord) -> String {
    record
        .published_at
        .format(&Rfc3339)
        .unwrap_or_else(|_| record.published_at.date().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::application::content::tests::StubContentRepo;
    use crate::application::storage::tests::MemoryStore;

    fn pages(repo: StubContentRepo, store: MemoryStore) -> SitePages {
        SitePages::new(
            ContentService::new(Arc::new(repo)),
            MarkdownService::new(Arc::new(store), "posts"),
            SiteInfo {
                title: "Folio".to_string(),
                description: "Notes".to_string(),
                public_url: "https://blog.example/".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn post_view_renders_body_and_translation_links() {
        let store = MemoryStore::default();
        store.insert("posts", "hello/en.md", "# Hi\n\nBody **bold**");
        let svc = pages(
            StubContentRepo::default()
                .with_post("hello", Locale::En, "Hello")
                .with_post("hello", Locale::ZhTw, "你好"),
            store,
        );

        let view = svc
            .post_view("hello", Locale::En)
            .await
            .expect("view")
            .expect("post exists");
        assert_eq!(view.title, "Hello");
        assert!(view.content_html.contains("<strong>bold</strong>"));
        assert_eq!(view.translations.len(), 2);
        assert_eq!(view.markdown_href, "/en/posts/hello/markdown");
        assert_eq!(view.published, "Jan 01, 2024");
    }

    #[tokio::test]
    async fn single_locale_post_has_no_switcher() {
        let store = MemoryStore::default();
        store.insert("posts", "solo/en.md", "text");
        let svc = pages(StubContentRepo::default().with_post("solo", Locale::En, "Solo"), store);

        let view = svc
            .post_view("solo", Locale::En)
            .await
            .expect("view")
            .expect("post exists");
        assert!(view.translations.is_empty());
    }

    #[tokio::test]
    async fn missing_translation_is_none() {
        let svc = pages(
            StubContentRepo::default().with_post("solo", Locale::En, "Solo"),
            MemoryStore::default(),
        );
        assert!(svc.post_view("solo", Locale::ZhTw).await.expect("view").is_none());
    }

    #[tokio::test]
    async fn missing_body_is_an_error() {
        let svc = pages(
            StubContentRepo::default().with_post("solo", Locale::En, "Solo"),
            MemoryStore::default(),
        );
        let err = svc
            .post_view("solo", Locale::En)
            .await
            .err()
            .expect("missing body");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn canonical_url_joins_public_url() {
        let svc = pages(StubContentRepo::default(), MemoryStore::default());
        assert_eq!(svc.canonical_url("/en"), "https://blog.example/en");
    }
}
