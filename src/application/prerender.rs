//! Static export of every public page.
//!
//! Produces `<out>/<locale>/index.html` for each locale and
//! `<out>/<locale>/posts/<slug>/index.html` for each (slug, locale) pair.

use std::path::{Path, PathBuf};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use futures::TryStreamExt;
use thiserror::Error;
use tracing::info;

use crate::application::content::ContentError;
use crate::application::pages::{SitePages, post_path};
use crate::domain::entities::SlugLocale;
use crate::domain::locale::Locale;
use crate::presentation::views::{IndexTemplate, LayoutContext, PostTemplate, render_template};

#[derive(Debug, Error)]
pub enum PrerenderError {
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error("failed to render `{page}`: {message}")]
    Render { page: String, message: String },
    #[error("post `{slug}` vanished before it could be rendered")]
    Vanished { slug: String },
    #[error("failed to write `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrerenderSummary {
    pub indexes: usize,
    pub posts: usize,
}

#[derive(Clone)]
pub struct Prerenderer {
    pages: SitePages,
    out_dir: PathBuf,
}

impl Prerenderer {
    pub fn new(pages: SitePages, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            pages,
            out_dir: out_dir.into(),
        }
    }

    pub async fn run(&self, concurrency: usize) -> Result<PrerenderSummary, PrerenderError> {
        let concurrency = concurrency.clamp(1, 32);
        info!(
            target = "folio::prerender",
            out = %self.out_dir.display(),
            concurrency,
            "starting prerender"
        );

        for locale in Locale::ALL {
            self.render_index(locale).await?;
        }

        let total = Arc::new(AtomicUsize::new(0));
        let counter = total.clone();
        self.pages
            .content()
            .all_slug_locale_pairs()
            .map_err(PrerenderError::from)
            .try_for_each_concurrent(Some(concurrency), |pair| {
                let counter = counter.clone();
                async move {
                    self.render_post(pair).await?;
                    counter.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
            })
            .await?;

        let summary = PrerenderSummary {
            indexes: Locale::ALL.len(),
            posts: total.load(Ordering::Relaxed),
        };
        info!(
            target = "folio::prerender",
            indexes = summary.indexes,
            posts = summary.posts,
            "prerender completed"
        );
        Ok(summary)
    }

    async fn render_index(&self, locale: Locale) -> Result<(), PrerenderError> {
        let path = format!("/{}", locale.code());
        let view = self
            .pages
            .index_view(locale)
            .await
            .map_err(|err| render_error(&path, err.public_message()))?;
        let chrome = self.pages.chrome(locale, &path);
        let html = render_template(IndexTemplate {
            view: LayoutContext::new(chrome, view),
        })
        .map_err(|err| render_error(&path, err.public_message()))?;

        let target = self.out_dir.join(locale.code()).join("index.html");
        write_page(&target, &html.0).await
    }

    async fn render_post(&self, pair: SlugLocale) -> Result<(), PrerenderError> {
        let path = post_path(pair.locale.code(), &pair.slug);
        let view = self
            .pages
            .post_view(&pair.slug, pair.locale)
            .await
            .map_err(|err| render_error(&path, err.public_message()))?
            .ok_or_else(|| PrerenderError::Vanished {
                slug: pair.slug.clone(),
            })?;
        let chrome = self
            .pages
            .chrome(pair.locale, &path)
            .with_page_title(&view.title);
        let html = render_template(PostTemplate {
            view: LayoutContext::new(chrome, view),
        })
        .map_err(|err| render_error(&path, err.public_message()))?;

        let target = self
            .out_dir
            .join(pair.locale.code())
            .join("posts")
            .join(&pair.slug)
            .join("index.html");
        write_page(&target, &html.0).await
    }
}

fn render_error(page: &str, message: &str) -> PrerenderError {
    PrerenderError::Render {
        page: page.to_string(),
        message: message.to_string(),
    }
}

async fn write_page(target: &Path, html: &str) -> Result<(), PrerenderError> {
    let io_error = |source| PrerenderError::Io {
        path: target.to_path_buf(),
        source,
    };
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }
    tokio::fs::write(target, html).await.map_err(io_error)
}
