//! Views for the authenticated composer area.

use askama::Template;

use crate::domain::locale::Locale;

pub struct AdminChrome {
    pub site_title: String,
    pub user_email: String,
}

pub struct AdminPostRow {
    pub title: String,
    pub href: String,
    pub locale: &'static str,
    pub published: String,
}

pub struct DashboardView {
    pub chrome: AdminChrome,
    pub user_id: String,
    pub posts: Vec<AdminPostRow>,
    pub deploy_configured: bool,
}

#[derive(Template)]
#[template(path = "admin/dashboard.html")]
pub struct DashboardTemplate {
    pub view: DashboardView,
}

pub struct LanguageOption {
    pub code: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

impl LanguageOption {
    pub fn all(selected: Option<Locale>) -> Vec<Self> {
        let selected = selected.unwrap_or(Locale::DEFAULT);
        Locale::ALL
            .iter()
            .map(|locale| LanguageOption {
                code: locale.code(),
                label: locale.display_name(),
                selected: *locale == selected,
            })
            .collect()
    }
}

/// The compose form, optionally refilled after a failed publish.
pub struct ComposerView {
    pub chrome: AdminChrome,
    pub languages: Vec<LanguageOption>,
    pub title: String,
    pub body: String,
    pub tags: String,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "admin/write.html")]
pub struct ComposerTemplate {
    pub view: ComposerView,
}

pub struct PublishResultView {
    pub chrome: AdminChrome,
    pub degraded: bool,
    pub message: String,
    pub post_href: String,
    pub post_title: String,
}

#[derive(Template)]
#[template(path = "admin/result.html")]
pub struct PublishResultTemplate {
    pub view: PublishResultView,
}
