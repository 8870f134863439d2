//! The closed set of locales the site is published in.
//!
//! Each locale carries its display name, the UI string bundle used by the
//! templates, and the calendar format used for publication dates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

const ZH_TW_DATE: &[BorrowedFormatItem<'static>] =
    format_description!("[year]年[month]月[day]日");
const EN_DATE: &[BorrowedFormatItem<'static>] =
    format_description!("[month repr:short] [day], [year]");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Locale {
    ZhTw,
    En,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported locale `{0}`")]
pub struct UnknownLocale(pub String);

/// Translated interface strings for a locale.
#[derive(Debug)]
pub struct UiStrings {
    pub posts: &'static str,
    pub no_articles: &'static str,
    pub author: &'static str,
    pub not_found: &'static str,
    pub back_to_home: &'static str,
    pub article_not_found: &'static str,
    pub read_in: &'static str,
    pub tags: &'static str,
}

static ZH_TW_STRINGS: UiStrings = UiStrings {
    posts: "文章",
    no_articles: "尚無文章",
    author: "作者",
    not_found: "找不到這個頁面",
    back_to_home: "回到首頁",
    article_not_found: "文章不存在",
    read_in: "閱讀",
    tags: "標籤",
};

static EN_STRINGS: UiStrings = UiStrings {
    posts: "Posts",
    no_articles: "No articles yet",
    author: "Author",
    not_found: "Page not found",
    back_to_home: "Back to home",
    article_not_found: "Article not found",
    read_in: "Read in",
    tags: "Tags",
};

impl Locale {
    pub const ALL: [Locale; 2] = [Locale::ZhTw, Locale::En];
    pub const DEFAULT: Locale = Locale::ZhTw;

    /// The code used in URLs and stored in `post_translations.locale`.
    pub fn code(self) -> &'static str {
        match self {
            Locale::ZhTw => "zh-TW",
            Locale::En => "en",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Locale::ZhTw => "繁體中文",
            Locale::En => "English",
        }
    }

    pub fn strings(self) -> &'static UiStrings {
        match self {
            Locale::ZhTw => &ZH_TW_STRINGS,
            Locale::En => &EN_STRINGS,
        }
    }

    /// Whether titles in this locale can be slugified into readable ASCII.
    pub fn is_latin_script(self) -> bool {
        match self {
            Locale::ZhTw => false,
            Locale::En => true,
        }
    }

    /// Parse a locale code, returning `None` for anything outside the table.
    pub fn parse(code: &str) -> Option<Self> {
        code.parse().ok()
    }

    pub fn format_date(self, value: OffsetDateTime) -> String {
        let format = match self {
            Locale::ZhTw => ZH_TW_DATE,
            Locale::En => EN_DATE,
        };
        value
            .format(format)
            .unwrap_or_else(|_| value.date().to_string())
    }
}

impl FromStr for Locale {
    type Err = UnknownLocale;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "zh-TW" | "zh-tw" | "zh" => Ok(Locale::ZhTw),
            "en" => Ok(Locale::En),
            other => Err(UnknownLocale(other.to_string())),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl From<Locale> for String {
    fn from(locale: Locale) -> Self {
        locale.code().to_string()
    }
}

impl TryFrom<String> for Locale {
    type Error = UnknownLocale;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
