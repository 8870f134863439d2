//! Slug derivation for newly composed posts.
//!
//! Latin-script titles are normalised with the `slug` crate so
//! `"Hello, World!"` becomes `hello-world`. Titles that cannot produce a
//! readable ASCII slug, either because they normalise to nothing or because the
//! post is written in a non-Latin-script locale, fall back to a time-based slug
//! of the form `<unix-millis>-<5 hex chars>`.

use slug::slugify;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::locale::Locale;

const RANDOM_SUFFIX_LEN: usize = 5;

/// Normalise arbitrary text into lowercase ASCII words joined by `-`.
///
/// Returns an empty string when nothing alphanumeric survives.
pub fn normalize_slug(input: &str) -> String {
    slugify(input)
}

/// Derive the base slug for a new post.
pub fn derive_slug(title: &str, locale: Locale, now: OffsetDateTime) -> String {
    if locale.is_latin_script() {
        let normalized = normalize_slug(title);
        if !normalized.is_empty() {
            return normalized;
        }
    }
    timestamp_slug(now)
}

/// `<unix-millis>-<random>` slug used when the title yields no usable text.
pub fn timestamp_slug(now: OffsetDateTime) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}",
        unix_millis(now),
        &random[..RANDOM_SUFFIX_LEN]
    )
}

/// Suffix appended to a slug that is already taken.
pub fn with_collision_suffix(base: &str, now: OffsetDateTime) -> String {
    format!("{base}-{}", unix_millis(now))
}

pub fn unix_millis(now: OffsetDateTime) -> i128 {
    now.unix_timestamp_nanos() / 1_000_000
}
