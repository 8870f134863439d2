//! Shared plumbing for calls to the hosted backend (storage and identity APIs).

use std::time::Duration;

use reqwest::Client;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn user_agent() -> &'static str {
    concat!("folio/", env!("CARGO_PKG_VERSION"))
}

/// One client per process; clones share the connection pool.
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent())
        .timeout(REQUEST_TIMEOUT)
        .build()
}

/// Append percent-encoded path segments to `base`, keeping any base path prefix.
pub fn endpoint<'a, I>(base: &Url, segments: I) -> Result<Url, url::ParseError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
        path.pop_if_empty().extend(segments);
    }
    Ok(url)
}
