//! Transport contract and request header handling
//!
//! Operations in [`crate::address_book`] are written against [`DavTransport`]
//! so the HTTP layer can be swapped (see [`crate::client::HttpTransport`]).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Response;

use crate::error::{CardDavError, Result};
use crate::models::{DavResponse, Depth, PropValue};
use crate::xml::{PropName, SUPPORTED_REPORT_SET, XmlElement};

/// Per-request transport options
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Overrides the client-wide timeout for this request
    pub timeout: Option<Duration>,
}

/// Headers shared by every operation: caller overrides and names to strip
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    /// Merged over the operation's default headers
    pub headers: HeaderMap,
    /// Removed after the merge, so exclusion always wins
    pub headers_to_exclude: Vec<String>,
    pub fetch_options: FetchOptions,
}

impl RequestParams {
    /// Final header map for a request with the given defaults
    pub fn headers_with(&self, defaults: HeaderMap) -> HeaderMap {
        exclude_headers(merge_headers(defaults, &self.headers), &self.headers_to_exclude)
    }

    /// Final header map for a request without defaults
    pub fn final_headers(&self) -> HeaderMap {
        self.headers_with(HeaderMap::new())
    }
}

/// Overlay `overrides` on `defaults`; a name present in `overrides` replaces
/// every default value for that name.
pub fn merge_headers(defaults: HeaderMap, overrides: &HeaderMap) -> HeaderMap {
    let mut merged = defaults;
    for name in overrides.keys() {
        merged.remove(name);
    }
    for (name, value) in overrides {
        merged.append(name.clone(), value.clone());
    }
    merged
}

/// Drop the named headers. Names are matched case-insensitively.
pub fn exclude_headers(mut headers: HeaderMap, names: &[String]) -> HeaderMap {
    for name in names {
        headers.remove(name.as_str());
    }
    headers
}

/// Build a header value, rejecting characters HTTP does not allow
pub fn header_value(name: &'static str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| CardDavError::Request(format!("invalid {name} header: {e}")))
}

/// Raw WebDAV primitives the address book operations are built on
#[async_trait]
pub trait DavTransport: Send + Sync {
    /// REPORT `body` at `url` with the given depth
    async fn collection_query(
        &self,
        url: &str,
        body: &XmlElement,
        depth: Depth,
        headers: HeaderMap,
        options: &FetchOptions,
    ) -> Result<Vec<DavResponse>>;

    /// PROPFIND the given properties at `url`
    async fn propfind(
        &self,
        url: &str,
        props: &[PropName],
        depth: Depth,
        headers: HeaderMap,
        options: &FetchOptions,
    ) -> Result<Vec<DavResponse>>;

    /// PUT a new resource. `headers` is sent as given.
    async fn create_object(
        &self,
        url: &str,
        data: &str,
        headers: HeaderMap,
        options: &FetchOptions,
    ) -> Result<Response>;

    /// PUT over an existing resource. `headers` is sent as given.
    async fn update_object(
        &self,
        url: &str,
        data: &str,
        headers: HeaderMap,
        options: &FetchOptions,
    ) -> Result<Response>;

    /// DELETE a resource. `headers` is sent as given.
    async fn delete_object(
        &self,
        url: &str,
        headers: HeaderMap,
        options: &FetchOptions,
    ) -> Result<Response>;

    /// Reports advertised by the collection at `url`
    async fn supported_report_set(
        &self,
        url: &str,
        headers: HeaderMap,
        options: &FetchOptions,
    ) -> Result<Vec<String>> {
        let responses = self
            .propfind(url, &[SUPPORTED_REPORT_SET], Depth::Zero, headers, options)
            .await?;
        Ok(responses
            .first()
            .and_then(|r| r.prop(&SUPPORTED_REPORT_SET.name))
            .map(report_names)
            .unwrap_or_default())
    }
}

/// `<supported-report><report><X/></report></supported-report>` → `X`
fn report_names(value: &PropValue) -> Vec<String> {
    value
        .children()
        .iter()
        .filter(|(name, _)| name == "supported-report")
        .filter_map(|(_, supported)| supported.child("report"))
        .filter_map(|report| report.children().first())
        .map(|(name, _)| name.clone())
        .collect()
}
