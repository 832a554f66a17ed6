//! reqwest-backed WebDAV transport

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response};
use tracing::{debug, error, info};

use crate::config::CardDavConfig;
use crate::error::{CardDavError, Result};
use crate::models::{DavResponse, Depth};
use crate::transport::{DavTransport, FetchOptions, merge_headers};
use crate::xml::{PropName, XmlElement, parse_multistatus};

const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// HTTP transport speaking WebDAV through reqwest
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    username: Option<String>,
    password: Option<String>,
}

impl HttpTransport {
    /// Create a transport from configuration
    pub fn new(config: &CardDavConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("cc-carddav/", env!("CARGO_PKG_VERSION")))
            .build()?;

        info!("CardDAV transport initialized for: {}", config.server_url);

        let username = Some(config.username.clone()).filter(|u| !u.is_empty());
        Ok(Self {
            client,
            username,
            password: config.password.clone(),
        })
    }

    /// Wrap an existing client; requests are sent without credentials
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            username: None,
            password: None,
        }
    }

    /// Send HTTP basic credentials with every request
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    fn request(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        options: &FetchOptions,
    ) -> RequestBuilder {
        let mut request = self.client.request(method, url).headers(headers);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }
        request
    }

    async fn multistatus(
        &self,
        method: Method,
        url: &str,
        body: &XmlElement,
        depth: Depth,
        headers: HeaderMap,
        options: &FetchOptions,
    ) -> Result<Vec<DavResponse>> {
        let mut defaults = HeaderMap::new();
        defaults.insert(CONTENT_TYPE, HeaderValue::from_static(XML_CONTENT_TYPE));
        defaults.insert(
            HeaderName::from_static("depth"),
            HeaderValue::from_static(depth.as_str()),
        );

        let body = body.to_xml()?;
        debug!("{} {} (depth {})", method, url, depth.as_str());

        let response = self
            .request(method, url, merge_headers(defaults, &headers), options)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            error!("WebDAV request to {} failed: {}", url, status);
            return Err(CardDavError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let responses = parse_multistatus(&text)?;
        debug!("{} returned {} responses", url, responses.len());
        Ok(responses)
    }
}

fn dav_method(name: &str) -> Result<Method> {
    Method::from_bytes(name.as_bytes())
        .map_err(|e| CardDavError::Request(format!("invalid method {name}: {e}")))
}

#[async_trait]
impl DavTransport for HttpTransport {
    async fn collection_query(
        &self,
        url: &str,
        body: &XmlElement,
        depth: Depth,
        headers: HeaderMap,
        options: &FetchOptions,
    ) -> Result<Vec<DavResponse>> {
        self.multistatus(dav_method("REPORT")?, url, body, depth, headers, options)
            .await
    }

    async fn propfind(
        &self,
        url: &str,
        props: &[PropName],
        depth: Depth,
        headers: HeaderMap,
        options: &FetchOptions,
    ) -> Result<Vec<DavResponse>> {
        let body = XmlElement::propfind(props);
        self.multistatus(dav_method("PROPFIND")?, url, &body, depth, headers, options)
            .await
    }

    async fn create_object(
        &self,
        url: &str,
        data: &str,
        headers: HeaderMap,
        options: &FetchOptions,
    ) -> Result<Response> {
        debug!("PUT (create) {}", url);
        let response = self
            .request(Method::PUT, url, headers, options)
            .body(data.to_string())
            .send()
            .await?;
        Ok(response)
    }

    async fn update_object(
        &self,
        url: &str,
        data: &str,
        headers: HeaderMap,
        options: &FetchOptions,
    ) -> Result<Response> {
        debug!("PUT (update) {}", url);
        let response = self
            .request(Method::PUT, url, headers, options)
            .body(data.to_string())
            .send()
            .await?;
        Ok(response)
    }

    async fn delete_object(
        &self,
        url: &str,
        headers: HeaderMap,
        options: &FetchOptions,
    ) -> Result<Response> {
        debug!("DELETE {}", url);
        let response = self
            .request(Method::DELETE, url, headers, options)
            .send()
            .await?;
        Ok(response)
    }
}
