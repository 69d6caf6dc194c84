//! HTTP transport seam.
//!
//! Everything that goes over the wire passes through [`Transport`], so the
//! session can attach and collect cookies regardless of which client performs
//! the request.

use crate::config::HttpConfig;
use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, SET_COOKIE};
use std::time::Duration;
use url::Url;

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the raw `Set-Cookie` header values.
    pub fn set_cookie_headers(&self) -> Vec<&str> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }
}

/// Performs GET requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a GET request with exactly the given headers.
    async fn get(&self, url: &Url, headers: HeaderMap) -> Result<HttpResponse, FetchError>;
}

/// [`Transport`] backed by `reqwest`.
///
/// The client keeps no cookie store of its own; cookies belong to the session.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a transport with the configured User-Agent and timeout.
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_sec))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &Url, headers: HeaderMap) -> Result<HttpResponse, FetchError> {
        let response = self.client.get(url.clone()).headers(headers).send().await?;

        let final_url = response.url().to_string();
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;

        Ok(HttpResponse {
            url: final_url,
            status,
            headers,
            body,
        })
    }
}
