//! Cookie-carrying HTTP session.

use crate::config::HttpConfig;
use crate::cookies::{Cookie, CookieJar, CookieScoping};
use crate::error::FetchError;
use crate::http::{HttpResponse, ReqwestTransport, Transport};
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Wraps a [`Transport`] and threads one [`CookieJar`] through every request.
///
/// Clones share the same transport and jar.
#[derive(Clone)]
pub struct Session {
    transport: Arc<dyn Transport>,
    jar: Arc<CookieJar>,
    delay: Duration,
}

impl Session {
    /// Creates a session over an arbitrary transport.
    pub fn new(transport: Arc<dyn Transport>, scoping: CookieScoping) -> Self {
        Self {
            transport,
            jar: Arc::new(CookieJar::new(scoping)),
            delay: Duration::ZERO,
        }
    }

    /// Creates a session backed by `reqwest` using the given HTTP settings.
    pub fn from_config(config: &HttpConfig, scoping: CookieScoping) -> Result<Self, FetchError> {
        let transport = ReqwestTransport::new(config)?;
        let delay = Duration::try_from_secs_f64(config.delay_between_requests_sec).unwrap_or_else(|err| {
            warn!(delay = config.delay_between_requests_sec, error = %err, "ignoring unusable request delay");
            Duration::ZERO
        });
        Ok(Self::new(Arc::new(transport), scoping).with_delay(delay))
    }

    /// Sets the pause applied before every request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn jar(&self) -> &CookieJar {
        &self.jar
    }

    /// Issues a GET request with the jar's cookies attached, storing any
    /// cookies the response sets before returning it.
    ///
    /// The response is returned whatever its status.
    pub async fn get(&self, url: &Url, mut headers: HeaderMap) -> Result<HttpResponse, FetchError> {
        rate_limit(self.delay).await;

        let caller = headers
            .get(COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let caller_names: Vec<&str> = caller.as_deref().map(cookie_names).unwrap_or_default();

        if let Some(jar_cookies) = self.jar.cookie_header_except(url, &caller_names) {
            let combined = match &caller {
                Some(existing) => format!("{}; {}", existing, jar_cookies),
                None => jar_cookies,
            };
            match HeaderValue::from_str(&combined) {
                Ok(value) => {
                    headers.insert(COOKIE, value);
                }
                Err(err) => debug!(url = %url, error = %err, "skipping unencodable cookie header"),
            }
        }

        let response = self.transport.get(url, headers).await?;
        self.jar.save_from_response(url, response.set_cookie_headers());
        Ok(response)
    }

    /// Merges cookies minted outside this session, such as by a challenge solver.
    pub fn merge_cookies(&self, url: &Url, cookies: Vec<Cookie>) {
        debug!(url = %url, count = cookies.len(), "merging external cookies");
        self.jar.merge(url, cookies);
    }
}

/// Names of the pairs in a `Cookie` request header value.
fn cookie_names(header: &str) -> Vec<&str> {
    header
        .split(';')
        .filter_map(|pair| pair.split_once('=').map(|(name, _)| name.trim()))
        .filter(|name| !name.is_empty())
        .collect()
}

async fn rate_limit(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
