//! Test doubles for the transport, challenge solver and embed delegate.

use crate::challenge::{ChallengeSolver, SolvedChallenge};
use crate::cookies::Cookie;
use crate::error::FetchError;
use crate::http::{HttpResponse, Transport};
use crate::model::{MediaType, Quality, StreamDescriptor};
use crate::resolver::EmbedDelegate;
use crate::sink::{StreamSink, SubtitleSink};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, SET_COOKIE};
use std::collections::HashMap;
use url::Url;

enum Route {
    Respond {
        status: u16,
        body: String,
        set_cookies: Vec<String>,
    },
    Fail(String),
}

/// A request seen by [`FakeTransport`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub cookie: Option<String>,
    pub headers: HeaderMap,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Serves canned responses keyed by exact URL; unknown URLs get a 404.
#[derive(Default)]
pub struct FakeTransport {
    routes: HashMap<String, Route>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, status: u16, body: &str) -> Self {
        self.with_set_cookie(url, status, body, &[])
    }

    pub fn with_set_cookie(mut self, url: &str, status: u16, body: &str, cookies: &[&str]) -> Self {
        self.routes.insert(
            url.to_string(),
            Route::Respond {
                status,
                body: body.to_string(),
                set_cookies: cookies.iter().map(|c| c.to_string()).collect(),
            },
        );
        self
    }

    pub fn with_network_error(mut self, url: &str) -> Self {
        self.routes
            .insert(url.to_string(), Route::Fail("connection reset".to_string()));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_to(&self, url: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url == url)
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, url: &Url, headers: HeaderMap) -> Result<HttpResponse, FetchError> {
        self.requests.lock().push(RecordedRequest {
            url: url.to_string(),
            cookie: headers
                .get(COOKIE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            headers: headers.clone(),
        });

        match self.routes.get(url.as_str()) {
            Some(Route::Respond {
                status,
                body,
                set_cookies,
            }) => {
                let mut response_headers = HeaderMap::new();
                for cookie in set_cookies {
                    if let Ok(value) = HeaderValue::from_str(cookie) {
                        response_headers.append(SET_COOKIE, value);
                    }
                }
                Ok(HttpResponse {
                    url: url.to_string(),
                    status: *status,
                    headers: response_headers,
                    body: body.clone(),
                })
            }
            Some(Route::Fail(message)) => Err(FetchError::Network(message.clone())),
            None => Ok(HttpResponse {
                url: url.to_string(),
                status: 404,
                headers: HeaderMap::new(),
                body: String::new(),
            }),
        }
    }
}

/// Solver that returns a fixed body and mints one cookie.
pub struct FakeSolver {
    pub body: String,
    pub cookie: Cookie,
}

#[async_trait]
impl ChallengeSolver for FakeSolver {
    async fn solve(&self, url: &Url, _headers: HeaderMap) -> Result<SolvedChallenge, FetchError> {
        Ok(SolvedChallenge {
            response: HttpResponse {
                url: url.to_string(),
                status: 200,
                headers: HeaderMap::new(),
                body: self.body.clone(),
            },
            cookies: vec![self.cookie.clone()],
        })
    }
}

/// Delegate that emits one stream for URLs containing `"good"` and records every call.
#[derive(Default)]
pub struct FakeDelegate {
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeDelegate {
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl EmbedDelegate for FakeDelegate {
    async fn resolve(
        &self,
        embed_url: &str,
        referer: &str,
        _subtitles: &dyn SubtitleSink,
        streams: &dyn StreamSink,
    ) -> bool {
        self.calls
            .lock()
            .push((embed_url.to_string(), referer.to_string()));
        if !embed_url.contains("good") {
            return false;
        }
        streams.emit(StreamDescriptor::new(
            "Fake",
            format!("{}/master.m3u8", embed_url),
            embed_url,
            Quality::P1080,
            MediaType::Hls,
        ));
        true
    }
}
