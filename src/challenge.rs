//! Bot-challenge solver integration.
//!
//! Solving is delegated to an external [`ChallengeSolver`]; this module only
//! defines what it must hand back and how to recognise a challenge page.

use crate::cookies::Cookie;
use crate::error::FetchError;
use crate::http::HttpResponse;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use url::Url;

/// Result of solving a challenge-protected page.
#[derive(Debug, Clone)]
pub struct SolvedChallenge {
    /// The page as a browser would see it once the challenge is passed.
    pub response: HttpResponse,

    /// Cookies minted while solving, to be reused by plain requests.
    pub cookies: Vec<Cookie>,
}

/// Fetches a URL as if a browser had solved any anti-bot challenge in front of it.
#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    async fn solve(&self, url: &Url, headers: HeaderMap) -> Result<SolvedChallenge, FetchError>;
}

const CHALLENGE_MARKERS: &[&str] = &[
    "cf-browser-verification",
    "challenge-platform",
    "cf_chl_opt",
    "Just a moment...",
];

/// Returns true when a response looks like an interstitial bot challenge.
pub fn looks_like_challenge(response: &HttpResponse) -> bool {
    if !matches!(response.status, 403 | 429 | 503) {
        return false;
    }
    if response.headers.contains_key("cf-mitigated") {
        return true;
    }
    CHALLENGE_MARKERS
        .iter()
        .any(|marker| response.body.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            url: "https://site.example/".to_string(),
            status,
            headers: HeaderMap::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_detects_challenge_body() {
        let page = response(503, "<title>Just a moment...</title>");
        assert!(looks_like_challenge(&page));
    }

    #[test]
    fn test_detects_mitigated_header() {
        let mut page = response(403, "");
        page.headers
            .insert("cf-mitigated", HeaderValue::from_static("challenge"));
        assert!(looks_like_challenge(&page));
    }

    #[test]
    fn test_ignores_plain_pages() {
        assert!(!looks_like_challenge(&response(200, "Just a moment...")));
        assert!(!looks_like_challenge(&response(503, "maintenance")));
    }
}
