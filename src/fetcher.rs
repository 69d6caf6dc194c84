//! Page fetching on top of a [`Session`].

use crate::challenge::{ChallengeSolver, looks_like_challenge};
use crate::error::FetchError;
use crate::session::Session;
use reqwest::header::HeaderMap;
use scraper::Html;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// A successfully fetched HTML page.
///
/// The body is kept as text; [`Page::html`] parses it on demand so parsed
/// documents never live across an await point.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl Page {
    /// Parses the body as an HTML document.
    pub fn html(&self) -> Html {
        Html::parse_document(&self.body)
    }
}

/// Issues page GETs through the session, optionally via a challenge solver.
///
/// Never retries; callers decide whether a failure is fatal.
#[derive(Clone)]
pub struct PageFetcher {
    session: Session,
    solver: Option<Arc<dyn ChallengeSolver>>,
}

impl PageFetcher {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            solver: None,
        }
    }

    /// Enables fetches with `via_challenge` set.
    pub fn with_solver(mut self, solver: Arc<dyn ChallengeSolver>) -> Self {
        self.solver = Some(solver);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Fetches `url` and returns the page if the server answered with 2xx.
    pub async fn fetch(
        &self,
        url: &str,
        headers: HeaderMap,
        via_challenge: bool,
    ) -> Result<Page, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;

        let response = if via_challenge {
            let solver = self.solver.as_ref().ok_or(FetchError::ChallengeUnavailable)?;
            debug!(url = %parsed, "fetching through challenge solver");
            let solved = solver.solve(&parsed, headers).await?;
            self.session.merge_cookies(&parsed, solved.cookies);
            solved.response
        } else {
            self.session.get(&parsed, headers).await?
        };

        if !response.is_success() {
            if !via_challenge && looks_like_challenge(&response) {
                warn!(url = %parsed, status = response.status, "page is behind a bot challenge");
            }
            return Err(FetchError::HttpStatus {
                code: response.status,
                url: response.url,
            });
        }

        Ok(Page {
            url: response.url,
            status: response.status,
            body: response.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::{Cookie, CookieScoping};
    use crate::testing::{FakeSolver, FakeTransport};
    use scraper::Selector;

    fn fetcher(transport: FakeTransport) -> (PageFetcher, Arc<FakeTransport>) {
        let transport = Arc::new(transport);
        let session = Session::new(transport.clone(), CookieScoping::GlobalByName);
        (PageFetcher::new(session), transport)
    }

    #[tokio::test]
    async fn test_fetch_parses_document() {
        let (fetcher, _) = fetcher(
            FakeTransport::new().with_page("https://site.example/", 200, "<h1>Episode 1</h1>"),
        );
        let page = fetcher
            .fetch("https://site.example/", HeaderMap::new(), false)
            .await
            .unwrap();

        let doc = page.html();
        let h1 = Selector::parse("h1").unwrap();
        let title: String = doc.select(&h1).next().unwrap().text().collect();
        assert_eq!(title, "Episode 1");
    }

    #[tokio::test]
    async fn test_fetch_status_error() {
        let (fetcher, _) = fetcher(FakeTransport::new().with_page("https://site.example/", 500, ""));
        let err = fetcher
            .fetch("https://site.example/", HeaderMap::new(), false)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(500));
    }

    #[tokio::test]
    async fn test_fetch_network_error() {
        let (fetcher, _) = fetcher(FakeTransport::new().with_network_error("https://site.example/"));
        let err = fetcher
            .fetch("https://site.example/", HeaderMap::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
    }

    #[tokio::test]
    async fn test_fetch_invalid_url() {
        let (fetcher, transport) = fetcher(FakeTransport::new());
        let err = fetcher.fetch("not a url", HeaderMap::new(), false).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_challenge_without_solver() {
        let (fetcher, _) = fetcher(FakeTransport::new());
        let err = fetcher
            .fetch("https://site.example/", HeaderMap::new(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::ChallengeUnavailable));
    }

    #[tokio::test]
    async fn test_challenge_cookies_reach_plain_requests() {
        let (fetcher, transport) = fetcher(
            FakeTransport::new().with_page("https://site.example/ep/2", 200, "plain"),
        );
        let fetcher = fetcher.with_solver(Arc::new(FakeSolver {
            body: "<p>solved</p>".to_string(),
            cookie: Cookie::new("cf_clearance", "token"),
        }));

        let solved = fetcher
            .fetch("https://site.example/ep/1", HeaderMap::new(), true)
            .await
            .unwrap();
        assert_eq!(solved.body, "<p>solved</p>");

        fetcher
            .fetch("https://site.example/ep/2", HeaderMap::new(), false)
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].cookie.as_deref(), Some("cf_clearance=token"));
    }
}
