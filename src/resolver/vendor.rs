//! Vendor JSON API strategy with HTML fallback.
//!
//! The API is asked for the stream first. Anything short of a usable answer
//! (non-200, unparsable body, blank `file`) falls back to scraping the embed
//! page for an HLS `<source>`. Network failures end the strategy as a
//! transient failure.

use super::classify::HostClass;
use super::discovery::EmbedReference;
use super::strategy::{ExtractionContext, ExtractionOutcome, ExtractionStrategy};
use crate::error::FetchError;
use crate::model::{MediaType, Quality, StreamDescriptor};
use crate::session::Session;
use crate::sink::{StreamSink, SubtitleSink};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, warn};
use url::{Url, form_urlencoded};

static SOURCE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("source[src]").unwrap());

const HLS_MIME: &str = "application/x-mpegurl";

/// A vendor whose player exposes a JSON source endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorProfile {
    /// Label used as the descriptors' source name.
    pub label: String,

    /// Host marker; embeds whose host contains it use this vendor.
    pub host: String,

    /// Endpoint template. `{id}` is replaced by the video identifier and
    /// `{referer}` by the URL-encoded embed URL.
    pub api_endpoint: String,
}

impl VendorProfile {
    /// Built-in vendor table.
    pub fn defaults() -> Vec<Self> {
        vec![VendorProfile {
            label: "Embedvid".to_string(),
            host: "embedvid.net".to_string(),
            api_endpoint: "https://embedvid.net/api/source/{id}?r={referer}".to_string(),
        }]
    }

    /// Fills in the endpoint template.
    pub fn api_url(&self, id: &str, embed_url: &str) -> String {
        let id: String = form_urlencoded::byte_serialize(id.as_bytes()).collect();
        let referer: String = form_urlencoded::byte_serialize(embed_url.as_bytes()).collect();
        self.api_endpoint
            .replace("{id}", &id)
            .replace("{referer}", &referer)
    }
}

/// Body of a vendor API answer. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct VendorSource {
    file: Option<String>,
    quality: Option<String>,
}

/// Extracts the video identifier: the URL fragment, else the last path segment.
///
/// A present but blank fragment yields no identifier.
pub fn vendor_id(embed_url: &str) -> Option<String> {
    let url = Url::parse(embed_url).ok()?;
    if let Some(fragment) = url.fragment() {
        let fragment = fragment.trim();
        return (!fragment.is_empty()).then(|| fragment.to_string());
    }
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}

/// Outcome of asking the vendor API.
enum ApiAnswer {
    Found(StreamDescriptor),
    /// Nothing usable; the reason is logged before falling back.
    Unusable(&'static str),
}

/// Resolves embeds classified as [`HostClass::VendorApi`].
pub struct VendorApiStrategy {
    session: Session,
    vendors: Vec<VendorProfile>,
    user_agent: String,
}

impl VendorApiStrategy {
    pub fn new(session: Session, vendors: Vec<VendorProfile>, user_agent: impl Into<String>) -> Self {
        Self {
            session,
            vendors,
            user_agent: user_agent.into(),
        }
    }

    /// Referer, Origin, User-Agent and XHR marker sent to the vendor.
    fn request_headers(&self, ctx: &ExtractionContext) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let pairs = [
            (REFERER, ctx.episode_url.as_str()),
            (ORIGIN, ctx.site_origin.as_str()),
            (USER_AGENT, self.user_agent.as_str()),
            (HeaderName::from_static("x-requested-with"), "XMLHttpRequest"),
        ];
        for (name, value) in pairs {
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    headers.insert(name, value);
                }
                Err(_) => debug!(header = %name, "dropping unencodable header value"),
            }
        }
        headers
    }

    async fn query_api(
        &self,
        vendor: &VendorProfile,
        id: &str,
        embed_url: &str,
        headers: HeaderMap,
    ) -> Result<ApiAnswer, FetchError> {
        let api_url = vendor.api_url(id, embed_url);
        let api_url =
            Url::parse(&api_url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", api_url, e)))?;

        let response = self.session.get(&api_url, headers).await?;
        if response.status != 200 {
            debug!(url = %api_url, status = response.status, "vendor api refused");
            return Ok(ApiAnswer::Unusable("non-200 status"));
        }

        let source: VendorSource = match serde_json::from_str(&response.body) {
            Ok(source) => source,
            Err(err) => {
                warn!(url = %api_url, error = %err, "malformed vendor api response");
                return Ok(ApiAnswer::Unusable("malformed response"));
            }
        };

        let Some(file) = source.file.filter(|f| !f.trim().is_empty()) else {
            return Ok(ApiAnswer::Unusable("blank file"));
        };

        Ok(ApiAnswer::Found(StreamDescriptor::new(
            vendor.label.clone(),
            file.trim(),
            embed_url,
            Quality::from_label(source.quality.as_deref()),
            MediaType::Hls,
        )))
    }

    async fn scrape_embed(
        &self,
        vendor: &VendorProfile,
        embed_url: &str,
        headers: HeaderMap,
    ) -> Result<Option<StreamDescriptor>, FetchError> {
        let mut url =
            Url::parse(embed_url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", embed_url, e)))?;
        url.set_fragment(None);
        let response = self.session.get(&url, headers).await?;
        if !response.is_success() {
            debug!(url = %url, status = response.status, "embed page unavailable");
            return Ok(None);
        }

        Ok(find_hls_source(&response.body).map(|src| {
            StreamDescriptor::new(
                vendor.label.clone(),
                src,
                embed_url,
                Quality::Unknown,
                MediaType::Hls,
            )
        }))
    }
}

/// Returns the `src` of the first non-blank HLS `<source>` element.
fn find_hls_source(body: &str) -> Option<String> {
    let doc = Html::parse_document(body);
    doc.select(&SOURCE_SELECTOR)
        .filter(|source| {
            source
                .value()
                .attr("type")
                .is_some_and(|t| t.trim().eq_ignore_ascii_case(HLS_MIME))
        })
        .filter_map(|source| source.value().attr("src"))
        .map(str::trim)
        .find(|src| !src.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl ExtractionStrategy for VendorApiStrategy {
    fn name(&self) -> &'static str {
        "vendor_api"
    }

    async fn extract(
        &self,
        embed: &EmbedReference,
        ctx: &ExtractionContext,
        _subtitles: &dyn SubtitleSink,
        streams: &dyn StreamSink,
    ) -> ExtractionOutcome {
        let HostClass::VendorApi { vendor } = embed.host_class else {
            return ExtractionOutcome::NotFound;
        };
        let Some(vendor) = self.vendors.get(vendor) else {
            return ExtractionOutcome::NotFound;
        };
        let Some(id) = vendor_id(&embed.raw_url) else {
            debug!(url = %embed.raw_url, "no vendor id in embed url");
            return ExtractionOutcome::NotFound;
        };

        let headers = self.request_headers(ctx);

        match self.query_api(vendor, &id, &embed.raw_url, headers.clone()).await {
            Ok(ApiAnswer::Found(stream)) => {
                streams.emit(stream.clone());
                return ExtractionOutcome::Success(vec![stream]);
            }
            Ok(ApiAnswer::Unusable(reason)) => {
                debug!(vendor = %vendor.label, id = %id, reason, "falling back to embed page");
            }
            Err(err) => {
                warn!(vendor = %vendor.label, id = %id, error = %err, "vendor api request failed");
                return ExtractionOutcome::TransientFailure(err);
            }
        }

        match self.scrape_embed(vendor, &embed.raw_url, headers).await {
            Ok(Some(stream)) => {
                streams.emit(stream.clone());
                ExtractionOutcome::Success(vec![stream])
            }
            Ok(None) => ExtractionOutcome::NotFound,
            Err(err) => {
                warn!(vendor = %vendor.label, url = %embed.raw_url, error = %err, "embed page request failed");
                ExtractionOutcome::TransientFailure(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::CookieScoping;
    use crate::sink::{CollectingSink, NullSink};
    use crate::testing::FakeTransport;
    use std::sync::Arc;

    const EMBED: &str = "https://embedvid.net/e/#abc123";
    const EPISODE: &str = "https://site.example/watch/ep-1";
    const API: &str = "https://embedvid.net/api/source/abc123?r=https%3A%2F%2Fembedvid.net%2Fe%2F%23abc123";
    const EMBED_FETCH: &str = "https://embedvid.net/e/";

    fn build(transport: FakeTransport) -> (VendorApiStrategy, Arc<FakeTransport>) {
        let transport = Arc::new(transport);
        let session = Session::new(transport.clone(), CookieScoping::GlobalByName);
        (
            VendorApiStrategy::new(session, VendorProfile::defaults(), "TestAgent/1.0"),
            transport,
        )
    }

    fn embed() -> EmbedReference {
        EmbedReference {
            raw_url: EMBED.to_string(),
            host_class: HostClass::VendorApi { vendor: 0 },
            source: super::super::discovery::EmbedSource::Iframe,
        }
    }

    async fn run(strategy: &VendorApiStrategy) -> (ExtractionOutcome, Vec<StreamDescriptor>) {
        let sink = CollectingSink::<StreamDescriptor>::new();
        let outcome = strategy
            .extract(&embed(), &ExtractionContext::new(EPISODE), &NullSink, &sink)
            .await;
        (outcome, sink.items())
    }

    #[test]
    fn test_vendor_id() {
        assert_eq!(vendor_id("https://embedvid.net/e/#abc123").as_deref(), Some("abc123"));
        assert_eq!(vendor_id("https://embedvid.net/e/xyz789").as_deref(), Some("xyz789"));
        assert_eq!(vendor_id("https://embedvid.net/e/xyz789/?t=1").as_deref(), Some("xyz789"));
        assert_eq!(vendor_id("https://embedvid.net/"), None);
        assert_eq!(vendor_id("https://embedvid.net/#"), None);
        assert_eq!(vendor_id("https://embedvid.net/e/#"), None);
        assert_eq!(vendor_id("not a url"), None);
    }

    #[test]
    fn test_api_url_encodes_referer() {
        let vendor = &VendorProfile::defaults()[0];
        assert_eq!(vendor.api_url("abc123", EMBED), API);
    }

    #[test]
    fn test_find_hls_source() {
        let body = r#"<video>
            <source type="video/mp4" src="https://y/video.mp4">
            <source type="application/x-mpegURL" src="  ">
            <source type="Application/X-MpegURL" src="https://y/video.m3u8">
        </video>"#;
        assert_eq!(find_hls_source(body).as_deref(), Some("https://y/video.m3u8"));
        assert_eq!(find_hls_source("<video></video>"), None);
    }

    #[tokio::test]
    async fn test_api_success() {
        let (strategy, transport) = build(FakeTransport::new().with_page(
            API,
            200,
            r#"{"file":"https://x/video.m3u8","quality":"720p","extra":1}"#,
        ));

        let (outcome, emitted) = run(&strategy).await;
        assert_eq!(outcome.descriptor_count(), 1);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].url, "https://x/video.m3u8");
        assert_eq!(emitted[0].quality, Quality::P720);
        assert_eq!(emitted[0].media_type, MediaType::Hls);
        assert_eq!(emitted[0].referer, EMBED);
        assert_eq!(emitted[0].source_label, "Embedvid");

        let request = &transport.requests_to(API)[0];
        assert_eq!(request.header("referer"), Some(EPISODE));
        assert_eq!(request.header("origin"), Some("https://site.example"));
        assert_eq!(request.header("user-agent"), Some("TestAgent/1.0"));
        assert_eq!(request.header("x-requested-with"), Some("XMLHttpRequest"));
        assert!(transport.requests_to(EMBED_FETCH).is_empty());
    }

    #[tokio::test]
    async fn test_api_500_falls_back_to_embed_page() {
        let (strategy, transport) = build(
            FakeTransport::new()
                .with_page(API, 500, "oops")
                .with_page(
                    EMBED_FETCH,
                    200,
                    r#"<video><source type="application/x-mpegurl" src="https://y/video.m3u8"></video>"#,
                ),
        );

        let (outcome, emitted) = run(&strategy).await;
        assert!(outcome.is_success());
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].url, "https://y/video.m3u8");
        assert_eq!(emitted[0].quality, Quality::Unknown);

        let fallback = &transport.requests_to(EMBED_FETCH)[0];
        assert_eq!(fallback.header("referer"), Some(EPISODE));
        assert_eq!(fallback.header("x-requested-with"), Some("XMLHttpRequest"));
    }

    #[tokio::test]
    async fn test_malformed_and_blank_fall_back() {
        for body in ["<html>not json</html>", r#"{"file":"  ","quality":"1080p"}"#, r#"{"file":null}"#] {
            let (strategy, transport) = build(
                FakeTransport::new()
                    .with_page(API, 200, body)
                    .with_page(EMBED_FETCH, 200, "<p>no player</p>"),
            );
            let (outcome, emitted) = run(&strategy).await;
            assert!(matches!(outcome, ExtractionOutcome::NotFound), "{body}");
            assert!(emitted.is_empty());
            assert_eq!(transport.requests_to(EMBED_FETCH).len(), 1);
        }
    }

    #[tokio::test]
    async fn test_network_errors_are_transient() {
        let (strategy, transport) = build(FakeTransport::new().with_network_error(API));
        let (outcome, emitted) = run(&strategy).await;
        assert!(matches!(outcome, ExtractionOutcome::TransientFailure(_)));
        assert!(emitted.is_empty());
        assert!(transport.requests_to(EMBED_FETCH).is_empty());

        let (strategy, _) = build(
            FakeTransport::new()
                .with_page(API, 404, "")
                .with_network_error(EMBED_FETCH),
        );
        let (outcome, _) = run(&strategy).await;
        assert!(matches!(outcome, ExtractionOutcome::TransientFailure(_)));
    }

    #[tokio::test]
    async fn test_missing_id_is_not_found() {
        let (strategy, transport) = build(FakeTransport::new());
        let sink = CollectingSink::<StreamDescriptor>::new();
        let mut embed = embed();
        embed.raw_url = "https://embedvid.net/".to_string();
        let outcome = strategy
            .extract(&embed, &ExtractionContext::new(EPISODE), &NullSink, &sink)
            .await;
        assert!(matches!(outcome, ExtractionOutcome::NotFound));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_blank_fragment_issues_no_requests() {
        let (strategy, transport) = build(FakeTransport::new());
        let sink = CollectingSink::<StreamDescriptor>::new();
        let mut embed = embed();
        embed.raw_url = "https://embedvid.net/e/#".to_string();

        let outcome = strategy
            .extract(&embed, &ExtractionContext::new(EPISODE), &NullSink, &sink)
            .await;

        assert!(matches!(outcome, ExtractionOutcome::NotFound));
        assert!(sink.is_empty());
        assert!(transport.requests().is_empty());
    }
}
