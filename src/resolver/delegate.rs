//! Hand-off of generic embeds to a shared embed resolver.

use super::discovery::{EmbedReference, normalize_url};
use super::strategy::{ExtractionContext, ExtractionOutcome, ExtractionStrategy};
use crate::model::{MediaType, Quality, StreamDescriptor, SubtitleTrack};
use crate::session::Session;
use crate::sink::{StreamSink, SubtitleSink, TeeSink};
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::debug;
use url::Url;

/// Resolves arbitrary third-party player URLs.
#[async_trait]
pub trait EmbedDelegate: Send + Sync {
    /// Emits whatever it finds for `embed_url` and returns true if anything was emitted.
    async fn resolve(
        &self,
        embed_url: &str,
        referer: &str,
        subtitles: &dyn SubtitleSink,
        streams: &dyn StreamSink,
    ) -> bool;
}

async fn hand_off(
    delegate: &dyn EmbedDelegate,
    embed: &EmbedReference,
    ctx: &ExtractionContext,
    subtitles: &dyn SubtitleSink,
    streams: &dyn StreamSink,
) -> ExtractionOutcome {
    let tee = TeeSink::new(streams);
    let resolved = delegate
        .resolve(&embed.raw_url, &ctx.episode_url, subtitles, &tee)
        .await;
    let seen = tee.into_seen();
    if resolved || !seen.is_empty() {
        ExtractionOutcome::Success(seen)
    } else {
        ExtractionOutcome::NotFound
    }
}

/// Sends iframe embeds straight to the delegate.
pub struct DirectEmbedStrategy {
    delegate: Arc<dyn EmbedDelegate>,
}

impl DirectEmbedStrategy {
    pub fn new(delegate: Arc<dyn EmbedDelegate>) -> Self {
        Self { delegate }
    }
}

#[async_trait]
impl ExtractionStrategy for DirectEmbedStrategy {
    fn name(&self) -> &'static str {
        "direct_embed"
    }

    async fn extract(
        &self,
        embed: &EmbedReference,
        ctx: &ExtractionContext,
        subtitles: &dyn SubtitleSink,
        streams: &dyn StreamSink,
    ) -> ExtractionOutcome {
        hand_off(self.delegate.as_ref(), embed, ctx, subtitles, streams).await
    }
}

/// Sends URLs found by script patterns to the delegate. Does no I/O itself.
pub struct ScriptPatternStrategy {
    delegate: Arc<dyn EmbedDelegate>,
}

impl ScriptPatternStrategy {
    pub fn new(delegate: Arc<dyn EmbedDelegate>) -> Self {
        Self { delegate }
    }
}

#[async_trait]
impl ExtractionStrategy for ScriptPatternStrategy {
    fn name(&self) -> &'static str {
        "script_pattern"
    }

    async fn extract(
        &self,
        embed: &EmbedReference,
        ctx: &ExtractionContext,
        subtitles: &dyn SubtitleSink,
        streams: &dyn StreamSink,
    ) -> ExtractionOutcome {
        hand_off(self.delegate.as_ref(), embed, ctx, subtitles, streams).await
    }
}

static SOURCE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("video[src], source[src]").unwrap());

static TRACK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("track[src]").unwrap());

static FILE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"file\s*:\s*["']([^"']+)["']"#).unwrap());

static M3U8_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["']((?:https?:)?\\?/\\?/[^"'\s]+?\.m3u8[^"'\s]*)["']"#).unwrap());

/// Minimal built-in delegate for players that expose their media URL in markup.
///
/// Direct `.m3u8`/`.mp4` URLs are emitted as-is. Otherwise the embed page is
/// fetched with the episode as Referer and scanned for `<source>`/`<video>`
/// elements, `file: "..."` assignments and quoted `.m3u8` URLs.
pub struct HlsProbeDelegate {
    session: Session,
    label: String,
}

impl HlsProbeDelegate {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            label: "Direct".to_string(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    fn descriptor(&self, url: &str, embed_url: &str, quality: Quality) -> StreamDescriptor {
        StreamDescriptor::new(
            self.label.clone(),
            url,
            embed_url,
            quality,
            MediaType::from_url(url),
        )
    }
}

/// Media URL found on an embed page, with the quality label if one was given.
#[derive(Debug, PartialEq, Eq)]
struct ProbeHit {
    url: String,
    quality: Quality,
}

fn is_direct_media(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    path.ends_with(".m3u8") || path.ends_with(".mp4")
}

/// Scans an embed page for media URLs and subtitle tracks.
fn probe_page(body: &str, base: &Url) -> (Vec<ProbeHit>, Vec<SubtitleTrack>) {
    let doc = Html::parse_document(body);
    let mut seen = HashSet::new();
    let mut hits = Vec::new();
    let mut push = |raw: &str, quality: Quality| {
        let normalized = normalize_url(raw);
        let Ok(url) = base.join(&normalized) else {
            return;
        };
        if !is_direct_media(url.as_str()) {
            return;
        }
        if seen.insert(url.to_string()) {
            hits.push(ProbeHit {
                url: url.to_string(),
                quality,
            });
        }
    };

    for element in doc.select(&SOURCE_SELECTOR) {
        if let Some(src) = element.value().attr("src") {
            let label = element.value().attr("label").or(element.value().attr("size"));
            let quality = label
                .map(|l| {
                    if l.ends_with('p') {
                        l.to_string()
                    } else {
                        format!("{}p", l)
                    }
                })
                .map_or(Quality::Unknown, |l| Quality::from_label(Some(&l)));
            push(src, quality);
        }
    }
    for caps in FILE_REGEX.captures_iter(body) {
        push(&caps[1], Quality::Unknown);
    }
    for caps in M3U8_REGEX.captures_iter(body) {
        push(&caps[1], Quality::Unknown);
    }

    let subtitles = doc
        .select(&TRACK_SELECTOR)
        .filter(|track| {
            track
                .value()
                .attr("kind")
                .is_none_or(|kind| kind.eq_ignore_ascii_case("captions") || kind.eq_ignore_ascii_case("subtitles"))
        })
        .filter_map(|track| {
            let src = track.value().attr("src")?;
            let url = base.join(&normalize_url(src)).ok()?;
            let language = track
                .value()
                .attr("label")
                .or(track.value().attr("srclang"))
                .unwrap_or("Unknown");
            Some(SubtitleTrack {
                language: language.to_string(),
                url: url.to_string(),
            })
        })
        .collect();

    (hits, subtitles)
}

#[async_trait]
impl EmbedDelegate for HlsProbeDelegate {
    async fn resolve(
        &self,
        embed_url: &str,
        referer: &str,
        subtitles: &dyn SubtitleSink,
        streams: &dyn StreamSink,
    ) -> bool {
        if is_direct_media(embed_url) {
            streams.emit(self.descriptor(embed_url, referer, Quality::Unknown));
            return true;
        }

        let Ok(mut url) = Url::parse(embed_url) else {
            return false;
        };
        url.set_fragment(None);

        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(referer) {
            headers.insert(REFERER, value);
        }

        let response = match self.session.get(&url, headers).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                debug!(url = %url, status = response.status, "embed page unavailable");
                return false;
            }
            Err(err) => {
                debug!(url = %url, error = %err, "embed page request failed");
                return false;
            }
        };

        let (hits, tracks) = probe_page(&response.body, &url);
        for track in tracks {
            subtitles.emit(track);
        }
        let found = !hits.is_empty();
        for hit in hits {
            streams.emit(self.descriptor(&hit.url, embed_url, hit.quality));
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::CookieScoping;
    use crate::resolver::classify::HostClass;
    use crate::resolver::discovery::EmbedSource;
    use crate::sink::{CollectingSink, NullSink};
    use crate::testing::{FakeDelegate, FakeTransport};

    const EPISODE: &str = "https://site.example/watch/ep-1";

    fn generic(url: &str, source: EmbedSource) -> EmbedReference {
        EmbedReference {
            raw_url: url.to_string(),
            host_class: HostClass::GenericEmbed,
            source,
        }
    }

    #[tokio::test]
    async fn test_strategies_hand_off_with_episode_referer() {
        let delegate = Arc::new(FakeDelegate::default());
        let direct = DirectEmbedStrategy::new(delegate.clone());
        let script = ScriptPatternStrategy::new(delegate.clone());
        let ctx = ExtractionContext::new(EPISODE);
        let sink = CollectingSink::<StreamDescriptor>::new();

        let ok = direct
            .extract(&generic("https://good.example/e/1", EmbedSource::Iframe), &ctx, &NullSink, &sink)
            .await;
        let missing = script
            .extract(
                &generic(
                    "https://bad.example/e/2",
                    EmbedSource::Script {
                        pattern: "player_url".to_string(),
                    },
                ),
                &ctx,
                &NullSink,
                &sink,
            )
            .await;

        assert_eq!(ok.descriptor_count(), 1);
        assert!(matches!(missing, ExtractionOutcome::NotFound));
        assert_eq!(sink.len(), 1);
        assert_eq!(
            delegate.calls(),
            vec![
                ("https://good.example/e/1".to_string(), EPISODE.to_string()),
                ("https://bad.example/e/2".to_string(), EPISODE.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_probe_direct_media_skips_fetch() {
        let transport = Arc::new(FakeTransport::new());
        let probe = HlsProbeDelegate::new(Session::new(transport.clone(), CookieScoping::GlobalByName));
        let sink = CollectingSink::<StreamDescriptor>::new();

        assert!(probe.resolve("https://cdn.example/a/master.m3u8", EPISODE, &NullSink, &sink).await);
        assert!(transport.requests().is_empty());
        let streams = sink.items();
        assert_eq!(streams[0].media_type, MediaType::Hls);
        assert_eq!(streams[0].referer, EPISODE);
    }

    #[tokio::test]
    async fn test_probe_scans_embed_page() {
        let body = r#"<html><body>
            <video><source src="/media/720.mp4" label="720p"><source src="/media/480.mp4" size="480">
            <track kind="captions" srclang="en" label="English" src="/subs/en.vtt"></video>
            <script>player.setup({file: "https:\/\/cdn.example\/hls\/master.m3u8"});
            var backup = "https://cdn.example/hls/master.m3u8";</script>
        </body></html>"#;
        let transport = Arc::new(FakeTransport::new().with_page("https://player.example/e/1", 200, body));
        let probe = HlsProbeDelegate::new(Session::new(transport.clone(), CookieScoping::GlobalByName))
            .with_label("Player");
        let streams = CollectingSink::<StreamDescriptor>::new();
        let subtitles = CollectingSink::<SubtitleTrack>::new();

        assert!(probe.resolve("https://player.example/e/1#t=5", EPISODE, &subtitles, &streams).await);

        let urls: Vec<(String, Quality)> = streams.items().into_iter().map(|s| (s.url, s.quality)).collect();
        assert_eq!(
            urls,
            vec![
                ("https://player.example/media/720.mp4".to_string(), Quality::P720),
                ("https://player.example/media/480.mp4".to_string(), Quality::P480),
                ("https://cdn.example/hls/master.m3u8".to_string(), Quality::Unknown),
            ]
        );
        assert!(streams.items().iter().all(|s| s.source_label == "Player"));

        assert_eq!(
            subtitles.items(),
            vec![SubtitleTrack {
                language: "English".to_string(),
                url: "https://player.example/subs/en.vtt".to_string(),
            }]
        );
        assert_eq!(transport.requests()[0].header("referer"), Some(EPISODE));
    }

    #[tokio::test]
    async fn test_probe_failed_page_reports_false() {
        let transport = Arc::new(FakeTransport::new().with_network_error("https://player.example/e/1"));
        let probe = HlsProbeDelegate::new(Session::new(transport, CookieScoping::GlobalByName));
        let sink = CollectingSink::<StreamDescriptor>::new();
        assert!(!probe.resolve("https://player.example/e/1", EPISODE, &NullSink, &sink).await);
        assert!(!probe.resolve("https://player.example/e/404", EPISODE, &NullSink, &sink).await);
        assert!(sink.is_empty());
    }
}
