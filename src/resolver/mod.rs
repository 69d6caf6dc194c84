//! Link resolution: turns an episode page into playable stream descriptors.
//!
//! An episode page is fetched once, every embed reference on it is discovered
//! and classified, and each reference is handed to the strategy for its class.
//! Descriptors reach the caller's sink as soon as a strategy finds them.

pub mod classify;
pub mod delegate;
pub mod discovery;
pub mod strategy;
pub mod vendor;

pub use classify::{ClassificationRule, ClassificationTable, HostClass, Matcher};
pub use delegate::{DirectEmbedStrategy, EmbedDelegate, HlsProbeDelegate, ScriptPatternStrategy};
pub use discovery::{EmbedReference, EmbedSource, ScriptPattern, ScriptScanner, discover_embeds};
pub use strategy::{ExtractionContext, ExtractionOutcome, ExtractionStrategy};
pub use vendor::{VendorApiStrategy, VendorProfile};

use crate::config::Config;
use crate::error::ResolveError;
use crate::fetcher::{Page, PageFetcher};
use crate::sink::{Emitter, StreamSink, SubtitleSink};
use futures::stream::{self, StreamExt};
use reqwest::header::HeaderMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves episode pages into stream descriptors.
pub struct LinkResolver {
    fetcher: PageFetcher,
    scanner: ScriptScanner,
    table: ClassificationTable,
    vendor: VendorApiStrategy,
    direct: DirectEmbedStrategy,
    script: ScriptPatternStrategy,
    concurrency: usize,
    page_via_challenge: bool,
}

impl LinkResolver {
    /// Builds a resolver whose vendor table and limits come from `config`.
    ///
    /// Generic embeds, whether found in iframes or scripts, go to `delegate`.
    pub fn new(fetcher: PageFetcher, delegate: Arc<dyn EmbedDelegate>, config: &Config) -> Self {
        let vendor = VendorApiStrategy::new(
            fetcher.session().clone(),
            config.vendors.clone(),
            config.http.user_agent.clone(),
        );
        Self {
            table: ClassificationTable::for_vendors(&config.vendors),
            scanner: ScriptScanner::default(),
            vendor,
            direct: DirectEmbedStrategy::new(delegate.clone()),
            script: ScriptPatternStrategy::new(delegate),
            concurrency: config.resolver.concurrency.max(1),
            page_via_challenge: config.resolver.page_via_challenge,
            fetcher,
        }
    }

    /// Adds a script pattern after the built-in ones.
    pub fn with_pattern(mut self, pattern: ScriptPattern) -> Self {
        self.scanner.push(pattern);
        self
    }

    /// Adds a classification rule after the vendor rules.
    pub fn with_rule(mut self, rule: ClassificationRule) -> Self {
        self.table.push(rule);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Discovers and classifies every embed on an already fetched page.
    pub fn discover(&self, page: &Page) -> Vec<EmbedReference> {
        let doc = page.html();
        discover_embeds(&doc, &self.scanner)
            .into_iter()
            .map(|mut embed| {
                embed.host_class = self.table.classify(&embed.raw_url);
                embed
            })
            .collect()
    }

    /// Resolves every embed on `episode_url`.
    ///
    /// Returns `Ok(true)` if at least one stream descriptor was emitted. Only a
    /// failure to fetch the episode page itself is an error; per-embed failures
    /// are logged and skipped. With a concurrency of 1, descriptors are emitted
    /// in discovery order.
    pub async fn resolve_links(
        &self,
        episode_url: &str,
        subtitles: &dyn SubtitleSink,
        streams: &dyn StreamSink,
    ) -> Result<bool, ResolveError> {
        let page = self
            .fetcher
            .fetch(episode_url, HeaderMap::new(), self.page_via_challenge)
            .await
            .map_err(|source| ResolveError::PageUnavailable {
                url: episode_url.to_string(),
                source,
            })?;

        let embeds = self.discover(&page);
        if embeds.is_empty() {
            info!(url = %episode_url, "no embeds found on page");
            return Ok(false);
        }
        debug!(url = %episode_url, count = embeds.len(), "discovered embeds");

        let ctx = ExtractionContext::new(episode_url);
        let emitter = Emitter::new(subtitles, streams);

        let outcomes: Vec<ExtractionOutcome> = stream::iter(&embeds)
            .map(|embed| self.dispatch(embed, &ctx, &emitter))
            .buffered(self.concurrency)
            .collect()
            .await;

        for (embed, outcome) in embeds.iter().zip(&outcomes) {
            match outcome {
                ExtractionOutcome::TransientFailure(err) => {
                    debug!(embed = %embed.raw_url, error = %err, "embed failed")
                }
                other => debug!(
                    embed = %embed.raw_url,
                    outcome = other.kind(),
                    streams = other.descriptor_count(),
                    "embed done"
                ),
            }
        }

        let emitted = emitter.emitted();
        info!(url = %episode_url, embeds = embeds.len(), streams = emitted, "resolution finished");
        Ok(emitted > 0)
    }

    async fn dispatch(
        &self,
        embed: &EmbedReference,
        ctx: &ExtractionContext,
        emitter: &Emitter<'_>,
    ) -> ExtractionOutcome {
        let strategy: &dyn ExtractionStrategy = match embed.host_class {
            HostClass::VendorApi { .. } => &self.vendor,
            HostClass::GenericEmbed if embed.from_script() => &self.script,
            HostClass::GenericEmbed => &self.direct,
            HostClass::Unclassified => {
                debug!(embed = %embed.raw_url, "skipping unclassified embed");
                return ExtractionOutcome::NotFound;
            }
        };
        debug!(embed = %embed.raw_url, strategy = strategy.name(), "dispatching embed");
        strategy.extract(embed, ctx, emitter, emitter).await
    }
}
