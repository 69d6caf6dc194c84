//! Extraction strategy seam and its outcome type.

use super::discovery::EmbedReference;
use crate::error::FetchError;
use crate::model::StreamDescriptor;
use crate::sink::{StreamSink, SubtitleSink};
use async_trait::async_trait;
use url::Url;

/// Result of running one strategy on one embed.
#[derive(Debug)]
pub enum ExtractionOutcome {
    /// Descriptors that were emitted to the sink.
    Success(Vec<StreamDescriptor>),
    NotFound,
    /// Network failure mid-strategy. Counts as `NotFound` when aggregating.
    TransientFailure(FetchError),
}

impl ExtractionOutcome {
    pub fn descriptor_count(&self) -> usize {
        match self {
            ExtractionOutcome::Success(found) => found.len(),
            _ => 0,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionOutcome::Success(_))
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionOutcome::Success(_) => "success",
            ExtractionOutcome::NotFound => "not_found",
            ExtractionOutcome::TransientFailure(_) => "transient_failure",
        }
    }
}

/// Per-resolution facts shared by all strategies.
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    /// The episode page being resolved; sent as Referer.
    pub episode_url: String,
    /// `scheme://host[:port]` of the episode page; sent as Origin.
    pub site_origin: String,
}

impl ExtractionContext {
    pub fn new(episode_url: &str) -> Self {
        let site_origin = Url::parse(episode_url)
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_default();
        Self {
            episode_url: episode_url.to_string(),
            site_origin,
        }
    }
}

/// Turns one embed reference into zero or more stream descriptors.
///
/// Descriptors are emitted to `streams` as soon as they are found. Failures
/// are reported through the outcome and never escape the strategy.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(
        &self,
        embed: &EmbedReference,
        ctx: &ExtractionContext,
        subtitles: &dyn SubtitleSink,
        streams: &dyn StreamSink,
    ) -> ExtractionOutcome;
}
