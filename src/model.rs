//! Stream descriptors and related value types produced by link resolution.

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Vertical resolution of a stream, as advertised by its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Quality {
    #[default]
    Unknown,
    P360,
    P480,
    P720,
    P1080,
    P2160,
}

impl Quality {
    /// Maps a vendor quality label such as `"720p"` to a [`Quality`].
    ///
    /// Only the exact labels `360p`, `480p`, `720p`, `1080p` and `2160p` are
    /// recognized; everything else, including `None`, is `Unknown`.
    pub fn from_label(label: Option<&str>) -> Self {
        match label {
            Some("360p") => Quality::P360,
            Some("480p") => Quality::P480,
            Some("720p") => Quality::P720,
            Some("1080p") => Quality::P1080,
            Some("2160p") => Quality::P2160,
            _ => Quality::Unknown,
        }
    }

    /// Numeric height in pixels, 0 for `Unknown`.
    pub fn value(self) -> u32 {
        match self {
            Quality::Unknown => 0,
            Quality::P360 => 360,
            Quality::P480 => 480,
            Quality::P720 => 720,
            Quality::P1080 => 1080,
            Quality::P2160 => 2160,
        }
    }
}

impl Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Quality::Unknown => write!(f, "unknown"),
            other => write!(f, "{}p", other.value()),
        }
    }
}

/// Container/protocol of a resolved stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Hls,
    Other,
}

impl MediaType {
    /// Guesses the media type from a URL path.
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if path.to_ascii_lowercase().ends_with(".m3u8") {
            MediaType::Hls
        } else {
            MediaType::Other
        }
    }
}

/// A resolved, playable stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Name of the source that produced the stream (vendor or delegate label).
    pub source_label: String,

    /// Human readable name for listings.
    pub display_name: String,

    /// Playable URL.
    pub url: String,

    /// Referer the player must send when fetching `url`.
    pub referer: String,

    pub quality: Quality,

    pub media_type: MediaType,
}

impl StreamDescriptor {
    /// Creates a descriptor whose display name equals its source label.
    pub fn new(
        source_label: impl Into<String>,
        url: impl Into<String>,
        referer: impl Into<String>,
        quality: Quality,
        media_type: MediaType,
    ) -> Self {
        let source_label = source_label.into();
        Self {
            display_name: source_label.clone(),
            source_label,
            url: url.into(),
            referer: referer.into(),
            quality,
            media_type,
        }
    }
}

/// A subtitle file discovered alongside a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub language: String,
    pub url: String,
}
