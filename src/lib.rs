//! Embedscout - episode page to playable stream resolver.
//!
//! This library provides functionality for:
//! - A per-client cookie jar shared by every request, with Netscape file import
//! - Page fetching with optional bot-challenge solving
//! - Discovering embedded players on an episode page and resolving them to
//!   HLS/MP4 stream descriptors through vendor APIs or a generic delegate

pub mod challenge;
pub mod config;
pub mod console;
pub mod cookies;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod model;
pub mod resolver;
pub mod session;
pub mod sink;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::Config;
pub use console::Console;
pub use cookies::{Cookie, CookieJar, CookieScoping};
pub use error::{ConfigError, FetchError, ResolveError};
pub use fetcher::{Page, PageFetcher};
pub use model::{MediaType, Quality, StreamDescriptor, SubtitleTrack};
pub use resolver::{EmbedDelegate, HlsProbeDelegate, LinkResolver, VendorProfile};
pub use session::Session;
pub use sink::{ChannelSink, CollectingSink, NullSink, StreamSink, SubtitleSink};
