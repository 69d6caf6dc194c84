//! Embed discovery: iframes and inline script patterns.

use super::classify::HostClass;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;

static IFRAME_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("iframe[src]").unwrap());

static SCRIPT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script:not([src])").unwrap());

static ONCLICK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[onclick]").unwrap());

/// Where an embed reference was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedSource {
    Iframe,
    /// Found by the named script pattern.
    Script { pattern: String },
}

/// A discovered URL pointing at a third-party player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedReference {
    pub raw_url: String,
    pub host_class: HostClass,
    pub source: EmbedSource,
}

impl EmbedReference {
    /// Creates a reference that has not been classified yet.
    pub fn new(raw_url: impl Into<String>, source: EmbedSource) -> Self {
        Self {
            raw_url: raw_url.into(),
            host_class: HostClass::Unclassified,
            source,
        }
    }

    pub fn from_script(&self) -> bool {
        matches!(self.source, EmbedSource::Script { .. })
    }
}

/// A named regex whose first capture group is an embed URL.
#[derive(Debug, Clone)]
pub struct ScriptPattern {
    pub name: String,
    pub regex: Regex,
}

impl ScriptPattern {
    /// Compiles a pattern; the first capture group must hold the URL.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            regex: Regex::new(pattern)?,
        })
    }
}

static DEFAULT_PATTERNS: LazyLock<Vec<ScriptPattern>> = LazyLock::new(|| {
    vec![
        // var player_url = "https://...";
        ScriptPattern::new("player_url", r#"player_url\s*=\s*["']([^"']+)["']"#).unwrap(),
        // onclick="loadPlayer('https://...')"
        ScriptPattern::new("player_call", r#"\w*[Pp]layer\w*\(\s*["']([^"']+)["']"#).unwrap(),
        // video[0] = 'https://...';
        ScriptPattern::new("video_index", r#"video\[\d+\]\s*=\s*["']([^"']+)["']"#).unwrap(),
    ]
});

/// Ordered list of script patterns. New site quirks add a pattern here.
#[derive(Debug, Clone)]
pub struct ScriptScanner {
    patterns: Vec<ScriptPattern>,
}

impl Default for ScriptScanner {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PATTERNS.clone(),
        }
    }
}

impl ScriptScanner {
    /// Creates a scanner with no patterns.
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Appends a pattern after the existing ones.
    pub fn push(&mut self, pattern: ScriptPattern) {
        self.patterns.push(pattern);
    }

    /// Runs every pattern, in order, over one script text.
    pub fn scan(&self, text: &str) -> Vec<EmbedReference> {
        let mut found = Vec::new();
        for pattern in &self.patterns {
            for caps in pattern.regex.captures_iter(text) {
                let Some(url) = caps.get(1).map(|m| normalize_url(m.as_str())) else {
                    continue;
                };
                if url.is_empty() {
                    continue;
                }
                found.push(EmbedReference::new(
                    url,
                    EmbedSource::Script {
                        pattern: pattern.name.clone(),
                    },
                ));
            }
        }
        found
    }
}

/// Finds every embed reference in a document.
///
/// Iframes come first in document order, then inline scripts and `onclick`
/// handlers. Duplicate URLs are kept.
pub fn discover_embeds(doc: &Html, scanner: &ScriptScanner) -> Vec<EmbedReference> {
    let mut embeds: Vec<EmbedReference> = doc
        .select(&IFRAME_SELECTOR)
        .filter_map(|iframe| iframe.value().attr("src"))
        .map(normalize_url)
        .filter(|src| is_absolute_http(src))
        .map(|src| EmbedReference::new(src, EmbedSource::Iframe))
        .collect();

    for script in doc.select(&SCRIPT_SELECTOR) {
        let text: String = script.text().collect();
        if !text.trim().is_empty() {
            embeds.extend(scanner.scan(&text));
        }
    }

    for element in doc.select(&ONCLICK_SELECTOR) {
        if let Some(handler) = element.value().attr("onclick") {
            embeds.extend(scanner.scan(handler));
        }
    }

    embeds
}

/// Trims, unescapes JSON-style slashes and upgrades protocol-relative URLs.
pub(crate) fn normalize_url(raw: &str) -> String {
    let url = raw.trim().replace("\\/", "/");
    if url.starts_with("//") {
        format!("https:{}", url)
    } else {
        url
    }
}

pub(crate) fn is_absolute_http(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
