//! Embed classification table.

use super::discovery::is_absolute_http;
use super::vendor::VendorProfile;
use url::Url;

/// Which extraction strategy an embed should be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostClass {
    /// Known vendor JSON API; `vendor` indexes the resolver's vendor table.
    VendorApi { vendor: usize },
    /// Any other absolute http(s) player, handed to the embed delegate.
    GenericEmbed,
    /// Not resolvable; skipped.
    Unclassified,
}

/// How a rule recognises an embed URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// The URL's host contains this marker.
    HostContains(String),
    /// The URL text contains this marker anywhere.
    UrlContains(String),
}

impl Matcher {
    fn matches(&self, raw_url: &str) -> bool {
        match self {
            Matcher::HostContains(marker) => Url::parse(raw_url)
                .ok()
                .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
                .is_some_and(|host| host.contains(&marker.to_ascii_lowercase())),
            Matcher::UrlContains(marker) => raw_url.contains(marker.as_str()),
        }
    }
}

/// One row of the classification table.
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub name: String,
    pub matcher: Matcher,
    pub class: HostClass,
}

/// Ordered rules, first match wins.
///
/// URLs no rule claims fall through to `GenericEmbed` when they are absolute
/// http(s), otherwise `Unclassified`.
#[derive(Debug, Clone, Default)]
pub struct ClassificationTable {
    rules: Vec<ClassificationRule>,
}

impl ClassificationTable {
    /// Builds the table with one host rule per vendor, in vendor order.
    pub fn for_vendors(vendors: &[VendorProfile]) -> Self {
        let rules = vendors
            .iter()
            .enumerate()
            .map(|(idx, vendor)| ClassificationRule {
                name: vendor.label.clone(),
                matcher: Matcher::HostContains(vendor.host.clone()),
                class: HostClass::VendorApi { vendor: idx },
            })
            .collect();
        Self { rules }
    }

    /// Appends a rule after the existing ones.
    pub fn push(&mut self, rule: ClassificationRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    pub fn classify(&self, raw_url: &str) -> HostClass {
        if let Some(rule) = self.rules.iter().find(|r| r.matcher.matches(raw_url)) {
            return rule.class;
        }
        if is_absolute_http(raw_url) && Url::parse(raw_url).is_ok() {
            HostClass::GenericEmbed
        } else {
            HostClass::Unclassified
        }
    }
}
