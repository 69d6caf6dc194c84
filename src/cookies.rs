//! Session cookie storage.
//!
//! The jar is keyed by cookie name: a cookie set by one site overwrites a
//! same-named cookie set by any other site. [`CookieScoping::Strict`] switches
//! to domain/path matching for callers that need isolation.
//!
//! Also imports Netscape HTTP cookie files, commonly exported by browser
//! extensions, so a session can start with a browser's cookies.

use cookie::Cookie as RawCookie;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// A stored cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Domain attribute, or the host that set the cookie.
    pub domain: Option<String>,
    pub path: Option<String>,
    /// Expiry as unix seconds. Informational only, never enforced.
    pub expires_unix: Option<i64>,
}

impl Cookie {
    /// Creates a cookie without domain/path metadata.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            expires_unix: None,
        }
    }

    /// Parses one `Set-Cookie` header value received from `source`.
    pub fn parse_set_cookie(header: &str, source: &Url) -> Option<Self> {
        let raw = RawCookie::parse(header.to_string()).ok()?;
        if raw.name().is_empty() {
            return None;
        }

        let domain = raw
            .domain()
            .map(|d| d.trim_start_matches('.').to_ascii_lowercase())
            .or_else(|| source.host_str().map(str::to_ascii_lowercase));

        Some(Self {
            name: raw.name().to_string(),
            value: raw.value().to_string(),
            domain,
            path: raw.path().map(str::to_string),
            expires_unix: raw.expires_datetime().map(|t| t.unix_timestamp()),
        })
    }

    fn matches(&self, url: &Url) -> bool {
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        let domain_ok = match &self.domain {
            Some(domain) => host == *domain || host.ends_with(&format!(".{}", domain)),
            None => true,
        };
        let path_ok = match &self.path {
            Some(path) => url.path().starts_with(path.as_str()),
            None => true,
        };
        domain_ok && path_ok
    }
}

/// How cookies are matched against outgoing requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CookieScoping {
    /// One cookie per name, sent to every origin.
    #[default]
    GlobalByName,
    /// Cookies are keyed by name, domain and path and only sent where they match.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CookieKey {
    name: String,
    domain: Option<String>,
    path: Option<String>,
}

/// Thread-safe cookie jar shared by every request of one session.
#[derive(Debug, Default)]
pub struct CookieJar {
    scoping: CookieScoping,
    cookies: Mutex<HashMap<CookieKey, Cookie>>,
}

impl CookieJar {
    /// Creates an empty jar with the given scoping mode.
    pub fn new(scoping: CookieScoping) -> Self {
        Self {
            scoping,
            cookies: Mutex::new(HashMap::new()),
        }
    }

    fn key_for(&self, cookie: &Cookie) -> CookieKey {
        match self.scoping {
            CookieScoping::GlobalByName => CookieKey {
                name: cookie.name.clone(),
                domain: None,
                path: None,
            },
            CookieScoping::Strict => CookieKey {
                name: cookie.name.clone(),
                domain: cookie.domain.clone(),
                path: cookie.path.clone(),
            },
        }
    }

    /// Returns the cookies to send with a request to `url`.
    ///
    /// At most one cookie per name is returned.
    pub fn load_for_request(&self, url: &Url) -> Vec<Cookie> {
        let cookies = self.cookies.lock();
        match self.scoping {
            CookieScoping::GlobalByName => cookies.values().cloned().collect(),
            CookieScoping::Strict => {
                let mut by_name: HashMap<&str, &Cookie> = HashMap::new();
                for cookie in cookies.values().filter(|c| c.matches(url)) {
                    let path_len = |c: &Cookie| c.path.as_deref().map_or(0, str::len);
                    match by_name.get(cookie.name.as_str()) {
                        Some(existing) if path_len(*existing) >= path_len(cookie) => {}
                        _ => {
                            by_name.insert(cookie.name.as_str(), cookie);
                        }
                    }
                }
                by_name.into_values().cloned().collect()
            }
        }
    }

    /// Builds a `Cookie` request header value for `url`, if any cookie applies.
    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        self.cookie_header_except(url, &[])
    }

    /// Like [`CookieJar::cookie_header`], leaving out cookies named in `skip`.
    pub fn cookie_header_except(&self, url: &Url, skip: &[&str]) -> Option<String> {
        let mut pairs: Vec<String> = self
            .load_for_request(url)
            .iter()
            .filter(|c| !skip.contains(&c.name.as_str()))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        if pairs.is_empty() {
            return None;
        }
        pairs.sort();
        Some(pairs.join("; "))
    }

    /// Stores every cookie from the `Set-Cookie` headers of a response from `url`.
    ///
    /// Unparsable header values are skipped.
    pub fn save_from_response<I, S>(&self, url: &Url, set_cookie_headers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed: Vec<Cookie> = set_cookie_headers
            .into_iter()
            .filter_map(|header| Cookie::parse_set_cookie(header.as_ref(), url))
            .collect();
        self.merge(url, parsed);
    }

    /// Upserts already-parsed cookies, defaulting their domain to `url`'s host.
    pub fn merge(&self, url: &Url, cookies: impl IntoIterator<Item = Cookie>) {
        for mut cookie in cookies {
            if cookie.domain.is_none() {
                cookie.domain = url.host_str().map(str::to_ascii_lowercase);
            }
            self.insert(cookie);
        }
    }

    /// Upserts a single cookie, replacing any cookie with the same identity.
    pub fn insert(&self, cookie: Cookie) {
        let key = self.key_for(&cookie);
        self.cookies.lock().insert(key, cookie);
    }

    /// Returns a stored cookie by name.
    pub fn get(&self, name: &str) -> Option<Cookie> {
        self.cookies
            .lock()
            .values()
            .find(|c| c.name == name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.cookies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.lock().is_empty()
    }

    /// Removes every cookie.
    pub fn clear(&self) {
        self.cookies.lock().clear();
    }

    /// Imports cookies from the newest matching Netscape cookie file under `dir`.
    ///
    /// Returns the path of the imported file, if one was found.
    pub fn import_netscape_from_dir(
        &self,
        dir: &Path,
        name_tokens: &[&str],
    ) -> Result<Option<PathBuf>, CookieError> {
        let cookie_path = find_cookie_file(dir, name_tokens)?;
        if let Some(path) = &cookie_path {
            self.import_netscape_file(path)?;
        }
        Ok(cookie_path)
    }

    /// Imports every cookie of a Netscape cookie file. Returns the number imported.
    pub fn import_netscape_file(&self, path: &Path) -> Result<usize, CookieError> {
        let cookies = parse_netscape_cookie_file(path)?;
        let count = cookies.len();
        for cookie in cookies {
            self.insert(cookie);
        }
        Ok(count)
    }
}

/// Errors that can occur while importing cookie files.
#[derive(Error, Debug)]
pub enum CookieError {
    /// Failed to read or walk the filesystem.
    #[error("Failed to read cookie file: {0}")]
    Io(#[from] std::io::Error),

    /// Cookie file contains an invalid line.
    #[error("Invalid Netscape cookie line: {0}")]
    InvalidLine(String),

    /// Cookie domain is empty.
    #[error("Invalid cookie domain: {0}")]
    InvalidDomain(String),
}

fn find_cookie_file(
    root: &Path,
    name_tokens: &[&str],
) -> Result<Option<PathBuf>, std::io::Error> {
    let mut best: Option<(PathBuf, std::time::SystemTime)> = None;
    find_cookie_file_recursive(root, name_tokens, &mut best)?;
    Ok(best.map(|(path, _)| path))
}

fn find_cookie_file_recursive(
    dir: &Path,
    name_tokens: &[&str],
    best: &mut Option<(PathBuf, std::time::SystemTime)>,
) -> Result<(), std::io::Error> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            find_cookie_file_recursive(&path, name_tokens, best)?;
            continue;
        }

        let file_name = match path.file_name().and_then(OsStr::to_str) {
            Some(name) => name.to_ascii_lowercase(),
            None => continue,
        };

        if !file_name.ends_with(".txt")
            || !name_tokens
                .iter()
                .all(|token| file_name.contains(&token.to_ascii_lowercase()))
        {
            continue;
        }

        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);

        if best.as_ref().is_none_or(|(_, best_time)| modified > *best_time) {
            *best = Some((path, modified));
        }
    }

    Ok(())
}

fn parse_netscape_cookie_file(path: &Path) -> Result<Vec<Cookie>, CookieError> {
    let content = std::fs::read_to_string(path)?;
    let mut cookies = Vec::new();

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        let line = match line.strip_prefix("#HttpOnly_") {
            Some(stripped) => stripped,
            None if line.starts_with('#') => continue,
            None => line,
        };

        let fields: Vec<&str> = line.splitn(7, '\t').collect();
        let [domain, _include_subdomains, path, _secure, expires_raw, name, value] = fields[..]
        else {
            return Err(CookieError::InvalidLine(line.to_string()));
        };

        let host = domain.trim_start_matches('.');
        if host.is_empty() {
            return Err(CookieError::InvalidDomain(domain.to_string()));
        }

        let expires_unix = expires_raw.parse::<i64>().ok().filter(|ts| *ts != 0);

        cookies.push(Cookie {
            name: name.to_string(),
            value: value.to_string(),
            domain: Some(host.to_ascii_lowercase()),
            path: Some(path.to_string()),
            expires_unix,
        });
    }

    Ok(cookies)
}
