//! Cookie jar keyed by domain and name.
//!
//! Cookies arrive as `Set-Cookie` header values, are matched against request
//! URLs when building the `Cookie` header, and are persisted in the Netscape
//! cookie file layout that curl and browsers' export tools understand.

use crate::{StorageError, StorageResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::BTreeMap;
use tracing::warn;
use url::Url;

const NETSCAPE_HEADER: &str = "# Netscape HTTP Cookie File";
const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// Date layouts seen in `Expires` attributes, after RFC 2822.
const EXPIRES_FORMATS: &[&str] = &[
    "%a, %d-%b-%Y %H:%M:%S GMT",
    "%a, %d %b %Y %H:%M:%S GMT",
    "%A, %d-%b-%y %H:%M:%S GMT",
    "%a %b %e %H:%M:%S %Y",
];

/// A single stored cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Domain without a leading dot, lowercased
    pub domain: String,
    /// Path
    pub path: String,
    /// Expiry timestamp (Unix seconds), 0 for a session cookie
    pub expires: i64,
    /// Only sent over https
    pub secure: bool,
    /// Not exposed to scripts
    pub http_only: bool,
    /// Sent to the exact domain only, not its subdomains
    pub host_only: bool,
}

impl Cookie {
    /// Check if the cookie is expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }

    fn is_expired_at(&self, now: i64) -> bool {
        self.expires != 0 && self.expires <= now
    }

    /// Parse a `Set-Cookie` header value received in response to `url`.
    ///
    /// Returns `None` for malformed values and for cookies whose `Domain`
    /// attribute does not cover the responding host.
    pub fn parse(header: &str, url: &Url) -> Option<Cookie> {
        Self::parse_at(header, url, Utc::now().timestamp())
    }

    fn parse_at(header: &str, url: &Url, now: i64) -> Option<Cookie> {
        let host = url.host_str()?.to_ascii_lowercase();
        let mut parts = header.split(';');

        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie {
            name: name.to_string(),
            value: value.trim().trim_matches('"').to_string(),
            domain: host.clone(),
            path: default_path(url),
            expires: 0,
            secure: false,
            http_only: false,
            host_only: true,
        };
        let mut max_age = None;

        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attr.trim(), ""),
            };
            match key.to_ascii_lowercase().as_str() {
                "domain" => {
                    let domain = val.trim_start_matches('.').to_ascii_lowercase();
                    if domain.is_empty() {
                        continue;
                    }
                    if !domain_matches(&host, &domain) {
                        return None;
                    }
                    cookie.domain = domain;
                    cookie.host_only = false;
                }
                "path" if val.starts_with('/') => cookie.path = val.to_string(),
                "expires" => {
                    if let Some(ts) = parse_expires(val) {
                        // A past date of exactly the epoch still means "delete".
                        cookie.expires = ts.max(1);
                    }
                }
                "max-age" => max_age = val.parse::<i64>().ok(),
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                _ => {}
            }
        }

        if let Some(secs) = max_age {
            cookie.expires = if secs <= 0 { 1 } else { now.saturating_add(secs) };
        }

        Some(cookie)
    }

    fn matches(&self, url: &Url, now: i64) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();

        let domain_ok = if self.host_only {
            host == self.domain
        } else {
            domain_matches(&host, &self.domain)
        };

        domain_ok
            && path_matches(url.path(), &self.path)
            && (!self.secure || url.scheme() == "https")
            && !self.is_expired_at(now)
    }

    fn to_netscape_line(&self) -> String {
        let domain = if self.host_only {
            self.domain.clone()
        } else {
            format!(".{}", self.domain)
        };
        format!(
            "{}{}\t{}\t{}\t{}\t{}\t{}\t{}",
            if self.http_only { HTTP_ONLY_PREFIX } else { "" },
            domain,
            bool_field(!self.host_only),
            self.path,
            bool_field(self.secure),
            self.expires,
            self.name,
            self.value
        )
    }

    fn from_netscape_line(line: &str) -> StorageResult<Cookie> {
        let (http_only, line) = match line.strip_prefix(HTTP_ONLY_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, line),
        };

        let fields: Vec<&str> = line.splitn(7, '\t').collect();
        if fields.len() != 7 {
            return Err(StorageError::Encoding(format!(
                "expected 7 tab-separated fields, found {}",
                fields.len()
            )));
        }

        let include_subdomains = fields[1].eq_ignore_ascii_case("TRUE");
        let expires = fields[4]
            .parse::<i64>()
            .map_err(|e| StorageError::Encoding(format!("invalid expiry {:?}: {}", fields[4], e)))?;

        Ok(Cookie {
            name: fields[5].to_string(),
            value: fields[6].to_string(),
            domain: fields[0].trim_start_matches('.').to_ascii_lowercase(),
            path: fields[2].to_string(),
            expires,
            secure: fields[3].eq_ignore_ascii_case("TRUE"),
            http_only,
            host_only: !include_subdomains && !fields[0].starts_with('.'),
        })
    }
}

/// In-memory cookie store. At most one cookie per (domain, name).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: BTreeMap<(String, String), Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Insert a cookie, replacing any with the same domain and name.
    /// An expired cookie removes the stored one instead.
    pub fn insert(&mut self, cookie: Cookie) {
        let key = (cookie.domain.clone(), cookie.name.clone());
        if cookie.is_expired() {
            self.cookies.remove(&key);
        } else {
            self.cookies.insert(key, cookie);
        }
    }

    /// Store every `Set-Cookie` value from a response to `url`.
    /// Returns the number of values that were accepted.
    pub fn store_response_cookies<'a, I>(&mut self, url: &Url, headers: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut accepted = 0;
        for header in headers {
            match Cookie::parse(header, url) {
                Some(cookie) => {
                    self.insert(cookie);
                    accepted += 1;
                }
                None => warn!(url = %url, "Ignoring malformed Set-Cookie header"),
            }
        }
        accepted
    }

    /// Build the `Cookie` request header for `url`, if any cookie applies.
    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        let now = Utc::now().timestamp();
        let mut matching: Vec<&Cookie> = self
            .cookies
            .values()
            .filter(|c| c.matches(url, now))
            .collect();
        if matching.is_empty() {
            return None;
        }

        // Longer paths first.
        matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        Some(
            matching
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Value of the named cookie that would be sent to `url`.
    pub fn value_for(&self, url: &Url, name: &str) -> Option<&str> {
        let now = Utc::now().timestamp();
        self.cookies
            .values()
            .filter(|c| c.name == name && c.matches(url, now))
            .max_by_key(|c| c.path.len())
            .map(|c| c.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.values()
    }

    /// Serialize to the Netscape cookie file layout, skipping expired cookies.
    pub fn to_netscape(&self) -> String {
        let mut out = String::from(NETSCAPE_HEADER);
        out.push('\n');
        for cookie in self.cookies.values().filter(|c| !c.is_expired()) {
            out.push_str(&cookie.to_netscape_line());
            out.push('\n');
        }
        out
    }

    /// Parse a Netscape cookie file. Malformed lines are skipped with a warning.
    pub fn from_netscape(content: &str) -> CookieJar {
        let mut jar = CookieJar::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty()
                || (line.starts_with('#') && !line.starts_with(HTTP_ONLY_PREFIX))
            {
                continue;
            }
            match Cookie::from_netscape_line(line) {
                Ok(cookie) => jar.insert(cookie),
                Err(e) => warn!(line = idx + 1, error = %e, "Skipping cookie line"),
            }
        }
        jar
    }
}

fn bool_field(value: bool) -> &'static str {
    if value {
        "TRUE"
    } else {
        "FALSE"
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/')
            || request_path.as_bytes().get(cookie_path.len()) == Some(&b'/'))
}

fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

fn parse_expires(value: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.timestamp());
    }
    EXPIRES_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.and_utc().timestamp())
}
