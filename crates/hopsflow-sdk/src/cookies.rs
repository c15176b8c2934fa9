//! Session cookie store.
//!
//! A minimal RFC 6265 jar: cookies are keyed by `(domain, path, name)`,
//! populated from `Set-Cookie` response headers and serialized back into a
//! single `Cookie` request header for URLs they match.
//!
//! ```
//! use hopsflow_sdk::CookieStore;
//! use reqwest::Url;
//!
//! let login = Url::parse("https://hw.example:8181/hopsworks-api/api/auth/service").unwrap();
//! let mut jar = CookieStore::new();
//! jar.store_set_cookie("JSESSIONID=abc; Path=/hopsworks-api; HttpOnly", &login);
//! jar.store_set_cookie("SERVERID=n1; Path=/", &login);
//!
//! let key = Url::parse("https://hw.example:8181/hopsworks-api/api/users/apiKey").unwrap();
//! assert_eq!(jar.cookie_header(&key).as_deref(), Some("JSESSIONID=abc; SERVERID=n1"));
//! ```

use std::net::IpAddr;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use reqwest::Url;

/// A single stored cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value, verbatim.
    pub value: String,
    /// Lower-cased domain without a leading dot.
    pub domain: String,
    /// Only sent to exactly `domain` (no `Domain` attribute was given).
    pub host_only: bool,
    /// Path scope.
    pub path: String,
    /// Only sent over `https`.
    pub secure: bool,
    /// Not exposed to scripts; kept for completeness.
    pub http_only: bool,
    /// Absolute expiry; `None` for session cookies.
    pub expires: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct Entry {
    cookie: Cookie,
    created: u64,
}

/// Cookies collected during one session.
#[derive(Debug, Clone, Default)]
pub struct CookieStore {
    entries: Vec<Entry>,
    next_seq: u64,
}

impl CookieStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored cookies, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse one `Set-Cookie` header value received from `request_url`.
    ///
    /// Returns `true` if a cookie was stored, `false` if the header was
    /// ignored or deleted an existing cookie.
    pub fn store_set_cookie(&mut self, header: &str, request_url: &Url) -> bool {
        self.store_set_cookie_at(header, request_url, Utc::now())
    }

    fn store_set_cookie_at(&mut self, header: &str, request_url: &Url, now: DateTime<Utc>) -> bool {
        let Some(host) = request_host(request_url) else {
            return false;
        };
        let Some(parsed) = parse_set_cookie(header, now) else {
            return false;
        };

        let (domain, host_only) = match parsed.domain {
            Some(domain) => {
                if !domain_matches(&host, &domain) {
                    tracing::debug!(cookie = %parsed.name, %domain, %host, "rejecting cookie for foreign domain");
                    return false;
                }
                (domain, false)
            }
            None => (host, true),
        };

        let path = parsed
            .path
            .unwrap_or_else(|| default_path(request_url.path()));

        let cookie = Cookie {
            name: parsed.name,
            value: parsed.value,
            domain,
            host_only,
            path,
            secure: parsed.secure,
            http_only: parsed.http_only,
            expires: parsed.expires,
        };

        let existing = self.entries.iter().position(|e| {
            e.cookie.name == cookie.name
                && e.cookie.domain == cookie.domain
                && e.cookie.path == cookie.path
        });

        if cookie.expires.is_some_and(|t| t <= now) {
            if let Some(idx) = existing {
                self.entries.remove(idx);
            }
            return false;
        }

        match existing {
            // replacement keeps the original creation time (RFC 6265 5.3 step 11)
            Some(idx) => self.entries[idx].cookie = cookie,
            None => {
                self.entries.push(Entry {
                    cookie,
                    created: self.next_seq,
                });
                self.next_seq += 1;
            }
        }
        true
    }

    /// Cookies that apply to `url`, longest path first, then oldest first.
    pub fn cookies_for(&self, url: &Url) -> Vec<&Cookie> {
        self.cookies_for_at(url, Utc::now())
    }

    fn cookies_for_at(&self, url: &Url, now: DateTime<Utc>) -> Vec<&Cookie> {
        let Some(host) = request_host(url) else {
            return Vec::new();
        };
        let secure_channel = url.scheme() == "https";
        let request_path = url.path();

        let mut matching: Vec<&Entry> = self
            .entries
            .iter()
            .filter(|e| {
                let c = &e.cookie;
                let domain_ok = if c.host_only {
                    host == c.domain
                } else {
                    domain_matches(&host, &c.domain)
                };
                domain_ok
                    && path_matches(request_path, &c.path)
                    && (!c.secure || secure_channel)
                    && c.expires.is_none_or(|t| t > now)
            })
            .collect();

        matching.sort_by(|a, b| {
            b.cookie
                .path
                .len()
                .cmp(&a.cookie.path.len())
                .then(a.created.cmp(&b.created))
        });
        matching.into_iter().map(|e| &e.cookie).collect()
    }

    /// The `Cookie` header value for `url`, or `None` if nothing applies.
    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        serialize(&self.cookies_for(url))
    }
}

fn serialize(cookies: &[&Cookie]) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    let pairs: Vec<String> = cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect();
    Some(pairs.join("; "))
}

// ---------------------------------------------------------------------------
// Parsing (RFC 6265 section 5.2)
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ParsedSetCookie {
    name: String,
    value: String,
    domain: Option<String>,
    path: Option<String>,
    secure: bool,
    http_only: bool,
    expires: Option<DateTime<Utc>>,
}

fn parse_set_cookie(header: &str, now: DateTime<Utc>) -> Option<ParsedSetCookie> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut parsed = ParsedSetCookie {
        name: name.to_string(),
        value: value.trim().to_string(),
        domain: None,
        path: None,
        secure: false,
        http_only: false,
        expires: None,
    };
    let mut max_age: Option<DateTime<Utc>> = None;

    for attr in parts {
        let (key, val) = match attr.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (attr.trim(), ""),
        };

        if key.eq_ignore_ascii_case("expires") {
            if let Some(t) = parse_cookie_date(val) {
                parsed.expires = Some(t);
            }
        } else if key.eq_ignore_ascii_case("max-age") {
            if let Ok(secs) = val.parse::<i64>() {
                max_age = Some(if secs <= 0 {
                    DateTime::<Utc>::MIN_UTC
                } else {
                    Duration::try_seconds(secs)
                        .and_then(|d| now.checked_add_signed(d))
                        .unwrap_or(DateTime::<Utc>::MAX_UTC)
                });
            }
        } else if key.eq_ignore_ascii_case("domain") {
            let domain = val.trim_start_matches('.').to_ascii_lowercase();
            if !domain.is_empty() {
                parsed.domain = Some(domain);
            }
        } else if key.eq_ignore_ascii_case("path") {
            if val.starts_with('/') {
                parsed.path = Some(val.to_string());
            }
        } else if key.eq_ignore_ascii_case("secure") {
            parsed.secure = true;
        } else if key.eq_ignore_ascii_case("httponly") {
            parsed.http_only = true;
        }
    }

    if max_age.is_some() {
        parsed.expires = max_age;
    }
    Some(parsed)
}

fn parse_cookie_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc2822(value) {
        return Some(t.with_timezone(&Utc));
    }
    // Netscape form: "Wed, 21-Oct-2015 07:28:00 GMT"
    NaiveDateTime::parse_from_str(value, "%a, %d-%b-%Y %H:%M:%S GMT")
        .ok()
        .map(|t| t.and_utc())
}

// ---------------------------------------------------------------------------
// Matching (RFC 6265 sections 5.1.3 and 5.1.4)
// ---------------------------------------------------------------------------

fn request_host(url: &Url) -> Option<String> {
    url.host_str().map(str::to_ascii_lowercase)
}

fn is_ip_literal(host: &str) -> bool {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok()
}

fn domain_matches(host: &str, domain: &str) -> bool {
    if host == domain {
        return true;
    }
    !is_ip_literal(host)
        && host.len() > domain.len()
        && host.ends_with(domain)
        && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
}

fn default_path(request_path: &str) -> String {
    if !request_path.starts_with('/') {
        return "/".to_string();
    }
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => request_path[..idx].to_string(),
    }
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/')
            || request_path.as_bytes().get(cookie_path.len()) == Some(&b'/'))
}
