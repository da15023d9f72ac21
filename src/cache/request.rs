//! Requests, responses and URL normalization.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use ureq::http::Uri;

use super::error::FetchError;

static IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(jpg|jpeg|png|gif|webp|svg)$").unwrap());
static STYLE_SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(css|js)$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: String,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".into(),
            url: url.into(),
        }
    }

    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            url: url.into(),
        }
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    pub fn key(&self) -> Result<RequestKey, FetchError> {
        Ok(RequestKey {
            method: self.method.to_ascii_uppercase(),
            url: normalize_url(&self.url)?,
        })
    }

    pub fn asset_kind(&self) -> AssetKind {
        AssetKind::of_url(&self.url)
    }
}

/// Cache key: upper-cased method plus normalized URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Only plain 200 responses are cacheable.
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// What kind of asset a URL points at, judged by its path extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    StyleOrScript,
    Other,
}

impl AssetKind {
    pub fn of_url(url: &str) -> Self {
        let path = strip_query(url);
        if IMAGE_RE.is_match(path) {
            AssetKind::Image
        } else if STYLE_SCRIPT_RE.is_match(path) {
            AssetKind::StyleOrScript
        } else {
            AssetKind::Other
        }
    }

    /// Whether revalidated responses of this kind are written back.
    pub fn is_persisted(self) -> bool {
        !matches!(self, AssetKind::Other)
    }
}

fn strip_query(url: &str) -> &str {
    let url = url.split_once('#').map_or(url, |(u, _)| u);
    url.split_once('?').map_or(url, |(u, _)| u)
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

/// Scheme + host + port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
}

impl Origin {
    pub fn of(url: &str) -> Result<Self, FetchError> {
        let uri = parse_uri(url)?;
        let scheme = uri
            .scheme_str()
            .ok_or_else(|| FetchError::InvalidUrl(url.into()))?
            .to_ascii_lowercase();
        let host = uri
            .host()
            .ok_or_else(|| FetchError::InvalidUrl(url.into()))?
            .to_ascii_lowercase();
        let port = uri.port_u16().filter(|p| Some(*p) != default_port(&scheme));
        Ok(Self { scheme, host, port })
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}://{}:{port}", self.scheme, self.host),
            None => write!(f, "{}://{}", self.scheme, self.host),
        }
    }
}

fn parse_uri(url: &str) -> Result<Uri, FetchError> {
    let without_fragment = url.split_once('#').map_or(url, |(u, _)| u);
    without_fragment
        .parse::<Uri>()
        .map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))
}

/// Lower-case scheme and host, drop default ports and fragments, and make
/// an empty path `/`.
pub fn normalize_url(url: &str) -> Result<String, FetchError> {
    let origin = Origin::of(url)?;
    let uri = parse_uri(url)?;
    let path_and_query = match uri.path_and_query().map(|pq| pq.as_str()) {
        None | Some("") => "/",
        Some(pq) => pq,
    };
    Ok(format!("{origin}{path_and_query}"))
}

/// The URL space a cache worker controls.
#[derive(Debug, Clone)]
pub struct Scope {
    origin: Origin,
    base: String,
}

impl Scope {
    /// `base` is the scope URL; a trailing `/` is added if missing.
    pub fn parse(base: &str) -> Result<Self, FetchError> {
        let mut normalized = normalize_url(base)?;
        if let Some(q) = normalized.find('?') {
            normalized.truncate(q);
        }
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        Ok(Self {
            origin: Origin::of(base)?,
            base: normalized,
        })
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Resolve a manifest or slide path against the scope.
    ///
    /// `./x` and `x` are relative to the scope, `/x` to the origin; absolute
    /// URLs are returned unchanged.
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if let Some(rest) = path.strip_prefix('/') {
            return format!("{}/{rest}", self.origin);
        }
        let rest = path.strip_prefix("./").unwrap_or(if path == "." { "" } else { path });
        format!("{}{rest}", self.base)
    }

    pub fn is_same_origin(&self, url: &str) -> bool {
        Origin::of(url).is_ok_and(|o| o == self.origin)
    }
}
