//! The real network behind the cache: HTTP via ureq, or a local directory
//! served as if it were the origin.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use log::debug;
use ureq::http::Uri;

use super::error::FetchError;
use super::request::{Request, Response};

const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

pub trait Network: Send + Sync {
    fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// HTTP client. Non-2xx statuses come back as responses, not errors;
/// only transport failures are errors.
pub struct HttpNetwork {
    agent: ureq::Agent,
}

impl HttpNetwork {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl Network for HttpNetwork {
    fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let url = request.url.as_str();
        let network_err = |e: ureq::Error| FetchError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let mut resp = match request.method.as_str() {
            "GET" => self.agent.get(url).call().map_err(network_err)?,
            "HEAD" => self.agent.head(url).call().map_err(network_err)?,
            other => {
                return Err(FetchError::UnsupportedMethod {
                    method: other.to_string(),
                    url: url.to_string(),
                });
            }
        };
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = if request.method == "HEAD" {
            Vec::new()
        } else {
            resp.body_mut()
                .with_config()
                .limit(MAX_BODY_BYTES)
                .read_to_vec()
                .map_err(network_err)?
        };
        debug!("http: {} {url} → {status} ({} bytes)", request.method, body.len());
        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

/// Serves files under `root` for any URL, mapping the URL path onto the
/// directory. Directory paths resolve to `index.html`.
pub struct DirNetwork {
    root: PathBuf,
}

impl DirNetwork {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn local_path(&self, url: &str) -> Result<Option<PathBuf>, FetchError> {
        let uri: Uri = url
            .split_once('#')
            .map_or(url, |(u, _)| u)
            .parse()
            .map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
        let rel = Path::new(uri.path().trim_start_matches('/'));
        if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Ok(None);
        }
        let mut path = self.root.join(rel);
        if uri.path().ends_with('/') {
            path.push("index.html");
        }
        Ok(Some(path))
    }
}

impl Network for DirNetwork {
    fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        if !matches!(request.method.as_str(), "GET" | "HEAD") {
            return Ok(Response::with_status(405));
        }
        let Some(path) = self.local_path(&request.url)? else {
            return Ok(Response::with_status(403));
        };
        match fs::read(&path) {
            Ok(body) => {
                let mut response = Response::ok(if request.method == "HEAD" { Vec::new() } else { body });
                if let Some(ct) = content_type(&path) {
                    response.headers.push(("content-type".into(), ct.into()));
                }
                Ok(response)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Response::with_status(404)),
            Err(e) if e.kind() == io::ErrorKind::IsADirectory => Ok(Response::with_status(404)),
            Err(e) => Err(FetchError::Network {
                url: request.url.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

fn content_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "html" => "text/html",
        "css" => "text/css",
        "js" => "text/javascript",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "m4a" => "audio/mp4",
        "mp3" => "audio/mpeg",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> (tempfile::TempDir, DirNetwork) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<html>").unwrap();
        fs::create_dir(dir.path().join("img")).unwrap();
        fs::write(dir.path().join("img/1.png"), b"\x89PNG").unwrap();
        let net = DirNetwork::new(dir.path());
        (dir, net)
    }

    #[test]
    fn test_serves_files_and_index() {
        let (_dir, net) = site();
        let r = net.fetch(&Request::get("http://local.invalid/img/1.png")).unwrap();
        assert_eq!(r.status, 200);
        assert_eq!(r.header("content-type"), Some("image/png"));
        let r = net.fetch(&Request::get("http://local.invalid/")).unwrap();
        assert_eq!(r.body, b"<html>");
    }

    #[test]
    fn test_missing_is_404() {
        let (_dir, net) = site();
        let r = net.fetch(&Request::get("http://local.invalid/nope.js")).unwrap();
        assert_eq!(r.status, 404);
    }

    #[test]
    fn test_parent_components_forbidden() {
        let (_dir, net) = site();
        let r = net.fetch(&Request::get("http://local.invalid/../etc/passwd")).unwrap();
        assert_eq!(r.status, 403);
    }

    #[test]
    fn test_post_not_allowed() {
        let (_dir, net) = site();
        let r = net.fetch(&Request::new("POST", "http://local.invalid/")).unwrap();
        assert_eq!(r.status, 405);
    }
}
