// ABOUTME: Minimal plain-HTTP GET client for health probes, built on hyper's http1 connection API.
// ABOUTME: Probe URLs are validated up front so a typo is a configuration error, not a failed probe.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpStream;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HttpError {
    #[error("invalid probe URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("connection to {0} failed: {1}")]
    Connect(String, String),

    #[error("request to {0} failed: {1}")]
    Request(String, String),

    #[error("request to {0} timed out after {1:?}")]
    Timeout(String, Duration),
}

/// A validated `http://host[:port]/path` URL.
///
/// Only plain HTTP is accepted; `https` is refused at parse time rather than
/// failing later as an unhealthy probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeUrl {
    host: String,
    port: u16,
    path_and_query: String,
}

impl ProbeUrl {
    pub fn parse(input: &str) -> Result<Self, HttpError> {
        let invalid = |reason: &str| HttpError::InvalidUrl {
            url: input.to_string(),
            reason: reason.to_string(),
        };
        let uri: hyper::Uri = input.parse().map_err(|_| invalid("not a URL"))?;
        match uri.scheme_str() {
            Some("http") => {}
            Some("https") => {
                return Err(invalid("https probes are not supported, probe a plain-HTTP port"));
            }
            _ => return Err(invalid("scheme must be http")),
        }
        let host = uri.host().ok_or_else(|| invalid("missing host"))?;
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let path_and_query = uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "/".to_string());
        Ok(Self {
            host: host.to_string(),
            port: uri.port_u16().unwrap_or(80),
            path_and_query,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path_and_query
    }
}

impl fmt::Display for ProbeUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}:{}{}", self.host, self.port, self.path_and_query)
    }
}

/// Issues a GET and reports the response status code.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &ProbeUrl) -> Result<u16, HttpError>;
}

/// HTTP/1.1 client over a fresh TCP connection per request.
#[derive(Debug, Clone)]
pub struct HyperClient {
    timeout: Duration,
}

impl HyperClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HyperClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl HyperClient {
    async fn get_inner(&self, url: &ProbeUrl) -> Result<u16, HttpError> {
        let target = url.to_string();
        let stream = TcpStream::connect((url.host(), url.port()))
            .await
            .map_err(|e| HttpError::Connect(target.clone(), e.to_string()))?;

        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| HttpError::Connect(target.clone(), e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "probe connection closed with error");
            }
        });

        let host_header = if url.port() == 80 {
            url.host().to_string()
        } else {
            format!("{}:{}", url.host(), url.port())
        };
        let req = hyper::Request::builder()
            .method("GET")
            .uri(url.path())
            .header("Host", host_header)
            .header("User-Agent", concat!("shipyard/", env!("CARGO_PKG_VERSION")))
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|e| HttpError::Request(target.clone(), e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| HttpError::Request(target, e.to_string()))?;
        Ok(resp.status().as_u16())
    }
}

#[async_trait]
impl HttpClient for HyperClient {
    async fn get(&self, url: &ProbeUrl) -> Result<u16, HttpError> {
        match tokio::time::timeout(self.timeout, self.get_inner(url)).await {
            Ok(result) => result,
            Err(_) => Err(HttpError::Timeout(url.to_string(), self.timeout)),
        }
    }
}
