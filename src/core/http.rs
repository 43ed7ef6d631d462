//! HTTP access shared by both registry clients
//!
//! One `ureq::Agent` per client. Metadata requests carry an overall timeout;
//! streamed bodies rely on the agent's connect and per-read timeouts so a
//! large transfer is never cut short while a stalled one still fails.

use serde::de::DeserializeOwned;
use std::io::Read;
use std::time::Duration;
use tracing::debug;

use super::config::Config;
use super::error::{PullError, Result};

const USER_AGENT: &str = concat!("levitate-pull/", env!("CARGO_PKG_VERSION"));

/// A request header as (name, value)
pub type Header<'a> = (&'a str, &'a str);

/// Response body decoded as text, with its media type.
#[derive(Debug, Clone)]
pub struct Document {
    pub body: String,
    /// `Content-Type` without parameters, if the server sent one
    pub content_type: Option<String>,
}

/// An open streamed response.
pub struct Stream {
    /// Declared body size from `Content-Length`
    pub content_length: Option<u64>,
    pub reader: Box<dyn Read + Send + Sync + 'static>,
}

/// Blocking HTTP client with timeouts.
#[derive(Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(config: &Config) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.http_timeout)
            .timeout_read(config.blob_read_timeout)
            .user_agent(USER_AGENT)
            .build();
        Self {
            agent,
            timeout: config.http_timeout,
        }
    }

    /// GET `url` and decode the body as JSON.
    pub fn get_json<T: DeserializeOwned>(&self, url: &str, headers: &[Header<'_>]) -> Result<T> {
        let response = self.call(url, headers, Some(self.timeout))?;
        serde_json::from_reader(response.into_reader()).map_err(|e| PullError::Json {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// GET `url` and return the body as text together with its content type.
    pub fn get_document(&self, url: &str, headers: &[Header<'_>]) -> Result<Document> {
        let response = self.call(url, headers, Some(self.timeout))?;
        let content_type = response
            .header("content-type")
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_string())
            .filter(|ct| !ct.is_empty());
        let mut body = String::new();
        response
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|e| PullError::Transport {
                url: url.to_string(),
                message: format!("failed to read response: {}", e),
            })?;
        Ok(Document { body, content_type })
    }

    /// GET `url` for streaming; the body has not been read yet.
    pub fn open_stream(&self, url: &str, headers: &[Header<'_>]) -> Result<Stream> {
        let response = self.call(url, headers, None)?;
        let content_length = response
            .header("content-length")
            .and_then(|s| s.parse().ok());
        Ok(Stream {
            content_length,
            reader: response.into_reader(),
        })
    }

    fn call(
        &self,
        url: &str,
        headers: &[Header<'_>],
        timeout: Option<Duration>,
    ) -> Result<ureq::Response> {
        debug!(url, "GET");
        let mut request = self.agent.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        for (name, value) in headers {
            request = request.set(name, value);
        }
        request.call().map_err(|e| match e {
            ureq::Error::Status(code, _) => PullError::Status {
                url: url.to_string(),
                code,
            },
            ureq::Error::Transport(t) => PullError::Transport {
                url: url.to_string(),
                message: t.to_string(),
            },
        })
    }
}

/// Build an `Authorization` header value for a bearer token.
pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
