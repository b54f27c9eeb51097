//! Remote byte sources.
//!
//! The transfer engine does not talk to reqwest directly; it opens a
//! `RemoteStream` through the `RemoteSource` trait. `HttpSource` is the
//! production implementation, a blocking reqwest client that sends the
//! launcher's identifying headers.

use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_LENGTH, USER_AGENT};
use tracing::debug;

use crate::config::DownloadConfig;
use crate::error::{ConfigError, TransferError};

/// An open response body plus its declared length.
pub struct RemoteStream {
    /// Value of `content-length`, if the remote sent one
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

/// Something the transfer engine can stream a URL from.
pub trait RemoteSource: Send + Sync {
    /// Open `url` for reading.
    ///
    /// Non-success responses must be reported as `TransferError::Status`
    /// before any body is handed out.
    fn open(&self, url: &str) -> Result<RemoteStream, TransferError>;
}

/// Blocking HTTP(S) source.
///
/// No request timeout is configured: a stalled connection blocks the
/// session's worker thread until the remote gives up.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    user_agent: String,
    accept: String,
}

impl HttpSource {
    pub fn new(config: &DownloadConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self::with_client(client, config))
    }

    /// Use a preconfigured client (e.g. one that bypasses system proxies).
    pub fn with_client(client: Client, config: &DownloadConfig) -> Self {
        HttpSource {
            client,
            user_agent: config.user_agent.clone(),
            accept: config.accept.clone(),
        }
    }
}

impl RemoteSource for HttpSource {
    fn open(&self, url: &str) -> Result<RemoteStream, TransferError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.user_agent.as_str())
            .header(ACCEPT, self.accept.as_str())
            .send()
            .map_err(|e| TransferError::Remote {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        debug!(url, status = status.as_u16(), ?content_length, "response headers received");

        Ok(RemoteStream {
            content_length,
            body: Box::new(response),
        })
    }
}
