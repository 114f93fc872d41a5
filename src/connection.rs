use crate::error::{Result, SoundTouchError};
use crate::protocol::{self, Endpoint};
use std::time::Duration;

/// HTTP transport bound to one speaker's web services port
#[derive(Debug, Clone)]
pub struct Transport {
    host: String,
    port: u16,
    base_url: String,
    http: reqwest::Client,
}

impl Transport {
    /// Create a transport for `host:port` with a per-request timeout
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(host, port, http))
    }

    /// Create a transport sharing an existing HTTP client
    pub fn with_client(host: impl Into<String>, port: u16, http: reqwest::Client) -> Self {
        let host = host.into();
        let base_url = format!("http://{}:{}", host, port);
        Self {
            host,
            port,
            base_url,
            http,
        }
    }

    /// Get the speaker's host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get the speaker's port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base URL of the speaker's API
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET` an endpoint and return the response body
    pub async fn get(&self, endpoint: Endpoint) -> Result<String> {
        let url = format!("{}{}", self.base_url, endpoint.path());
        tracing::debug!("GET {}", url);

        let response = self.http.get(&url).send().await.map_err(map_send_error)?;
        Self::read_body(response).await
    }

    /// `POST` an XML body to an endpoint and return the response body
    pub async fn post(&self, endpoint: Endpoint, body: String) -> Result<String> {
        let url = format!("{}{}", self.base_url, endpoint.path());
        tracing::debug!("POST {}: {}", url, body);

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .await
            .map_err(map_send_error)?;
        Self::read_body(response).await
    }

    async fn read_body(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let text = response.text().await.map_err(map_send_error)?;
        tracing::trace!("Response ({}): {}", status, text);

        // Error documents are more informative than the status line
        protocol::check_errors(&text)?;

        if !status.is_success() {
            return Err(SoundTouchError::InvalidResponse(format!(
                "HTTP status {}",
                status
            )));
        }
        Ok(text)
    }
}

fn map_send_error(e: reqwest::Error) -> SoundTouchError {
    if e.is_timeout() {
        SoundTouchError::Timeout
    } else {
        SoundTouchError::Http(e)
    }
}
