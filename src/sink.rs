//! Request sink boundary.
//!
//! Workers only need "send some bytes, observe a status". Anything that can
//! answer a GET and a POST with a status code can stand in for the target.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::error::{RunError, RunResult};

/// Status that classifies a response as a success.
pub const STATUS_OK: u16 = 200;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("http transport error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("connection failed: {0}")]
    Connection(String),
}

impl From<reqwest::Error> for SinkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            SinkError::Connection(e.to_string())
        } else {
            SinkError::Http(e)
        }
    }
}

#[async_trait]
pub trait RequestSink: Send + Sync {
    async fn get(&self, url: &Url) -> Result<u16, SinkError>;

    async fn post(&self, url: &Url, body: &str) -> Result<u16, SinkError>;
}

/// `reqwest`-backed sink sharing one connection pool across all workers.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
}

impl HttpSink {
    pub fn new(request_timeout: Option<Duration>) -> RunResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(RunError::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RequestSink for HttpSink {
    async fn get(&self, url: &Url) -> Result<u16, SinkError> {
        let response = self.client.get(url.clone()).send().await?;
        drain(response).await
    }

    async fn post(&self, url: &Url, body: &str) -> Result<u16, SinkError> {
        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "text/plain")
            .body(body.to_owned())
            .send()
            .await?;
        drain(response).await
    }
}

/// Reads the body to the end so the response is fully received and the
/// connection goes back to the pool.
async fn drain(response: reqwest::Response) -> Result<u16, SinkError> {
    let status = response.status().as_u16();
    response.bytes().await?;
    Ok(status)
}
