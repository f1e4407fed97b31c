//! Stub request sinks shared by the unit tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

use crate::config::RunConfig;
use crate::sink::{RequestSink, SinkError, STATUS_OK};

#[derive(Debug, Clone, Copy)]
pub enum StubReply {
    Status(u16),
    Transport,
}

/// Sleeps `delay`, then answers GET and POST with the configured replies.
#[derive(Debug)]
pub struct StubSink {
    delay: Duration,
    get_reply: StubReply,
    post_reply: StubReply,
    pub gets: AtomicUsize,
    pub posts: AtomicUsize,
}

impl StubSink {
    pub fn ok(delay: Duration) -> Self {
        Self::with_replies(delay, StubReply::Status(STATUS_OK), StubReply::Status(STATUS_OK))
    }

    pub fn with_replies(delay: Duration, get_reply: StubReply, post_reply: StubReply) -> Self {
        Self {
            delay,
            get_reply,
            post_reply,
            gets: AtomicUsize::new(0),
            posts: AtomicUsize::new(0),
        }
    }

    async fn answer(&self, reply: StubReply) -> Result<u16, SinkError> {
        tokio::time::sleep(self.delay).await;
        match reply {
            StubReply::Status(status) => Ok(status),
            StubReply::Transport => Err(SinkError::Connection("stub refused".to_string())),
        }
    }
}

#[async_trait]
impl RequestSink for StubSink {
    async fn get(&self, _url: &Url) -> Result<u16, SinkError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.answer(self.get_reply).await
    }

    async fn post(&self, _url: &Url, _body: &str) -> Result<u16, SinkError> {
        self.posts.fetch_add(1, Ordering::SeqCst);
        self.answer(self.post_reply).await
    }
}

/// Sink whose GET panics, to exercise barrier breakage.
pub struct PanickingSink;

#[async_trait]
impl RequestSink for PanickingSink {
    async fn get(&self, _url: &Url) -> Result<u16, SinkError> {
        panic!("stub sink panicked");
    }

    async fn post(&self, _url: &Url, _body: &str) -> Result<u16, SinkError> {
        Ok(STATUS_OK)
    }
}

pub fn test_config(max_concurrency: usize, iterations: usize) -> RunConfig {
    RunConfig {
        max_concurrency,
        iterations,
        get_url: Url::parse("http://stub.invalid:8080/testing/tests/test").unwrap(),
        post_url: Url::parse("http://stub.invalid:8080/testing/tests/").unwrap(),
        payload: "{ 'alive':'alive' }".to_string(),
        request_timeout: None,
    }
}
