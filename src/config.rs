use clap::Parser;
use std::time::Duration;
use url::Url;

use crate::error::RunResult;

#[derive(Parser, Debug, Clone)]
#[command(name = "phased-loadgen")]
#[command(about = "Phased GET/POST load generator", long_about = None)]
pub struct Cli {
    /// Maximum number of concurrent workers (Peak phase size)
    #[arg(env = "MAX_CONCURRENCY", default_value = "100")]
    pub max_concurrency: usize,

    /// GET+POST iterations performed by each worker
    #[arg(env = "ITERATIONS", default_value = "100")]
    pub iterations: usize,

    /// Target host
    #[arg(env = "TARGET_HOST", default_value = "localhost")]
    pub host: String,

    /// Target port
    #[arg(env = "TARGET_PORT", default_value = "8080")]
    pub port: u16,

    /// URL scheme
    #[arg(long, env = "TARGET_SCHEME", default_value = "http")]
    pub scheme: String,

    /// Path requested with GET
    #[arg(long, env = "GET_PATH", default_value = "/testing/tests/test")]
    pub get_path: String,

    /// Path requested with POST
    #[arg(long, env = "POST_PATH", default_value = "/testing/tests/")]
    pub post_path: String,

    /// Text body sent with every POST
    #[arg(long, env = "POST_PAYLOAD", default_value = "{ 'alive':'alive' }")]
    pub payload: String,

    /// Per-request timeout in milliseconds; unset means wait indefinitely
    #[arg(long, env = "REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: Option<u64>,

    /// Also print the final report as JSON on stdout
    #[arg(long, env = "REPORT_JSON")]
    pub json: bool,
}

/// Immutable run parameters, built once at startup and shared by `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub max_concurrency: usize,
    pub iterations: usize,
    pub get_url: Url,
    pub post_url: Url,
    pub payload: String,
    pub request_timeout: Option<Duration>,
}

impl Cli {
    pub fn base_url(&self) -> RunResult<Url> {
        Ok(Url::parse(&format!(
            "{}://{}:{}/",
            self.scheme, self.host, self.port
        ))?)
    }

    pub fn run_config(&self) -> RunResult<RunConfig> {
        let base = self.base_url()?;
        Ok(RunConfig {
            max_concurrency: self.max_concurrency,
            iterations: self.iterations,
            get_url: base.join(&self.get_path)?,
            post_url: base.join(&self.post_path)?,
            payload: self.payload.clone(),
            request_timeout: self.request_timeout_ms.map(Duration::from_millis),
        })
    }
}
