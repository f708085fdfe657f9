//! Access to the third-party conversion API.

pub mod client;
pub mod error;
pub mod executor;

use mp3relay_core::config::UpstreamConfig;
use reqwest::redirect::Policy;

pub use client::{Conversion, ConversionClient, DEFAULT_TITLE};
pub use error::UpstreamError;
pub use executor::{RotatingExecutor, UpstreamRequestSpec};

/// User agent sent on every outgoing request. Some file hosts refuse
/// requests without a browser-like agent.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Build the shared HTTP client used for both conversion calls and file
/// relays. Per-call timeouts are set on each request; the read timeout
/// bounds each idle gap, so long relays that keep flowing are not cut off.
pub fn build_http_client(config: &UpstreamConfig) -> mp3relay_core::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(Policy::limited(config.max_redirects))
        .read_timeout(config.stream_timeout())
        .build()
        .map_err(|e| mp3relay_core::Error::Internal(format!("failed to build HTTP client: {e}")))
}
