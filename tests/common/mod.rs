//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which points a full [`AppContext`] at a
//! `wiremock` server standing in for the conversion API and the file host.
//! [`TestHarness::with_server`] starts Axum on a random port for HTTP-level
//! testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;

use mp3relay::server::{build_router, AppContext};
use mp3relay_core::config::parse_credentials;
use mp3relay_core::{Config, UpstreamContract};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use wiremock::MockServer;

pub const VIDEO_ID: &str = "dQw4w9WgXcQ";
pub const VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
pub const API_HOST: &str = "youtube-mp36.test";

/// Test harness wrapping an [`AppContext`] wired to a mock upstream.
pub struct TestHarness {
    pub ctx: AppContext,
    pub upstream: MockServer,
}

impl TestHarness {
    /// Direct contract with the given comma-separated credential pool.
    pub async fn new(keys: &str) -> Self {
        Self::with_contract(keys, UpstreamContract::Direct).await
    }

    pub async fn with_contract(keys: &str, contract: UpstreamContract) -> Self {
        Self::with_overrides(keys, contract, |_| {}).await
    }

    /// Like [`with_contract`](Self::with_contract), with a hook to adjust
    /// the config before the context is built.
    pub async fn with_overrides(
        keys: &str,
        contract: UpstreamContract,
        adjust: impl FnOnce(&mut Config),
    ) -> Self {
        let upstream = MockServer::start().await;
        let mut config = test_config(&upstream, keys, contract);
        adjust(&mut config);
        let ctx = AppContext::new(config).expect("failed to build app context");
        Self { ctx, upstream }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server(keys: &str) -> (Self, SocketAddr) {
        let harness = Self::new(keys).await;
        let addr = harness.serve().await;
        (harness, addr)
    }

    /// Serve this harness's router on a random port.
    pub async fn serve(&self) -> SocketAddr {
        let app = build_router(self.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        addr
    }

    /// Number of requests the mock upstream has seen so far.
    pub async fn upstream_hits(&self) -> usize {
        self.upstream
            .received_requests()
            .await
            .map(|r| r.len())
            .unwrap_or(0)
    }
}

/// Config pointing every upstream URL at `upstream`.
pub fn test_config(upstream: &MockServer, keys: &str, contract: UpstreamContract) -> Config {
    let mut config = Config::default();
    config.server.static_dir = None;
    config.upstream.api_keys = parse_credentials(keys);
    config.upstream.api_host = API_HOST.into();
    config.upstream.api_url = upstream.uri();
    config.upstream.contract = contract;
    if contract == UpstreamContract::Progress {
        config.upstream.progress_url = Some(format!("{}/progress", upstream.uri()));
    }
    config
}

/// Deterministic fake MP3 payload.
pub fn audio_bytes(len: usize) -> Vec<u8> {
    (0..=255u8).cycle().take(len).collect()
}

/// Spawn a one-shot HTTP file host on a random port. It reads the request
/// head and hands the socket to `respond`, which writes whatever raw bytes
/// the test needs.
pub async fn raw_file_host<F, Fut>(respond: F) -> SocketAddr
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind file host");
    let addr = listener.local_addr().expect("failed to get file host addr");

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("file host accept failed");
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => head.extend_from_slice(&buf[..n]),
            }
        }
        respond(socket).await;
    });

    addr
}
