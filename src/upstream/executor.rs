//! Rotating request executor.
//!
//! Every call to the conversion API goes through [`RotatingExecutor::execute`],
//! which tries each credential of the pool in order. Only throttling (429)
//! and quota (403) answers move on to the next credential; anything else
//! ends the loop at once.

use std::sync::Arc;
use std::time::Duration;

use mp3relay_core::config::UpstreamConfig;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response};

use super::error::UpstreamError;

/// Header carrying the credential.
pub static API_KEY_HEADER: HeaderName = HeaderName::from_static("x-rapidapi-key");
/// Header carrying the upstream host identity.
pub static API_HOST_HEADER: HeaderName = HeaderName::from_static("x-rapidapi-host");

// ---------------------------------------------------------------------------
// Request description
// ---------------------------------------------------------------------------

/// One upstream call, independent of the credential attached to it.
#[derive(Debug, Clone)]
pub struct UpstreamRequestSpec {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub timeout: Duration,
}

impl UpstreamRequestSpec {
    /// A GET with no query or extra headers.
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            timeout,
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Outcome of one attempt with one credential.
#[derive(Debug)]
pub enum Attempt {
    Success(Response),
    /// Try the next credential.
    Retryable(UpstreamError),
    /// Stop and report this error.
    Fatal(UpstreamError),
}

impl Attempt {
    fn from_error(err: UpstreamError) -> Self {
        if err.is_retryable() {
            Attempt::Retryable(err)
        } else {
            Attempt::Fatal(err)
        }
    }
}

/// Executes upstream calls against a fixed, ordered credential pool.
///
/// Cheaply cloneable; the pool is shared read-only between requests.
#[derive(Clone)]
pub struct RotatingExecutor {
    http: Client,
    credentials: Arc<[HeaderValue]>,
    host: HeaderValue,
}

impl RotatingExecutor {
    /// Build an executor from the upstream config, reusing `http` for all
    /// calls. Fails if a credential or the host cannot be sent as a header.
    pub fn from_config(http: Client, config: &UpstreamConfig) -> mp3relay_core::Result<Self> {
        let credentials = config
            .api_keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                let mut value = HeaderValue::from_str(key.expose()).map_err(|_| {
                    mp3relay_core::Error::Config(format!(
                        "upstream credential #{i} contains characters not allowed in a header"
                    ))
                })?;
                value.set_sensitive(true);
                Ok(value)
            })
            .collect::<mp3relay_core::Result<Vec<_>>>()?;

        let host = HeaderValue::from_str(&config.api_host).map_err(|_| {
            mp3relay_core::Error::Config(format!(
                "upstream api_host '{}' is not a valid header value",
                config.api_host
            ))
        })?;

        Ok(Self {
            http,
            credentials: credentials.into(),
            host,
        })
    }

    /// Number of credentials in the pool.
    pub fn pool_size(&self) -> usize {
        self.credentials.len()
    }

    /// Run `spec` with each credential in turn until one succeeds.
    ///
    /// Performs at most [`pool_size`](Self::pool_size) attempts. When every
    /// credential is throttled or out of quota, the error of the last attempt
    /// is returned.
    pub async fn execute(&self, spec: &UpstreamRequestSpec) -> Result<Response, UpstreamError> {
        let mut last_error = None;

        for (index, credential) in self.credentials.iter().enumerate() {
            tracing::debug!(
                key_index = index,
                method = %spec.method,
                url = %spec.url,
                "Trying upstream request"
            );

            match self.attempt(spec, credential).await {
                Attempt::Success(response) => return Ok(response),
                Attempt::Fatal(err) => {
                    tracing::warn!(key_index = index, error = %err, "Upstream request failed");
                    return Err(err);
                }
                Attempt::Retryable(err) => {
                    tracing::warn!(
                        key_index = index,
                        error = %err,
                        "Upstream key rejected; rotating to next key"
                    );
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or(UpstreamError::NoCredentials))
    }

    async fn attempt(&self, spec: &UpstreamRequestSpec, credential: &HeaderValue) -> Attempt {
        let mut request = self
            .http
            .request(spec.method.clone(), &spec.url)
            .headers(spec.headers.clone())
            .header(API_KEY_HEADER.clone(), credential.clone())
            .header(API_HOST_HEADER.clone(), self.host.clone())
            .timeout(spec.timeout);
        if !spec.query.is_empty() {
            request = request.query(&spec.query);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => Attempt::Success(response),
            Ok(response) => Attempt::from_error(UpstreamError::from_response(response).await),
            Err(err) => Attempt::Fatal(UpstreamError::from_transport(err)),
        }
    }
}
