//! Application configuration types.
//!
//! The top-level [`Config`] is deserialized from TOML and then overlaid with
//! environment variables. Every section defaults sensibly so an empty file is
//! valid to parse, though [`Config::validate`] rejects a config without
//! upstream credentials.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::Result;
use crate::Error;

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "mp3relay.toml";

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub jobs: JobsConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Config(format!("config parse error: {e}")))
    }

    /// Load configuration from a file.
    ///
    /// An explicit path must exist. Without one, [`DEFAULT_CONFIG_FILE`] is
    /// used if present, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    tracing::debug!("No config file found; using defaults");
                    return Ok(Self::default());
                }
                fallback
            }
        };

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        tracing::info!("Loaded config from {}", path.display());
        Self::from_toml(&contents)
    }

    /// Load the file, apply process environment overrides and validate.
    ///
    /// This is the single place the process environment is read; everything
    /// downstream receives the resulting immutable value.
    ///
    /// A `.env` file in the working directory (or a parent) is loaded into
    /// the environment first. Variables already set in the process win.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(file) => tracing::info!("Loaded environment from {}", file.display()),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(Error::Config(format!("failed to read .env file: {e}"))),
        }

        let mut config = Self::load(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from an environment lookup function.
    ///
    /// Recognized keys: `API_KEYS`, `API_HOST`/`apiHost`, `API_URL`/`apiUrl`,
    /// `PROGRESS_URL`, `UPSTREAM_CONTRACT`, `HOST`, `PORT`, `STATIC_DIR`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| lookup(k))
                .map(|v| v.trim().to_string())
        };

        if let Some(keys) = get(&["API_KEYS"]) {
            self.upstream.api_keys = parse_credentials(&keys);
        }
        if let Some(host) = get(&["API_HOST", "apiHost"]) {
            self.upstream.api_host = host;
        }
        if let Some(url) = get(&["API_URL", "apiUrl"]) {
            self.upstream.api_url = url;
        }
        if let Some(url) = get(&["PROGRESS_URL"]) {
            self.upstream.progress_url = Some(url).filter(|u| !u.is_empty());
        }
        if let Some(contract) = get(&["UPSTREAM_CONTRACT"]) {
            self.upstream.contract = contract.parse()?;
        }
        if let Some(host) = get(&["HOST"]) {
            self.server.host = host;
        }
        if let Some(port) = get(&["PORT"]) {
            self.server.port = port
                .parse()
                .map_err(|e| Error::Config(format!("PORT '{port}' is not a valid port: {e}")))?;
        }
        if let Some(dir) = get(&["STATIC_DIR"]) {
            self.server.static_dir = Some(PathBuf::from(dir)).filter(|d| !d.as_os_str().is_empty());
        }

        Ok(())
    }

    /// Reject configurations the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::Config("server port cannot be 0".into()));
        }
        if self.upstream.api_keys.is_empty() {
            return Err(Error::Config(
                "no upstream credentials configured (set API_KEYS)".into(),
            ));
        }
        if self.upstream.api_host.is_empty() {
            return Err(Error::Config("upstream api_host is empty (set API_HOST)".into()));
        }
        if !is_http_url(&self.upstream.api_url) {
            return Err(Error::Config(format!(
                "upstream api_url '{}' is not an http(s) URL (set API_URL)",
                self.upstream.api_url
            )));
        }
        if self.upstream.contract == UpstreamContract::Progress {
            match self.upstream.progress_url.as_deref() {
                Some(url) if is_http_url(url) => {}
                _ => {
                    return Err(Error::Config(
                        "progress contract requires an http(s) progress_url (set PROGRESS_URL)"
                            .into(),
                    ))
                }
            }
        }
        if self.jobs.max_entries == 0 {
            return Err(Error::Config("jobs.max_entries cannot be 0".into()));
        }
        Ok(())
    }

    /// Non-fatal issues worth logging at startup.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let keys = &self.upstream.api_keys;
        for (i, key) in keys.iter().enumerate() {
            if keys[..i].contains(key) {
                warnings.push(format!("upstream credential #{i} duplicates an earlier one"));
            }
        }

        if let Some(ref dir) = self.server.static_dir {
            if !dir.exists() {
                warnings.push(format!(
                    "static_dir {} does not exist; landing page disabled",
                    dir.display()
                ));
            }
        }

        warnings
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Split a comma-separated credential list, dropping blank entries.
pub fn parse_credentials(raw: &str) -> Vec<Credential> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(Credential::new)
        .collect()
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding the landing page (`index.html`) and its assets.
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            static_dir: Some(PathBuf::from("public")),
        }
    }
}

/// Third-party conversion API settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Credential pool; order is retry order.
    pub api_keys: Vec<Credential>,
    /// Value sent as `x-rapidapi-host` with every upstream call.
    pub api_host: String,
    /// Base URL of the conversion API (`{api_url}/dl?id=...`).
    pub api_url: String,
    /// Progress-polling endpoint, used by the progress contract only.
    pub progress_url: Option<String>,
    pub contract: UpstreamContract,
    pub metadata_timeout_secs: u64,
    /// Limit on opening a file relay, and on each idle gap while it streams.
    /// A relay that keeps receiving bytes is never cut off.
    pub stream_timeout_secs: u64,
    pub max_redirects: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            api_host: "youtube-mp36.p.rapidapi.com".into(),
            api_url: "https://youtube-mp36.p.rapidapi.com".into(),
            progress_url: None,
            contract: UpstreamContract::Direct,
            metadata_timeout_secs: 10,
            stream_timeout_secs: 60,
            max_redirects: 10,
        }
    }
}

impl UpstreamConfig {
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }
}

/// Which upstream API shape is in effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamContract {
    /// The conversion call answers with the download link; status is local.
    #[default]
    Direct,
    /// The conversion call answers with a progress token; status is proxied.
    Progress,
}

impl FromStr for UpstreamContract {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "progress" => Ok(Self::Progress),
            other => Err(Error::Config(format!(
                "unknown upstream contract '{other}' (valid: direct, progress)"
            ))),
        }
    }
}

impl fmt::Display for UpstreamContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Progress => f.write_str("progress"),
        }
    }
}

/// Job registry retention.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
    pub sweep_interval_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_entries: 10_000,
            sweep_interval_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// One upstream API key. `Debug` and `Display` never reveal the secret.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret, for attaching to an outgoing request.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}
