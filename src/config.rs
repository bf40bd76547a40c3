//! Configuration for the wallet analysis client
//!
//! `ClientConfig` is the library-level configuration. `Args` is the CLI surface
//! of the `wallet-analysis` binary, read from flags or environment variables.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AnalysisError, Result};
use crate::types::ArtifactFormat;

/// Default status polling interval
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the analysis backend
    pub base_url: String,
    /// Path prefix for all API routes (default: "/api/v1")
    pub api_prefix: String,
    /// Optional API key sent as a bearer token
    pub api_key: Option<String>,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// Delay between status polls in milliseconds (default: 5000)
    pub poll_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_prefix: "/api/v1".to_string(),
            api_key: None,
            timeout_secs: 30,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl ClientConfig {
    /// Root URL that route paths are appended to, without a trailing slash
    pub fn api_root(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let prefix = self.api_prefix.trim_matches('/');
        if prefix.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, prefix)
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// wallet-analysis - submit wallets for analysis and follow the job
#[derive(Parser, Debug, Clone)]
#[command(name = "wallet-analysis")]
#[command(about = "Submit wallet addresses for analysis and retrieve the report")]
pub struct Args {
    /// Base URL of the analysis backend
    #[arg(long, env = "ANALYSIS_API_URL", default_value = "http://localhost:8000")]
    pub base_url: String,

    /// API route prefix
    #[arg(long, env = "ANALYSIS_API_PREFIX", default_value = "/api/v1")]
    pub api_prefix: String,

    /// API key for authenticated backends
    #[arg(long, env = "ANALYSIS_API_KEY")]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "30")]
    pub timeout_secs: u64,

    /// Status polling interval in milliseconds
    #[arg(long, env = "POLL_INTERVAL_MS", default_value = "5000")]
    pub poll_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Wallet address to analyze, optionally suffixed with ":<chain>" (repeatable)
    #[arg(long = "wallet")]
    pub wallets: Vec<String>,

    /// File with one wallet per line, formatted "<address>[,<chain>]"
    #[arg(long)]
    pub wallets_file: Option<PathBuf>,

    /// Follow an existing analysis instead of submitting a new one
    #[arg(long, conflicts_with_all = ["wallets", "wallets_file"])]
    pub job_id: Option<String>,

    /// Download the rendered report in these formats once complete (pdf, csv)
    #[arg(long = "download")]
    pub downloads: Vec<String>,

    /// Directory that downloaded artifacts are written to
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Print the full report as JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err(AnalysisError::Config("base URL must not be empty".into()));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(AnalysisError::Config(format!(
                "base URL must use http or https: {}",
                base
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(AnalysisError::Config(
                "poll interval must be greater than zero".into(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(AnalysisError::Config(
                "request timeout must be greater than zero".into(),
            ));
        }
        if self.job_id.is_none() && self.wallets.is_empty() && self.wallets_file.is_none() {
            return Err(AnalysisError::Config(
                "provide --wallet, --wallets-file or --job-id".into(),
            ));
        }
        for format in &self.downloads {
            format.parse::<ArtifactFormat>()?;
        }
        Ok(())
    }

    /// Library configuration derived from these arguments
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.trim().to_string(),
            api_prefix: self.api_prefix.clone(),
            api_key: self.api_key.clone(),
            timeout_secs: self.timeout_secs,
            poll_interval_ms: self.poll_interval_ms,
        }
    }
}
