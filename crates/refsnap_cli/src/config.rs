//! Configuration file and environment support.
//!
//! Settings are loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `REFSNAP_`, e.g.
//!    `REFSNAP_PAGE_SIZE`, `REFSNAP_TOKEN`; `GITHUB_TOKEN` is honored as
//!    a token fallback)
//! 3. Config file (~/.config/refsnap/config.toml or ./refsnap.toml)
//! 4. Built-in defaults
//!
//! Example config file:
//! ```toml
//! token = "ghp_..."      # or use REFSNAP_TOKEN / GITHUB_TOKEN env vars
//! page_size = 100
//! batch_size = 10
//! concurrency = 4
//! timeout_secs = 30
//! retries = 5
//! ```

use std::path::PathBuf;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

/// File/environment-level settings. Every field is optional; CLI flags
/// and built-in defaults fill the gaps.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// GitHub API token.
    pub token: Option<String>,
    /// Connection page size (`REFSNAP_PAGE_SIZE`).
    pub page_size: Option<u32>,
    /// Entities per batched continuation query.
    pub batch_size: Option<usize>,
    /// Maximum concurrently in-flight requests.
    pub concurrency: Option<usize>,
    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Retry attempts for transient transport failures.
    pub retries: Option<usize>,
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(proj_dirs) = ProjectDirs::from("", "", "refsnap") {
            let xdg_config = proj_dirs.config_dir().join("config.toml");
            if xdg_config.exists() {
                tracing::debug!("Loading config from {:?}", xdg_config);
                builder = builder.add_source(
                    File::from(xdg_config)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        let local_config = PathBuf::from("refsnap.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./refsnap.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(Environment::with_prefix("REFSNAP").try_parsing(true));

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// The API token, falling back to the conventional `GITHUB_TOKEN`
    /// environment variable.
    pub fn github_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
    }
}
