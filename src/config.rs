use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use ::config::{Config, Environment};
use serde::Deserialize;

use crate::fetcher::{DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};

const ENV_PREFIX: &str = "SCRIPT_HARVEST";

/// Runtime settings: defaults overridden by `SCRIPT_HARVEST_*` env vars.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Root under which one directory per domain is written.
    pub output_dir: PathBuf,
    pub db_path: PathBuf,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::load_from(Environment::with_prefix(ENV_PREFIX))
    }

    fn load_from(env: Environment) -> Result<Self> {
        Config::builder()
            .set_default("output_dir", "downloads")?
            .set_default("db_path", "data/jobs.sqlite")?
            .set_default("timeout_secs", DEFAULT_TIMEOUT.as_secs())?
            .set_default("user_agent", DEFAULT_USER_AGENT)?
            .add_source(env)
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
