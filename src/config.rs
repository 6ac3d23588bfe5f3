//! Gateway settings: CLI flags layered over files and the environment.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Parser, Debug, Default)]
#[command(name = "kumagate")]
#[command(about = "HTTP gateway exposing Uptime Kuma monitors over plain request/response")]
pub struct Args {
    /// Path to a TOML settings file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Base URL of the Uptime Kuma instance
    #[arg(long)]
    pub kuma_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub port: u16,
    pub kuma: KumaSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KumaSettings {
    pub url: String,
    pub username: String,
    pub password: String,
    pub rpc_timeout_secs: u64,
    pub list_timeout_secs: u64,
}

impl KumaSettings {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }
}

impl Settings {
    /// Load settings from the process environment.
    pub fn load(args: &Args) -> Result<Self> {
        Self::load_from(args, std::env::vars().collect())
    }

    /// Load settings against an explicit set of environment variables.
    ///
    /// Later layers win: defaults, the settings file, `KUMAGATE__*`
    /// variables, the conventional `UPTIME_KUMA_*` and `PORT` variables,
    /// then CLI flags.
    pub fn load_from(args: &Args, env: HashMap<String, String>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("port", 3000)?
            .set_default("kuma.url", "http://localhost:3001")?
            .set_default("kuma.username", "admin")?
            .set_default("kuma.password", "admin123")?
            .set_default("kuma.rpc_timeout_secs", 10)?
            .set_default("kuma.list_timeout_secs", 10)?;

        if let Some(path) = &args.config {
            builder = builder.add_source(File::from(path.as_path()));
        }

        let port = env.get("PORT").map(|p| p.parse::<u16>()).transpose();
        let port = port.context("PORT must be a port number")?;

        let config = builder
            .add_source(
                Environment::with_prefix("KUMAGATE")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(env.clone())),
            )
            .set_override_option("kuma.url", env.get("UPTIME_KUMA_URL").cloned())?
            .set_override_option("kuma.username", env.get("UPTIME_KUMA_USER").cloned())?
            .set_override_option("kuma.password", env.get("UPTIME_KUMA_PASS").cloned())?
            .set_override_option("port", port.map(i64::from))?
            .set_override_option("port", args.port.map(i64::from))?
            .set_override_option("kuma.url", args.kuma_url.clone())?
            .build()
            .context("Failed to load settings")?;

        config
            .try_deserialize()
            .context("Invalid settings")
    }
}
