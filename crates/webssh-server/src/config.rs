//! Server configuration file.

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;
use webssh_bridge::BridgeConfig;
use webssh_core::RemoteSessionConfig;

/// Top-level configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP server binds.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Directory served under `/static`.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    /// Remote host and credentials.
    pub remote: RemoteConfig,

    /// Bridge timing.
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// `[remote]` section.
#[derive(Debug, Deserialize)]
pub struct RemoteConfig {
    #[serde(flatten)]
    pub session: RemoteSessionConfig,

    /// File holding the private key, read at startup.
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8088))
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

impl ServerConfig {
    /// Read and parse a TOML configuration file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse TOML configuration text.
    ///
    /// # Errors
    /// Returns error if the text is not a valid configuration.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply command line overrides.
    pub fn apply_overrides(&mut self, listen: Option<SocketAddr>, secret: Option<String>) {
        if let Some(listen) = listen {
            self.listen = listen;
        }
        if let Some(secret) = secret {
            self.remote.session.secret = secret;
        }
    }

    /// Remote session parameters with the private key loaded and checked.
    ///
    /// # Errors
    /// Returns error if the key file cannot be read or the parameters are
    /// incomplete.
    pub fn remote_session(&self) -> anyhow::Result<RemoteSessionConfig> {
        let mut session = self.remote.session.clone();
        if let Some(path) = &self.remote.private_key_path {
            let path = expand_home(path);
            let key = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read private key {}", path.display()))?;
            session.private_key = Some(key);
        }
        session.validate().context("Invalid [remote] configuration")?;
        Ok(session)
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
