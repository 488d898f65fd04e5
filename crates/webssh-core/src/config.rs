//! Connection parameters for a remote shell session.

use std::{fmt, time::Duration};

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Terminal width used when the client does not supply one.
pub const DEFAULT_PTY_WIDTH: u32 = 120;
/// Terminal height used when the client does not supply one.
pub const DEFAULT_PTY_HEIGHT: u32 = 40;
/// Standard SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// How the client proves its identity to the remote host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// `secret` is the account password.
    #[default]
    #[serde(alias = "passwd")]
    Password,
    /// `secret` is the passphrase decrypting `private_key`.
    #[serde(alias = "publickey", alias = "key")]
    PublicKey,
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Public key authentication requires private key material")]
    MissingPrivateKey,
    #[error("Invalid terminal size: {width}x{height}")]
    InvalidTermSize { width: u32, height: u32 },
}

/// Parameters for dialing, authenticating and starting a remote shell.
#[derive(Clone, Deserialize)]
pub struct RemoteSessionConfig {
    /// Authentication mode.
    #[serde(default)]
    pub auth_mode: AuthMode,

    /// Remote account name.
    pub user: String,

    /// Password, or private key passphrase in public key mode.
    #[serde(default)]
    pub secret: String,

    /// PEM/OpenSSH encoded private key material.
    #[serde(default)]
    pub private_key: Option<String>,

    /// Dial and handshake timeout, given in whole seconds in config files.
    #[serde(
        rename = "connect_timeout_secs",
        default = "default_connect_timeout",
        deserialize_with = "deserialize_secs"
    )]
    pub connect_timeout: Duration,

    /// Remote host name or address.
    pub host: String,

    /// Remote port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Initial pseudo-terminal width in columns.
    #[serde(default = "default_term_width")]
    pub term_width: u32,

    /// Initial pseudo-terminal height in rows.
    #[serde(default = "default_term_height")]
    pub term_height: u32,
}

const fn default_connect_timeout() -> Duration {
    Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
}

fn deserialize_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

const fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

const fn default_term_width() -> u32 {
    DEFAULT_PTY_WIDTH
}

const fn default_term_height() -> u32 {
    DEFAULT_PTY_HEIGHT
}

impl RemoteSessionConfig {
    /// Create a password-authenticated config with default port, timeout and size.
    #[must_use]
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            auth_mode: AuthMode::Password,
            user: user.into(),
            secret: String::new(),
            private_key: None,
            connect_timeout: default_connect_timeout(),
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            term_width: DEFAULT_PTY_WIDTH,
            term_height: DEFAULT_PTY_HEIGHT,
        }
    }

    /// Authenticate with a password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.auth_mode = AuthMode::Password;
        self.secret = password.into();
        self
    }

    /// Authenticate with a private key, optionally encrypted with `passphrase`.
    #[must_use]
    pub fn with_private_key(mut self, key: impl Into<String>, passphrase: impl Into<String>) -> Self {
        self.auth_mode = AuthMode::PublicKey;
        self.private_key = Some(key.into());
        self.secret = passphrase.into();
        self
    }

    /// Set the remote port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the initial pseudo-terminal size.
    #[must_use]
    pub const fn with_term_size(mut self, width: u32, height: u32) -> Self {
        self.term_width = width;
        self.term_height = height;
        self
    }

    /// Dial and handshake timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// `host:port` as dialed.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Passphrase for the private key, if one was given.
    #[must_use]
    pub fn passphrase(&self) -> Option<&str> {
        (!self.secret.is_empty()).then_some(self.secret.as_str())
    }

    /// Check the parts of the config that can be verified without dialing.
    ///
    /// # Errors
    /// Returns error if a required field is empty, public key mode has no key,
    /// or the terminal size is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingField("host"));
        }
        if self.user.trim().is_empty() {
            return Err(ConfigError::MissingField("user"));
        }
        if self.auth_mode == AuthMode::PublicKey
            && self.private_key.as_deref().is_none_or(|k| k.trim().is_empty())
        {
            return Err(ConfigError::MissingPrivateKey);
        }
        if self.term_width == 0 || self.term_height == 0 {
            return Err(ConfigError::InvalidTermSize {
                width: self.term_width,
                height: self.term_height,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for RemoteSessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSessionConfig")
            .field("auth_mode", &self.auth_mode)
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout", &self.connect_timeout)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("term_width", &self.term_width)
            .field("term_height", &self.term_height)
            .finish()
    }
}
