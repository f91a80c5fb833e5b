use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use tracing::warn;

use crate::error::ConfigError;
use crate::tsig::{TsigAlgorithm, TsigKey};

pub const DEFAULT_DNS_PORT: u16 = 53;

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Nameserver to query.
    pub server: IpAddr,

    /// Remote port (53 unless overridden).
    pub port: u16,

    /// Budget for one transport attempt.
    pub timeout: Duration,

    /// Name of the shared authentication key, if any.
    pub key_name: Option<String>,

    /// Base64-encoded shared secret.
    pub key_secret: Option<String>,

    /// Digest algorithm for the authentication record.
    pub algorithm: TsigAlgorithm,

    /// Whether to attach an authentication record to the query and verify
    /// the response. Has no effect without key material.
    pub require_authentication: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            server: IpAddr::from([127, 0, 0, 1]),
            port: DEFAULT_DNS_PORT,
            timeout: Duration::from_secs(5),
            key_name: None,
            key_secret: None,
            algorithm: TsigAlgorithm::HmacSha256,
            require_authentication: true,
        }
    }
}

impl ResolverConfig {
    /// Load the nameserver address from a resolv.conf-style file: the first
    /// parseable `nameserver` line wins, everything else is ignored.
    pub fn from_resolv_conf(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        let mut config = Self::default();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            let mut fields = line.split_whitespace();
            if fields.next() != Some("nameserver") {
                continue;
            }
            let Some(address) = fields.next() else {
                continue;
            };
            match address.parse::<IpAddr>() {
                Ok(server) => {
                    config.server = server;
                    return Ok(config);
                }
                Err(_) => {
                    warn!("ignoring unparseable nameserver line: {}", line);
                }
            }
        }

        Err(ConfigError::NoServerFound(path.display().to_string()))
    }

    /// Apply `GJALLAR_*` environment overrides, one validated field at a
    /// time.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(server) = std::env::var("GJALLAR_SERVER") {
            self.server = server
                .parse()
                .map_err(|_| ConfigError::InvalidServerAddress(server))?;
        }

        if let Ok(port) = std::env::var("GJALLAR_PORT") {
            let parsed = port
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
            if parsed == 0 {
                return Err(ConfigError::InvalidPort(port));
            }
            self.port = parsed;
        }

        if let Ok(timeout) = std::env::var("GJALLAR_TIMEOUT") {
            let secs = timeout
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout(timeout.clone()))?;
            if secs == 0 {
                return Err(ConfigError::InvalidTimeout(timeout));
            }
            self.timeout = Duration::from_secs(secs);
        }

        if let Ok(key_name) = std::env::var("GJALLAR_KEY_NAME") {
            self.key_name = Some(key_name);
        }

        if let Ok(secret) = std::env::var("GJALLAR_KEY_SECRET") {
            use base64::{Engine, engine::general_purpose::STANDARD};
            STANDARD
                .decode(&secret)
                .map_err(|e| ConfigError::InvalidKeySecret(e.to_string()))?;
            self.key_secret = Some(secret);
        }

        if let Ok(algorithm) = std::env::var("GJALLAR_KEY_ALGORITHM") {
            self.algorithm = TsigAlgorithm::from_name(&algorithm)
                .ok_or(ConfigError::UnknownAlgorithm(algorithm))?;
        }

        Ok(())
    }

    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server, self.port)
    }

    /// The authentication key, when both name and secret are configured and
    /// authentication is requested.
    pub fn tsig_key(&self) -> Option<TsigKey> {
        if !self.require_authentication {
            return None;
        }
        match (&self.key_name, &self.key_secret) {
            (Some(name), Some(secret)) => Some(TsigKey::new(name, self.algorithm, secret)),
            _ => None,
        }
    }
}
