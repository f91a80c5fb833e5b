use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("no usable nameserver in {0}")]
    NoServerFound(String),
    #[error("invalid nameserver address: {0}")]
    InvalidServerAddress(String),
    #[error("invalid port: {0}")]
    InvalidPort(String),
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("invalid key secret: {0}")]
    InvalidKeySecret(String),
    #[error("unknown authentication algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("IO error: {0}")]
    Io(String),
}

/// Unified error for the query tool; everything fatal funnels through here.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] crate::client::TransportError),
    #[error(transparent)]
    Parse(#[from] crate::dns::ParseError),
    #[error("{0}")]
    Usage(String),
    #[error("failed to render response: {0}")]
    Render(#[from] serde_json::Error),
}
