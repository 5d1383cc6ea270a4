use thiserror::Error;

/// Errors raised while loading configuration.
///
/// A missing config file is not an error (every key has a default); a
/// file that exists but cannot be read or parsed always is.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
