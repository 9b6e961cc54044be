//! Errors from reading and validating the proxy's TOML config and secret files

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A value is missing or out of range
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("reading config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing config file: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
