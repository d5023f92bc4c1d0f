//! A bunch of wrap errors.
use crate::prelude::ringkv_core;

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors enum mapping global custom errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Http client error: {0}")]
    HttpClientError(String),
    #[error("Remote node {0} answered {1}: {2}")]
    RemoteStatus(String, u16, String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Encode error.")]
    EncodeError,
    #[error("Invalid logging level: {0}")]
    InvalidLoggingLevel(String),
    #[error("Create File Error: {0}")]
    CreateFileError(String),
    #[error("Open File Error: {0}")]
    OpenFileError(String),
    #[error("Cannot find home directory")]
    HomeDirError,
    #[error("Cannot find parent directory")]
    ParentDirError,
    #[error("Serde yaml error: {0}")]
    SerdeYamlError(#[from] serde_yaml::Error),
    #[error("Core error: {0}")]
    CoreError(#[from] ringkv_core::error::Error),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::HttpClientError(e.to_string())
    }
}
