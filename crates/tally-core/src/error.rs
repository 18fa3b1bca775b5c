//! Error types for Tally

use thiserror::Error;

use crate::provider::ProviderError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool loop exceeded {rounds} rounds without completing")]
    LoopExceeded { rounds: usize },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Whether this failure came out of the provider layer.
    ///
    /// `LoopExceeded` must stay distinguishable from provider failures in
    /// logs, so callers branch on this instead of matching broadly.
    pub fn is_provider_failure(&self) -> bool {
        matches!(self, Error::Provider(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
