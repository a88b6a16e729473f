//! Error types for scanpest-core

use thiserror::Error;

/// Result type alias using scanpest-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in scanpest-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Detection not found
    #[error("Detection not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Image decode/encode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failures_surface_as_sqlite_errors() {
        let error = Error::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(matches!(error, Error::Sqlite(_)));
        assert!(error.to_string().starts_with("SQLite error:"));
    }
}
