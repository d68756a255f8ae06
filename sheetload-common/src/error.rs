//! Common error types for sheetload

use thiserror::Error;

/// Common result type for sheetload operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the sheetload crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
