//! # sheetload-common
//!
//! Shared code for the sheetload workspace:
//! - Error type (`Error`, `Result`)
//! - Import configuration and config-file resolution
//! - Progress event vocabulary (`ImportEvent`, `EventBus`)

pub mod config;
pub mod error;
pub mod events;

pub use config::ImportConfig;
pub use error::{Error, Result};
