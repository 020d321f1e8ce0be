//! Berth Core - Shared types, configuration, error handling and manifest generation

pub mod config;
pub mod constants;
pub mod error;
pub mod manifest;
pub mod naming;
pub mod types;

pub use config::*;
pub use constants::*;
pub use error::{Error, Result};
pub use manifest::{Manifest, ManifestGenerator};
pub use types::*;
