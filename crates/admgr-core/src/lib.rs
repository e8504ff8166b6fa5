//! # admgr-core
//!
//! Core types shared by the admgr directory management crates.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy and stable outcome codes
//! - [`credentials`] - Bind identity and secret handling
//! - [`config`] - Layered configuration sources and the config-file reader

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod credentials;
pub mod error;

// Re-export commonly used types
pub use config::{ConfigSources, ResolvedSettings, SettingsLayer};
pub use credentials::BindCredentials;
pub use error::{Error, ErrorCode, ErrorResponse, Result};
