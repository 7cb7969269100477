//! Buteo core library: domain types, profile parsing, configuration, errors.
//!
//! Public API surface:
//! - [`types`]: newtypes and the daemon's status/change enums
//! - [`profile`]: profile document parser and the category index
//! - [`config`]: [`ControllerConfig`] and its YAML loader
//! - [`error`]: [`ParseError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod profile;
pub mod types;

pub use config::{BusKind, ControllerConfig, ProfileFilter};
pub use error::{ConfigError, ParseError, ParseFailure};
pub use profile::{parse, parse_all, parse_all_with, ProfileIndex};
pub use types::{Category, Profile, ProfileChangeType, ProfileEntry, ProfileId, SyncStatus};
