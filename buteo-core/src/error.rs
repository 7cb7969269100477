//! Error types for buteo-core.

use std::path::PathBuf;

use thiserror::Error;

/// Why a profile document was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    /// The markup itself could not be parsed.
    #[error("malformed document: {0}")]
    Malformed(String),

    /// The document root is not a `<profile>` element.
    #[error("no <profile> root element")]
    MissingRoot,

    /// The `<profile>` element has no (or an empty) `name` attribute.
    #[error("profile has no name")]
    MissingId,

    /// No non-empty `category` key was found.
    #[error("profile has no category")]
    MissingCategory,
}

/// A rejected profile document, carrying the offending input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to parse profile: {reason}")]
pub struct ParseError {
    pub raw: String,
    pub reason: ParseFailure,
}

impl ParseError {
    pub(crate) fn new(raw: &str, reason: ParseFailure) -> Self {
        Self {
            raw: raw.to_owned(),
            reason,
        }
    }
}

/// All errors that can arise while loading controller configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure reading the config file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error, with the file that produced it.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::config_dir()` returned `None`.
    #[error("cannot determine config directory; pass --config explicitly")]
    ConfigDirNotFound,
}
