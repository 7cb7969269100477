//! Domain types shared by the parser, the controller and the CLI.
//!
//! Numeric wire codes for [`SyncStatus`] and [`ProfileChangeType`] are the
//! ones the sync daemon emits on its status and profile-change signals.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// The daemon-side identifier of a sync profile (its `name` attribute).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(pub String);

impl ProfileId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProfileId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProfileId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A free-form profile category such as `buteo-contacts` or `calendar`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(pub String);

impl Category {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Category {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Kind of change reported by the daemon's profile-changed signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileChangeType {
    Added,
    Modified,
    Removed,
    LogsModified,
}

impl ProfileChangeType {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Added),
            1 => Some(Self::Modified),
            2 => Some(Self::Removed),
            3 => Some(Self::LogsModified),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Added => 0,
            Self::Modified => 1,
            Self::Removed => 2,
            Self::LogsModified => 3,
        }
    }
}

impl fmt::Display for ProfileChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Modified => write!(f, "modified"),
            Self::Removed => write!(f, "removed"),
            Self::LogsModified => write!(f, "logs modified"),
        }
    }
}

/// State of a sync session as reported by the daemon's status signal.
///
/// `Error`, `Done` and `Aborted` are final: no further status follows from
/// the same session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Queued,
    Started,
    Progress,
    Error,
    Done,
    Aborted,
}

impl SyncStatus {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Queued),
            1 => Some(Self::Started),
            2 => Some(Self::Progress),
            3 => Some(Self::Error),
            4 => Some(Self::Done),
            5 => Some(Self::Aborted),
            _ => None,
        }
    }

    pub fn is_final(self) -> bool {
        matches!(self, Self::Error | Self::Done | Self::Aborted)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Started => write!(f, "started"),
            Self::Progress => write!(f, "progress"),
            Self::Error => write!(f, "error"),
            Self::Done => write!(f, "done"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

/// A parsed profile document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub category: Category,
    pub enabled: bool,
}

/// What the category index keeps per profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub id: ProfileId,
    pub enabled: bool,
}

impl From<Profile> for ProfileEntry {
    fn from(profile: Profile) -> Self {
        Self {
            id: profile.id,
            enabled: profile.enabled,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
