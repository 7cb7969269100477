//! Profile document parsing and the category → profiles index.
//!
//! A profile document looks like:
//!
//! ```xml
//! <profile type="sync" name="63807467">
//!     <key name="category" value="buteo-contacts"/>
//!     <key name="enabled" value="true"/>
//! </profile>
//! ```
//!
//! Only the root element's `name` and its direct `key` children are read;
//! nested sub-profiles and schedules are ignored.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{ParseError, ParseFailure};
use crate::types::{Category, Profile, ProfileEntry, ProfileId};

const PROFILE_TAG: &str = "profile";
const KEY_TAG: &str = "key";
const ENABLED_KEY: &str = "enabled";
const CATEGORY_KEY: &str = "category";

/// Parse one profile document.
///
/// `enabled` is `true` unless a key named `enabled` has the exact value
/// `"false"`. A missing or empty `name` attribute or `category` key is an
/// error.
pub fn parse(raw: &str) -> Result<Profile, ParseError> {
    let doc = roxmltree::Document::parse(raw)
        .map_err(|err| ParseError::new(raw, ParseFailure::Malformed(err.to_string())))?;

    let root = doc.root_element();
    if !root.has_tag_name(PROFILE_TAG) {
        return Err(ParseError::new(raw, ParseFailure::MissingRoot));
    }

    let mut enabled = true;
    let mut category: Option<&str> = None;
    for key in root
        .children()
        .filter(|node| node.is_element() && node.has_tag_name(KEY_TAG))
    {
        match key.attribute("name") {
            Some(ENABLED_KEY) if key.attribute("value") == Some("false") => enabled = false,
            Some(CATEGORY_KEY) => category = key.attribute("value"),
            _ => {}
        }
    }

    let id = root
        .attribute("name")
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ParseError::new(raw, ParseFailure::MissingId))?;
    let category = category
        .filter(|category| !category.is_empty())
        .ok_or_else(|| ParseError::new(raw, ParseFailure::MissingCategory))?;

    Ok(Profile {
        id: ProfileId::from(id),
        category: Category::from(category),
        enabled,
    })
}

/// Parse a batch, logging and dropping every document that fails.
pub fn parse_all<I, S>(raws: I) -> ProfileIndex
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parse_all_with(raws, |err| {
        tracing::warn!(reason = %err.reason, raw = %err.raw, "skipping unparsable profile");
    })
}

/// Parse a batch, handing every failure to `on_error` and grouping the
/// survivors by category.
pub fn parse_all_with<I, S, F>(raws: I, mut on_error: F) -> ProfileIndex
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: FnMut(ParseError),
{
    let mut index = ProfileIndex::default();
    for raw in raws {
        match parse(raw.as_ref()) {
            Ok(profile) => index.insert(profile),
            Err(err) => on_error(err),
        }
    }
    index
}

/// Multi-valued mapping from category to the profiles declaring it.
///
/// Duplicate ids inside one category are kept; entries keep their batch
/// order within a category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ProfileIndex {
    by_category: BTreeMap<Category, Vec<ProfileEntry>>,
}

impl ProfileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, profile: Profile) {
        self.by_category
            .entry(profile.category.clone())
            .or_default()
            .push(ProfileEntry::from(profile));
    }

    pub fn clear(&mut self) {
        self.by_category.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.by_category.is_empty()
    }

    /// Total number of profiles across every category.
    pub fn len(&self) -> usize {
        self.by_category.values().map(Vec::len).sum()
    }

    pub fn contains_category(&self, category: &Category) -> bool {
        self.by_category.contains_key(category)
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.by_category.keys()
    }

    pub fn entries(&self, category: &Category) -> &[ProfileEntry] {
        self.by_category
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Category, &ProfileEntry)> {
        self.by_category
            .iter()
            .flat_map(|(category, entries)| entries.iter().map(move |entry| (category, entry)))
    }

    /// Profile ids, optionally restricted to one category and/or to enabled
    /// profiles.
    pub fn profile_ids(&self, category: Option<&Category>, only_enabled: bool) -> Vec<ProfileId> {
        let keep = |entry: &&ProfileEntry| !only_enabled || entry.enabled;
        match category {
            Some(category) => self
                .entries(category)
                .iter()
                .filter(keep)
                .map(|entry| entry.id.clone())
                .collect(),
            None => self
                .iter()
                .map(|(_, entry)| entry)
                .filter(keep)
                .map(|entry| entry.id.clone())
                .collect(),
        }
    }
}
