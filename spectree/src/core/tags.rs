//! Include/exclude tag filtering.
//!
//! An empty include set allows everything; any overlap with the exclude set
//! vetoes, regardless of the include set.

use std::collections::BTreeSet;

/// Separator for tag lists supplied through properties.
pub const TAGS_SEPARATOR: char = ',';

/// Per-suite tag filter, cloned into child suites at creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagState {
    included: BTreeSet<String>,
    excluded: BTreeSet<String>,
}

impl TagState {
    /// Replace the inclusion set.
    pub fn include<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.included = tags.into_iter().map(Into::into).collect();
    }

    /// Replace the exclusion set.
    pub fn exclude<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded = tags.into_iter().map(Into::into).collect();
    }

    pub fn included(&self) -> &BTreeSet<String> {
        &self.included
    }

    pub fn excluded(&self) -> &BTreeSet<String> {
        &self.excluded
    }

    /// True if the include set is empty or shares at least one tag with `tags`.
    pub fn allows_any<'a>(&self, tags: impl IntoIterator<Item = &'a String>) -> bool {
        if self.included.is_empty() {
            return true;
        }
        tags.into_iter().any(|tag| self.included.contains(tag))
    }

    /// True if any of `tags` is excluded.
    pub fn excludes_any<'a>(&self, tags: impl IntoIterator<Item = &'a String>) -> bool {
        tags.into_iter().any(|tag| self.excluded.contains(tag))
    }

    pub fn is_allowed(&self, tags: &BTreeSet<String>) -> bool {
        self.allows_any(tags) && !self.excludes_any(tags)
    }
}

/// Split a comma-separated property value.
///
/// Returns `None` when the value carries no tags at all, so the caller falls
/// through to the next source.
pub fn split_tags(raw: &str) -> Option<Vec<String>> {
    let tags: Vec<String> = raw
        .split(TAGS_SEPARATOR)
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect();
    if tags.is_empty() { None } else { Some(tags) }
}

/// First source that actually provides tags, or an empty list.
pub fn first_non_blank(sources: &[Option<&[String]>]) -> Vec<String> {
    sources
        .iter()
        .flatten()
        .find(|tags| !tags.is_empty())
        .map(|tags| tags.to_vec())
        .unwrap_or_default()
}
