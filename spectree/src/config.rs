//! Tag filtering options, loadable from a TOML file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::tags::{first_non_blank, split_tags};

pub const DEFAULT_INCLUDE_TAGS_PROPERTY: &str = "SPECTREE_INCLUDE_TAGS";
pub const DEFAULT_EXCLUDE_TAGS_PROPERTY: &str = "SPECTREE_EXCLUDE_TAGS";

/// Options applied to the root suite of a declaration.
///
/// Missing fields take their defaults, so an empty file is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SpecOptions {
    #[serde(alias = "includeTags")]
    pub include_tags: Vec<String>,

    #[serde(alias = "excludeTags")]
    pub exclude_tags: Vec<String>,

    /// Property consulted for include tags when `include_tags` is empty.
    #[serde(alias = "includeTagsPropertyName")]
    pub include_tags_property_name: String,

    /// Property consulted for exclude tags when `exclude_tags` is empty.
    #[serde(alias = "excludeTagsPropertyName")]
    pub exclude_tags_property_name: String,
}

impl Default for SpecOptions {
    fn default() -> Self {
        Self {
            include_tags: Vec::new(),
            exclude_tags: Vec::new(),
            include_tags_property_name: DEFAULT_INCLUDE_TAGS_PROPERTY.to_string(),
            exclude_tags_property_name: DEFAULT_EXCLUDE_TAGS_PROPERTY.to_string(),
        }
    }
}

/// Tag filters after resolving every source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedTags {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl SpecOptions {
    pub fn validate(&self) -> Result<()> {
        if self.include_tags_property_name.trim().is_empty() {
            return Err(anyhow!("include_tags_property_name must be non-empty"));
        }
        if self.exclude_tags_property_name.trim().is_empty() {
            return Err(anyhow!("exclude_tags_property_name must be non-empty"));
        }
        if let Some(blank) = self
            .include_tags
            .iter()
            .chain(&self.exclude_tags)
            .find(|tag| tag.trim().is_empty())
        {
            return Err(anyhow!("tags must be non-blank, got {blank:?}"));
        }
        Ok(())
    }

    /// Resolve include and exclude tags independently: the options' own list
    /// wins when non-empty, otherwise the named property is split on `,`.
    pub fn resolve_tags<L>(&self, lookup: L) -> ResolvedTags
    where
        L: Fn(&str) -> Option<String>,
    {
        let resolve = |own: &[String], property: &str| {
            let from_property = lookup(property).and_then(|raw| split_tags(&raw));
            let tags = first_non_blank(&[Some(own), from_property.as_deref()]);
            debug!(property, ?tags, "resolved tags");
            tags
        };
        ResolvedTags {
            include: resolve(&self.include_tags, &self.include_tags_property_name),
            exclude: resolve(&self.exclude_tags, &self.exclude_tags_property_name),
        }
    }
}

/// Property lookup backed by the process environment.
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Load options from a TOML file.
///
/// If the file is missing, returns `SpecOptions::default()`.
pub fn load_options(path: &Path) -> Result<SpecOptions> {
    if !path.exists() {
        let options = SpecOptions::default();
        options.validate()?;
        return Ok(options);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let options: SpecOptions =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    options
        .validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(options)
}

/// Atomically write options to disk (temp file + rename).
pub fn write_options(path: &Path, options: &SpecOptions) -> Result<()> {
    options.validate()?;
    let mut buf = toml::to_string_pretty(options).context("serialize options toml")?;
    buf.push('\n');

    let parent = path
        .parent()
        .with_context(|| format!("options path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp options {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace options {}", path.display()))?;
    Ok(())
}
