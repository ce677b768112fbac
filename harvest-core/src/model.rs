//! Data model shared by every pipeline stage.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};

/// Pixel dimensions of a target platform or a declared search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Size {
    type Err = HarvestError;

    /// Parse `WIDTHxHEIGHT`, e.g. `1080x1920`.
    fn from_str(s: &str) -> Result<Self> {
        let (w, h) = s
            .trim()
            .split_once(&['x', 'X'][..])
            .ok_or_else(|| HarvestError::ConfigError(format!("Invalid size '{s}', expected WxH")))?;

        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| HarvestError::ConfigError(format!("Invalid dimension in '{s}'")))
        };

        Ok(Self::new(parse(w)?, parse(h)?))
    }
}

/// Named platform presets used by the social-media publishing flow.
pub const PLATFORM_PRESETS: &[(&str, Size)] = &[
    ("youtube", Size::new(1920, 1080)),
    ("instagram_feed", Size::new(1080, 1080)),
    ("instagram_story", Size::new(1080, 1920)),
    ("facebook", Size::new(1200, 630)),
];

/// Look up a platform preset by name.
pub fn platform_preset(name: &str) -> Option<Size> {
    PLATFORM_PRESETS
        .iter()
        .find(|(preset, _)| *preset == name)
        .map(|(_, size)| *size)
}

/// All presets as a platform map.
pub fn platform_presets() -> BTreeMap<String, Size> {
    PLATFORM_PRESETS
        .iter()
        .map(|(name, size)| (name.to_string(), *size))
        .collect()
}

/// Platform names end up as directory names in the asset store.
pub fn validate_platform_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(HarvestError::ConfigError(format!(
            "Invalid platform name '{name}' (use letters, digits, '_' or '-')"
        )))
    }
}

/// Preferred orientation forwarded to providers that support filtering by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Landscape,
    Portrait,
    Square,
}

impl FromStr for Orientation {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "landscape" | "horizontal" => Ok(Self::Landscape),
            "portrait" | "vertical" => Ok(Self::Portrait),
            "square" | "squarish" => Ok(Self::Square),
            other => Err(HarvestError::ConfigError(format!(
                "Unknown orientation '{other}'"
            ))),
        }
    }
}

/// A search request. Immutable once handed to the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Free-text search term.
    pub term: String,
    /// Per-provider result caps keyed by provider id.
    #[serde(default)]
    pub per_provider_limits: HashMap<String, usize>,
    /// Platform sizes for this query; falls back to the run configuration.
    #[serde(default)]
    pub target_platforms: Option<BTreeMap<String, Size>>,
    /// Send the term as a quoted phrase.
    #[serde(default)]
    pub exact_phrase: bool,
    #[serde(default)]
    pub orientation: Option<Orientation>,
}

impl Query {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, provider: impl Into<String>, limit: usize) -> Self {
        self.per_provider_limits.insert(provider.into(), limit);
        self
    }

    pub fn with_platform(mut self, name: impl Into<String>, size: Size) -> Self {
        self.target_platforms
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), size);
        self
    }

    pub fn exact_phrase(mut self, exact: bool) -> Self {
        self.exact_phrase = exact;
        self
    }

    pub fn orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = Some(orientation);
        self
    }

    /// The text actually sent to providers.
    pub fn search_text(&self) -> String {
        let term = self.term.trim();
        if self.exact_phrase {
            format!("\"{term}\"")
        } else {
            term.to_string()
        }
    }

    /// Result cap for `provider`, or `default` when none was given.
    pub fn limit_for(&self, provider: &str, default: usize) -> usize {
        self.per_provider_limits
            .get(provider)
            .copied()
            .unwrap_or(default)
    }
}

/// One normalized search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResult {
    pub provider_id: String,
    pub url: String,
    pub declared_width: Option<u32>,
    pub declared_height: Option<u32>,
}

impl ProviderResult {
    pub fn new(provider_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            url: url.into(),
            declared_width: None,
            declared_height: None,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.declared_width = Some(width);
        self.declared_height = Some(height);
        self
    }

    /// Declared dimensions, only when both are known.
    pub fn declared_size(&self) -> Option<Size> {
        match (self.declared_width, self.declared_height) {
            (Some(w), Some(h)) => Some(Size::new(w, h)),
            _ => None,
        }
    }
}

/// A URL-unique search hit, optionally tagged with the platform it fits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub result: ProviderResult,
    pub platform: Option<String>,
}

impl Candidate {
    pub fn url(&self) -> &str {
        &self.result.url
    }

    pub fn provider_id(&self) -> &str {
        &self.result.provider_id
    }
}

/// Downloaded image content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub candidate: Candidate,
    pub content_type: String,
    pub byte_size: u64,
    pub local_path: PathBuf,
}

/// A resized copy of an accepted asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    /// Location of the asset the variant was rendered from.
    pub source: PathBuf,
    pub platform: String,
    pub size: Size,
    pub path: PathBuf,
}
