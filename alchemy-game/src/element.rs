//! Element records produced by combinations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use twox_hash::XxHash64;

use crate::constants::{BASE_ELEMENTS, FALLBACK_GLYPH};
use crate::names::{canonical_name, is_valid_glyph};

/// Stable identifier derived from the canonical element name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u64);

impl ElementId {
    #[must_use]
    pub fn for_name(name: &str) -> Self {
        Self(XxHash64::oneshot(0, canonical_name(name).as_bytes()))
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Serialize for ElementId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ElementId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        u64::from_str_radix(&raw, 16)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

/// How an element entered the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    Base,
    Combination,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSource {
    pub kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents: Option<[String; 2]>,
}

impl ElementSource {
    #[must_use]
    pub const fn base() -> Self {
        Self {
            kind: SourceKind::Base,
            parents: None,
        }
    }

    #[must_use]
    pub fn combination(a: &str, b: &str) -> Self {
        Self {
            kind: SourceKind::Combination,
            parents: Some([a.to_string(), b.to_string()]),
        }
    }
}

/// Immutable element record. Identity is the canonical name; the stored
/// `name` keeps the first-seen display casing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    id: ElementId,
    name: String,
    glyph: String,
    discovered_at: DateTime<Utc>,
    is_first_discovery: bool,
    source: ElementSource,
}

impl Element {
    /// One of the genesis elements.
    #[must_use]
    pub fn base(name: &str, glyph: &str, at: DateTime<Utc>) -> Self {
        Self::build(name, glyph, at, false, ElementSource::base())
    }

    /// An element produced by combining `parents`.
    #[must_use]
    pub fn combined(
        name: &str,
        glyph: &str,
        parents: [&str; 2],
        is_first_discovery: bool,
        at: DateTime<Utc>,
    ) -> Self {
        Self::build(
            name,
            glyph,
            at,
            is_first_discovery,
            ElementSource::combination(parents[0], parents[1]),
        )
    }

    /// A puzzle target, known by name and glyph before anyone produces it.
    #[must_use]
    pub fn target(name: &str, glyph: &str, at: DateTime<Utc>) -> Self {
        let source = ElementSource {
            kind: SourceKind::Combination,
            parents: None,
        };
        Self::build(name, glyph, at, false, source)
    }

    fn build(
        name: &str,
        glyph: &str,
        at: DateTime<Utc>,
        is_first_discovery: bool,
        source: ElementSource,
    ) -> Self {
        let name = name.trim();
        let glyph = if is_valid_glyph(glyph) {
            glyph
        } else {
            FALLBACK_GLYPH
        };
        Self {
            id: ElementId::for_name(name),
            name: name.to_string(),
            glyph: glyph.to_string(),
            discovered_at: at,
            is_first_discovery,
            source,
        }
    }

    /// The four base elements stamped with `at`.
    #[must_use]
    pub fn genesis(at: DateTime<Utc>) -> Vec<Self> {
        BASE_ELEMENTS
            .iter()
            .map(|(name, glyph)| Self::base(name, glyph, at))
            .collect()
    }

    #[must_use]
    pub const fn id(&self) -> ElementId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn canonical(&self) -> String {
        canonical_name(&self.name)
    }

    #[must_use]
    pub fn glyph(&self) -> &str {
        &self.glyph
    }

    #[must_use]
    pub const fn discovered_at(&self) -> DateTime<Utc> {
        self.discovered_at
    }

    #[must_use]
    pub const fn is_first_discovery(&self) -> bool {
        self.is_first_discovery
    }

    #[must_use]
    pub const fn source(&self) -> &ElementSource {
        &self.source
    }

    #[must_use]
    pub fn is_base(&self) -> bool {
        self.source.kind == SourceKind::Base
    }

    /// Case-insensitive name match.
    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        self.canonical() == canonical_name(name)
    }

    #[must_use]
    pub fn with_discovered_at(mut self, at: DateTime<Utc>) -> Self {
        self.discovered_at = at;
        self
    }

    #[must_use]
    pub fn with_first_discovery(mut self, first: bool) -> Self {
        self.is_first_discovery = first;
        self
    }

    /// Replace the display casing, keeping identity.
    #[must_use]
    pub fn with_display_name(mut self, name: &str) -> Self {
        if canonical_name(name) == self.canonical() {
            name.trim().clone_into(&mut self.name);
        }
        self
    }
}
