//! Element name canonicalisation and glyph measurement.
//!
//! `canonical_name` is the only notion of name equality in the engine: NFC
//! normalisation followed by Unicode lowercasing. Display casing is kept
//! separately on each [`crate::Element`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

use crate::constants::{GLYPH_MAX_CLUSTERS, GLYPH_MIN_CLUSTERS, GLYPH_WIDE_LAYOUT_CLUSTERS};

const KEY_SEPARATOR: char = '|';

/// Canonical (trimmed, NFC, Unicode-lowercased) form of an element name.
///
/// This is lowercasing, not full case folding: `Straße` and `STRASSE` stay
/// distinct names.
#[must_use]
pub fn canonical_name(name: &str) -> String {
    name.trim().nfc().collect::<String>().to_lowercase()
}

/// Case-insensitive name equality.
#[must_use]
pub fn names_equal(a: &str, b: &str) -> bool {
    canonical_name(a) == canonical_name(b)
}

/// Unordered pair of element names in canonical order.
///
/// `{fire, water}` and `{water, fire}` produce the same key; the textual
/// form is `<lower(a)>|<lower(b)>` with `a <= b` by code point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CombinationKey {
    first: String,
    second: String,
}

impl CombinationKey {
    #[must_use]
    pub fn new(a: &str, b: &str) -> Self {
        let a = canonical_name(a);
        let b = canonical_name(b);
        if a <= b {
            Self {
                first: a,
                second: b,
            }
        } else {
            Self {
                first: b,
                second: a,
            }
        }
    }

    #[must_use]
    pub fn first(&self) -> &str {
        &self.first
    }

    #[must_use]
    pub fn second(&self) -> &str {
        &self.second
    }

    /// True when both sides name the same element.
    #[must_use]
    pub fn is_self_combination(&self) -> bool {
        self.first == self.second
    }
}

impl fmt::Display for CombinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{KEY_SEPARATOR}{}", self.first, self.second)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed combination key: {0}")]
pub struct KeyParseError(String);

impl FromStr for CombinationKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .split_once(KEY_SEPARATOR)
            .ok_or_else(|| KeyParseError(s.to_string()))?;
        if a.trim().is_empty() || b.trim().is_empty() || b.contains(KEY_SEPARATOR) {
            return Err(KeyParseError(s.to_string()));
        }
        Ok(Self::new(a, b))
    }
}

impl Serialize for CombinationKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CombinationKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Number of extended grapheme clusters in a glyph.
#[must_use]
pub fn glyph_clusters(glyph: &str) -> usize {
    glyph.graphemes(true).count()
}

/// Whether a glyph is within the accepted 1–8 cluster range.
#[must_use]
pub fn is_valid_glyph(glyph: &str) -> bool {
    (GLYPH_MIN_CLUSTERS..=GLYPH_MAX_CLUSTERS).contains(&glyph_clusters(glyph))
}

/// Layout hint for consumers: multi-cluster glyphs need a wider tile.
#[must_use]
pub fn needs_wide_layout(glyph: &str) -> bool {
    glyph_clusters(glyph) >= GLYPH_WIDE_LAYOUT_CLUSTERS
}
