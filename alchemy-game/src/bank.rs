//! Discovery bank: every element the player has ever seen, in discovery order.
//!
//! The bank only grows. It records *which* elements the player knows; the
//! oracle memo records *what combinations produce*.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::constants::RECENT_ELEMENTS_CAP;
use crate::element::Element;
use crate::names::canonical_name;

/// Bank handle shared by the oracle and sessions.
pub type SharedBank = Arc<Mutex<DiscoveryBank>>;

/// Emitted when a new element enters the bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryEvent {
    pub name: String,
    pub glyph: String,
    pub was_first_global: bool,
}

/// View orders for [`DiscoveryBank::sorted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankOrder {
    /// Oldest first, the internal order.
    #[default]
    Discovery,
    Newest,
    Alphabetical,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryBank {
    elements: Vec<Element>,
    by_name: HashMap<String, usize>,
}

impl DiscoveryBank {
    /// A fresh bank holding the four base elements.
    #[must_use]
    pub fn new(at: DateTime<Utc>) -> Self {
        Self::from_elements(Vec::new(), at)
    }

    /// Rebuild from persisted records, dropping duplicates and restoring any
    /// missing base element.
    #[must_use]
    pub fn from_elements(stored: Vec<Element>, at: DateTime<Utc>) -> Self {
        let mut bank = Self {
            elements: Vec::with_capacity(stored.len() + 4),
            by_name: HashMap::new(),
        };
        for base in Element::genesis(at) {
            if !stored.iter().any(|el| el.is_named(base.name())) {
                bank.push(base);
            }
        }
        for element in stored {
            if !bank.contains(element.name()) {
                bank.push(element);
            }
        }
        bank
    }

    fn push(&mut self, element: Element) {
        self.by_name
            .insert(element.canonical(), self.elements.len());
        self.elements.push(element);
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(&canonical_name(name))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Element> {
        self.by_name
            .get(&canonical_name(name))
            .and_then(|&idx| self.elements.get(idx))
    }

    /// Append `element` stamped with `at`; no-op when already known.
    pub fn add(&mut self, element: Element, at: DateTime<Utc>) -> Option<DiscoveryEvent> {
        if self.contains(element.name()) {
            return None;
        }
        let element = element.with_discovered_at(at);
        let event = DiscoveryEvent {
            name: element.name().to_string(),
            glyph: element.glyph().to_string(),
            was_first_global: element.is_first_discovery(),
        };
        self.push(element);
        Some(event)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    /// Elements in discovery order.
    #[must_use]
    pub fn as_slice(&self) -> &[Element] {
        &self.elements
    }

    /// The bank in the requested order; borrows when it matches storage order.
    #[must_use]
    pub fn sorted(&self, order: BankOrder) -> Cow<'_, [Element]> {
        match order {
            BankOrder::Discovery => Cow::Borrowed(&self.elements),
            BankOrder::Newest => Cow::Owned(self.elements.iter().rev().cloned().collect()),
            BankOrder::Alphabetical => {
                let mut sorted = self.elements.clone();
                sorted.sort_by_cached_key(Element::canonical);
                Cow::Owned(sorted)
            }
        }
    }

    /// Case-insensitive substring filter, in discovery order.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<&Element> {
        let needle = canonical_name(query);
        self.elements
            .iter()
            .filter(|el| el.canonical().contains(&needle))
            .collect()
    }

    /// The last `n` discoveries, newest first.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<&Element> {
        self.elements.iter().rev().take(n).collect()
    }

    /// Whether `name` is among the last few discoveries (the "NEW" badge).
    #[must_use]
    pub fn is_new(&self, name: &str) -> bool {
        let canonical = canonical_name(name);
        self.elements
            .iter()
            .rev()
            .take(RECENT_ELEMENTS_CAP)
            .filter(|el| !el.is_base())
            .any(|el| el.canonical() == canonical)
    }

    /// Count of elements flagged as global first discoveries.
    #[must_use]
    pub fn first_discovery_count(&self) -> usize {
        self.elements
            .iter()
            .filter(|el| el.is_first_discovery())
            .count()
    }
}
