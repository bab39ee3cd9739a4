//! The two selection slots.

use serde::{Deserialize, Serialize};

use crate::element::Element;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slot {
    A,
    B,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub selection_a: Option<Element>,
    pub selection_b: Option<Element>,
}

impl Selection {
    /// Fill A if empty, else B if empty. Returns the filled slot, or `None`
    /// when both are taken.
    pub fn select(&mut self, element: Element) -> Option<Slot> {
        if self.selection_a.is_none() {
            self.selection_a = Some(element);
            Some(Slot::A)
        } else if self.selection_b.is_none() {
            self.selection_b = Some(element);
            Some(Slot::B)
        } else {
            None
        }
    }

    pub fn clear_slot(&mut self, slot: Slot) -> Option<Element> {
        match slot {
            Slot::A => self.selection_a.take(),
            Slot::B => self.selection_b.take(),
        }
    }

    pub fn clear(&mut self) {
        self.selection_a = None;
        self.selection_b = None;
    }

    #[must_use]
    pub const fn get(&self, slot: Slot) -> Option<&Element> {
        match slot {
            Slot::A => self.selection_a.as_ref(),
            Slot::B => self.selection_b.as_ref(),
        }
    }

    /// Both slots, when both are filled.
    #[must_use]
    pub fn pair(&self) -> Option<(&Element, &Element)> {
        self.selection_a.as_ref().zip(self.selection_b.as_ref())
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.selection_a.is_none() && self.selection_b.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn el(name: &str) -> Element {
        Element::base(name, "🔥", Utc::now())
    }

    #[test]
    fn fills_a_then_b_then_ignores() {
        let mut sel = Selection::default();
        assert_eq!(sel.select(el("Fire")), Some(Slot::A));
        assert_eq!(sel.select(el("Fire")), Some(Slot::B));
        assert_eq!(sel.select(el("Water")), None);
        let (a, b) = sel.pair().unwrap();
        assert_eq!(a.name(), b.name());
    }

    #[test]
    fn clearing_a_refills_a_first() {
        let mut sel = Selection::default();
        sel.select(el("Fire"));
        sel.select(el("Water"));
        assert_eq!(sel.clear_slot(Slot::A).unwrap().name(), "Fire");
        assert!(sel.pair().is_none());
        assert_eq!(sel.select(el("Earth")), Some(Slot::A));
        assert_eq!(sel.get(Slot::B).unwrap().name(), "Water");
        sel.clear();
        assert!(sel.is_empty());
    }
}
