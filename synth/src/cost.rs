//! Decoder hardware cost of a global field allocation.
//!
//! Fields that land on identical bit positions share one physical decode
//! slot; the slot must be able to assert the union of its users'
//! capabilities, one control line per distinct capability. The cost of an
//! allocation is therefore the total number of control lines, with the
//! number of slots as the tie-break.

use std::collections::HashMap;

use opforge_core::CapabilitySet;

use crate::placement::Placement;

/// Ordered allocation cost; lower is strictly better.
///
/// Derived `Ord` compares `control_lines` first, then `decode_slots`:
/// the lexicographic order the search minimizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cost {
    /// Σ over slots of the popcount of the slot's merged capability set.
    pub control_lines: u32,
    /// Number of distinct slots (bitmasks) in use.
    pub decode_slots: u32,
}

impl std::fmt::Display for Cost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} control lines over {} slots", self.control_lines, self.decode_slots)
    }
}

/// Accumulates the capability union per bitmask as placements are merged in.
///
/// The search engine builds one `SlotMap` per task prefix and clones it per
/// scanned combination, so accumulation must stay cheap: one map entry OR
/// per field.
#[derive(Debug, Default, Clone)]
pub struct SlotMap {
    slots: HashMap<u16, CapabilitySet>,
}

impl SlotMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_placement(&mut self, placement: &Placement) {
        for field in &placement.fields {
            *self.slots.entry(field.mask).or_default() |= field.capabilities;
        }
    }

    pub fn cost(&self) -> Cost {
        Cost {
            control_lines: self.slots.values().map(CapabilitySet::count).sum(),
            decode_slots: self.slots.len() as u32,
        }
    }

    /// The merged (mask, capabilities) slots, unordered.
    pub fn slots(&self) -> impl Iterator<Item = (u16, CapabilitySet)> + '_ {
        self.slots.iter().map(|(&mask, &capabilities)| (mask, capabilities))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::PlacedField;
    use opforge_core::CapabilityRegistry;

    fn placement(fields: &[(u16, CapabilitySet)]) -> Placement {
        Placement {
            fields: fields
                .iter()
                .enumerate()
                .map(|(field_index, &(mask, capabilities))| PlacedField {
                    field_index,
                    mask,
                    capabilities,
                })
                .collect(),
        }
    }

    #[test]
    fn shared_masks_merge_into_one_slot() {
        let mut registry = CapabilityRegistry::new();
        let x = registry.intern("x").unwrap();

        let mut shared = SlotMap::new();
        shared.add_placement(&placement(&[(0b0111, x)]));
        shared.add_placement(&placement(&[(0b0111, x)]));
        assert_eq!(shared.cost(), Cost { control_lines: 1, decode_slots: 1 });

        let mut disjoint = SlotMap::new();
        disjoint.add_placement(&placement(&[(0b0111, x)]));
        disjoint.add_placement(&placement(&[(0b0111_000, x)]));
        assert_eq!(disjoint.cost(), Cost { control_lines: 2, decode_slots: 2 });

        assert!(shared.cost() < disjoint.cost());
    }

    #[test]
    fn slot_capabilities_are_unioned() {
        let mut registry = CapabilityRegistry::new();
        let x = registry.intern("x").unwrap();
        let y = registry.intern("y").unwrap();

        let mut slots = SlotMap::new();
        slots.add_placement(&placement(&[(0b0011, x)]));
        slots.add_placement(&placement(&[(0b0011, y), (0b1100, y)]));

        assert_eq!(slots.cost(), Cost { control_lines: 3, decode_slots: 2 });
    }

    #[test]
    fn cost_order_is_lexicographic() {
        let a = Cost { control_lines: 3, decode_slots: 9 };
        let b = Cost { control_lines: 4, decode_slots: 1 };
        let c = Cost { control_lines: 4, decode_slots: 2 };
        assert!(a < b);
        assert!(b < c);
    }
}
