//! Field placement enumeration.
//!
//! For one instruction, every valid layout of its operand fields below the
//! opcode region: all field-order permutations crossed with all ways of
//! distributing the leftover "wiggle" bits as gaps before the fields. The
//! enumeration is lazy; the search engine materializes per-instruction
//! candidate lists from it.
//!
//! Exploring every permutation and gap split is what lets operand bits of
//! different instructions land on identical bit positions, so the decoder
//! hardware behind them can be shared.

use itertools::Itertools;

use opforge_core::{Catalog, CapabilitySet};

use crate::error::SynthError;
use crate::opcode::OpcodeAssignment;

/// One operand field pinned to concrete bit positions.
///
/// `mask` is a contiguous run of `width` 1-bits; zero-width fields keep a
/// mask of 0 but stay present so consumers can still look them up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedField {
    /// Field declaration index within its instruction.
    pub field_index: usize,
    pub mask: u16,
    pub capabilities: CapabilitySet,
}

/// A complete layout of one instruction's operand fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub fields: Vec<PlacedField>,
}

impl Placement {
    /// Mask of the placed field with declaration index `field_index`.
    pub fn mask_of(&self, field_index: usize) -> Option<u16> {
        self.fields.iter().find(|field| field.field_index == field_index).map(|field| field.mask)
    }
}

#[derive(Debug, Clone, Copy)]
struct OperandSlot {
    field_index: usize,
    width: u32,
    capabilities: CapabilitySet,
}

/// Lazily enumerate every placement of `instruction_index`'s operand fields
/// under an opcode of `opcode_len` total bits.
///
/// Fields fill the word upward from bit 0; the opcode owns the top
/// `opcode_len` bits. An instruction without operand fields yields exactly
/// one empty placement.
pub fn placements<'a>(
    catalog: &'a Catalog,
    instruction_index: usize,
    opcode_len: u32,
) -> Result<impl Iterator<Item = Placement> + 'a, SynthError> {
    let instruction = catalog.instruction(instruction_index);

    let operands: Vec<OperandSlot> = instruction
        .operand_fields()
        .map(|(field_index, _, field)| OperandSlot {
            field_index,
            width: field.width,
            capabilities: field.capabilities(),
        })
        .collect();
    let operand_bits: u32 = operands.iter().map(|slot| slot.width).sum();

    let wiggle_bits = catalog
        .word_bits()
        .checked_sub(opcode_len)
        .and_then(|rest| rest.checked_sub(operand_bits))
        .ok_or_else(|| SynthError::PlacementOverflow {
            instruction: instruction.name().to_string(),
            opcode_bits: opcode_len,
            word_bits: catalog.word_bits(),
        })?;

    let slots = operands.len();
    Ok(operands.into_iter().permutations(slots).flat_map(move |permutation| {
        GapDistributions::new(slots, wiggle_bits).map(move |gaps| {
            let mut fields = Vec::with_capacity(slots);
            let mut position = 0u32;
            for (slot, gap) in permutation.iter().zip(gaps) {
                position += gap;
                let mask = if slot.width == 0 {
                    0
                } else {
                    (((1u32 << slot.width) - 1) << position) as u16
                };
                fields.push(PlacedField {
                    field_index: slot.field_index,
                    mask,
                    capabilities: slot.capabilities,
                });
                position += slot.width;
            }
            Placement { fields }
        })
    }))
}

/// Materialize every instruction's candidate placements for its assigned
/// opcode length.
pub fn candidate_placements(
    catalog: &Catalog,
    assignment: &OpcodeAssignment,
) -> Result<Vec<Vec<Placement>>, SynthError> {
    catalog
        .instructions()
        .iter()
        .enumerate()
        .map(|(index, _)| {
            Ok(placements(catalog, index, assignment.opcode(index).total_len())?.collect())
        })
        .collect()
}

/// All vectors of `slots` non-negative gaps summing to at most `budget`,
/// in lexicographic order (first slot most significant). The remainder of
/// the budget trails after the last field.
struct GapDistributions {
    gaps: Vec<u32>,
    total: u32,
    budget: u32,
    done: bool,
}

impl GapDistributions {
    fn new(slots: usize, budget: u32) -> Self {
        GapDistributions { gaps: vec![0; slots], total: 0, budget, done: false }
    }
}

impl Iterator for GapDistributions {
    type Item = Vec<u32>;

    fn next(&mut self) -> Option<Vec<u32>> {
        if self.done {
            return None;
        }
        let current = self.gaps.clone();

        if self.gaps.is_empty() {
            self.done = true;
        } else if self.total < self.budget {
            *self.gaps.last_mut()? += 1;
            self.total += 1;
        } else {
            // Budget exhausted: carry into the slot left of the last
            // nonzero gap, clearing everything to its right.
            match self.gaps.iter().rposition(|&gap| gap > 0) {
                Some(position) if position > 0 => {
                    let moved = self.gaps[position];
                    self.gaps[position] = 0;
                    self.gaps[position - 1] += 1;
                    self.total = self.total - moved + 1;
                }
                _ => self.done = true,
            }
        }

        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opforge_core::Field;

    fn catalog_with(word_bits: u32, widths: &[u32]) -> Catalog {
        let mut builder = Catalog::builder(word_bits);
        let x = builder.capability("x").unwrap();
        let fields: Vec<(String, Field)> = widths
            .iter()
            .enumerate()
            .map(|(i, &width)| (format!("f{i}"), Field::operand(width, x)))
            .collect();
        builder
            .instruction("probe", fields.iter().map(|(name, field)| (name.as_str(), *field)))
            .unwrap();
        builder.build().unwrap()
    }

    fn count(slots: usize, budget: u32) -> usize {
        GapDistributions::new(slots, budget).count()
    }

    #[test]
    fn gap_distributions_are_exhaustive_and_ordered() {
        let all: Vec<Vec<u32>> = GapDistributions::new(2, 1).collect();
        assert_eq!(all, vec![vec![0, 0], vec![0, 1], vec![1, 0]]);

        // C(budget + slots, slots)
        assert_eq!(count(2, 2), 6);
        assert_eq!(count(3, 2), 10);
        assert_eq!(count(0, 5), 1);
        assert_eq!(count(4, 0), 1);
    }

    #[test]
    fn enumerates_permutations_times_gaps() {
        let catalog = catalog_with(8, &[3, 3]);
        let all: Vec<Placement> = placements(&catalog, 0, 1).unwrap().collect();

        // 2 permutations x C(1 + 2, 2) gap splits
        assert_eq!(all.len(), 6);
        let distinct: std::collections::HashSet<Vec<u16>> = all
            .iter()
            .map(|placement| {
                let mut masks: Vec<u16> =
                    placement.fields.iter().map(|field| field.mask).collect();
                masks.sort_unstable();
                masks
            })
            .collect();
        // Orderings of two equal-width fields collapse onto the same masks.
        assert_eq!(distinct.len(), 3);
    }

    #[test]
    fn placements_respect_the_word_layout() {
        let catalog = catalog_with(8, &[3, 2]);
        let opcode_len = 2;
        let field_region = catalog.word_mask() >> opcode_len;

        for placement in placements(&catalog, 0, opcode_len).unwrap() {
            let mut seen = 0u16;
            for field in &placement.fields {
                assert_eq!(field.mask.count_ones(), 3 - field.field_index as u32);
                assert_eq!(field.mask & !field_region, 0, "field escapes below the opcode");
                assert_eq!(seen & field.mask, 0, "fields overlap");
                seen |= field.mask;
            }
            // Contiguity: each mask is a single run of 1-bits.
            for field in &placement.fields {
                let shifted = field.mask >> field.mask.trailing_zeros();
                assert_eq!(shifted & (shifted + 1), 0);
            }
        }
    }

    #[test]
    fn zero_width_fields_are_retained_with_mask_zero() {
        let catalog = catalog_with(8, &[0, 3]);

        let all: Vec<Placement> = placements(&catalog, 0, 5).unwrap().collect();
        assert!(!all.is_empty());
        for placement in &all {
            assert_eq!(placement.fields.len(), 2);
            assert_eq!(placement.mask_of(0), Some(0));
            assert_eq!(placement.mask_of(1), Some(0b0000_0111));
        }
    }

    #[test]
    fn no_operand_fields_yield_one_empty_placement() {
        let mut builder = Catalog::builder(8);
        builder.instruction("reti", []).unwrap();
        let catalog = builder.build().unwrap();

        let all: Vec<Placement> = placements(&catalog, 0, 3).unwrap().collect();
        assert_eq!(all.len(), 1);
        assert!(all[0].fields.is_empty());
    }

    #[test]
    fn overflowing_opcode_is_rejected() {
        let catalog = catalog_with(8, &[3, 3]);
        assert!(matches!(
            placements(&catalog, 0, 3).map(|iter| iter.count()),
            Err(SynthError::PlacementOverflow { opcode_bits: 3, word_bits: 8, .. })
        ));
    }
}
