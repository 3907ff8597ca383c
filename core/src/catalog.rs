//! The instruction catalog: a validated, immutable description of an
//! instruction set.
//!
//! An instruction is a name plus an ordered map of named fields. Every field
//! has a bit width and a role: operand fields carry the capability set the
//! decoder must assert when their bits are routed, opcode fields contribute
//! extra in-word discriminator bits and carry no capability. Declaration
//! order matters twice: it is the tie-break order for opcode assignment and
//! the weight used by the cosmetic normalization pass.
//!
//! The catalog is built once through [`CatalogBuilder`], validated, and never
//! mutated afterwards; everything downstream is a pure function of it.

use indexmap::IndexMap;

use crate::capability::{CapabilityRegistry, CapabilitySet};
use crate::error::CatalogError;

/// Word width of the target machine; catalogs default to this.
pub const DEFAULT_WORD_BITS: u32 = 16;

/// What a field's bits mean to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// The bits disambiguate the instruction; no capability of their own.
    Opcode,
    /// The bits form an operand routed through the given capabilities.
    Operand(CapabilitySet),
}

/// A named bit range inside an instruction word.
///
/// Zero-width fields are legal: a register hard-wired to a constant index
/// still needs a decoder slot entry but consumes no bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub width: u32,
    pub role: FieldRole,
}

impl Field {
    pub const fn operand(width: u32, capabilities: CapabilitySet) -> Self {
        Field { width, role: FieldRole::Operand(capabilities) }
    }

    pub const fn opcode(width: u32) -> Self {
        Field { width, role: FieldRole::Opcode }
    }

    pub const fn is_opcode(&self) -> bool {
        matches!(self.role, FieldRole::Opcode)
    }

    /// Capabilities asserted when this field is active; empty for opcode
    /// fields.
    pub const fn capabilities(&self) -> CapabilitySet {
        match self.role {
            FieldRole::Opcode => CapabilitySet::EMPTY,
            FieldRole::Operand(capabilities) => capabilities,
        }
    }
}

/// One instruction: a name plus its fields in declaration order.
#[derive(Debug, Clone)]
pub struct Instruction {
    name: String,
    fields: IndexMap<String, Field>,
}

impl Instruction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Field name at declaration index `index`.
    pub fn field_name(&self, index: usize) -> Option<&str> {
        self.fields.get_index(index).map(|(name, _)| name.as_str())
    }

    /// Operand fields with their declaration indices; opcode fields skipped.
    pub fn operand_fields(&self) -> impl Iterator<Item = (usize, &str, &Field)> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, (_, field))| !field.is_opcode())
            .map(|(index, (name, field))| (index, name.as_str(), field))
    }

    /// Sum of all field widths, opcode fields included.
    pub fn total_bits(&self) -> u32 {
        self.fields.values().map(|field| field.width).sum()
    }

    /// Sum of the widths of the opcode-role fields: in-word discriminator
    /// bits already reserved by this instruction.
    pub fn extra_opcode_bits(&self) -> u32 {
        self.fields.values().filter(|field| field.is_opcode()).map(|field| field.width).sum()
    }
}

/// Validated, immutable instruction catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    word_bits: u32,
    registry: CapabilityRegistry,
    instructions: Vec<Instruction>,
    pairs: Vec<(usize, usize)>,
}

impl Catalog {
    pub fn builder(word_bits: u32) -> CatalogBuilder {
        CatalogBuilder {
            word_bits,
            registry: CapabilityRegistry::new(),
            instructions: Vec::new(),
            pairs: Vec::new(),
        }
    }

    pub fn word_bits(&self) -> u32 {
        self.word_bits
    }

    /// All-ones mask of the instruction word.
    pub fn word_mask(&self) -> u16 {
        ((1u32 << self.word_bits) - 1) as u16
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn instruction(&self, index: usize) -> &Instruction {
        &self.instructions[index]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.instructions.iter().position(|instruction| instruction.name == name)
    }

    /// Cosmetic sibling pairs as declaration indices.
    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }
}

/// Builder for [`Catalog`]; collects capabilities, instructions and pairing
/// constraints, then validates the whole set in [`CatalogBuilder::build`].
#[derive(Debug)]
pub struct CatalogBuilder {
    word_bits: u32,
    registry: CapabilityRegistry,
    instructions: Vec<Instruction>,
    pairs: Vec<(String, String)>,
}

impl CatalogBuilder {
    /// Register a capability signal, returning its single-element set.
    pub fn capability(&mut self, name: &str) -> Result<CapabilitySet, CatalogError> {
        self.registry.intern(name)
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Add an instruction with its fields in declaration order.
    pub fn instruction<'a, F>(&mut self, name: &str, fields: F) -> Result<(), CatalogError>
    where
        F: IntoIterator<Item = (&'a str, Field)>,
    {
        if self.instructions.iter().any(|instruction| instruction.name == name) {
            return Err(CatalogError::DuplicateInstruction { name: name.to_string() });
        }

        let mut field_map = IndexMap::new();
        for (field_name, field) in fields {
            if field_map.insert(field_name.to_string(), field).is_some() {
                return Err(CatalogError::DuplicateField {
                    instruction: name.to_string(),
                    field: field_name.to_string(),
                });
            }
        }

        self.instructions.push(Instruction { name: name.to_string(), fields: field_map });
        Ok(())
    }

    /// Constrain two instructions to become opcode siblings (codes differing
    /// only in their final bit).
    pub fn pair(&mut self, first: &str, second: &str) {
        self.pairs.push((first.to_string(), second.to_string()));
    }

    pub fn build(self) -> Result<Catalog, CatalogError> {
        if self.word_bits == 0 || self.word_bits > DEFAULT_WORD_BITS {
            return Err(CatalogError::InvalidWordWidth {
                word_bits: self.word_bits,
                max: DEFAULT_WORD_BITS,
            });
        }

        for instruction in &self.instructions {
            let declared_bits = instruction.total_bits();
            if declared_bits > self.word_bits {
                return Err(CatalogError::WordOverflow {
                    instruction: instruction.name.clone(),
                    declared_bits,
                    word_bits: self.word_bits,
                });
            }
        }

        let mut paired = vec![false; self.instructions.len()];
        let mut pairs = Vec::with_capacity(self.pairs.len());
        for (first, second) in &self.pairs {
            if first == second {
                return Err(CatalogError::SelfPair { name: first.clone() });
            }
            let resolve = |name: &str| {
                self.instructions
                    .iter()
                    .position(|instruction| instruction.name == name)
                    .ok_or_else(|| CatalogError::UnknownPairInstruction { name: name.to_string() })
            };
            let (a, b) = (resolve(first)?, resolve(second)?);
            for index in [a, b] {
                if paired[index] {
                    return Err(CatalogError::OverlappingPairs {
                        name: self.instructions[index].name.clone(),
                    });
                }
                paired[index] = true;
            }
            pairs.push((a, b));
        }

        Ok(Catalog {
            word_bits: self.word_bits,
            registry: self.registry,
            instructions: self.instructions,
            pairs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_instruction_builder() -> CatalogBuilder {
        let mut builder = Catalog::builder(8);
        let x = builder.capability("x").unwrap();
        builder.instruction("load", [("value", Field::operand(3, x))]).unwrap();
        builder.instruction("store", [("value", Field::operand(3, x))]).unwrap();
        builder
    }

    #[test]
    fn builds_and_exposes_declaration_order() {
        let catalog = two_instruction_builder().build().unwrap();

        assert_eq!(catalog.word_bits(), 8);
        assert_eq!(catalog.word_mask(), 0xff);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.instruction(0).name(), "load");
        assert_eq!(catalog.index_of("store"), Some(1));
    }

    #[test]
    fn opcode_fields_are_counted_separately() {
        let mut builder = Catalog::builder(16);
        let load_reg = builder.capability("load_reg").unwrap();
        builder
            .instruction(
                "pop_push",
                [
                    ("store_flag", Field::opcode(1)),
                    ("data", Field::operand(3, load_reg)),
                    ("address", Field::operand(3, load_reg)),
                ],
            )
            .unwrap();
        let catalog = builder.build().unwrap();

        let instruction = catalog.instruction(0);
        assert_eq!(instruction.total_bits(), 7);
        assert_eq!(instruction.extra_opcode_bits(), 1);
        assert_eq!(instruction.operand_fields().count(), 2);
    }

    #[test]
    fn rejects_word_overflow() {
        let mut builder = Catalog::builder(4);
        let x = builder.capability("x").unwrap();
        builder.instruction("wide", [("value", Field::operand(5, x))]).unwrap();

        assert!(matches!(
            builder.build(),
            Err(CatalogError::WordOverflow { declared_bits: 5, word_bits: 4, .. })
        ));
    }

    #[test]
    fn rejects_duplicate_instruction() {
        let mut builder = two_instruction_builder();
        assert!(matches!(
            builder.instruction("load", []),
            Err(CatalogError::DuplicateInstruction { .. })
        ));
    }

    #[test]
    fn rejects_unknown_pair_target() {
        let mut builder = two_instruction_builder();
        builder.pair("load", "missing");
        assert!(matches!(
            builder.build(),
            Err(CatalogError::UnknownPairInstruction { .. })
        ));
    }

    #[test]
    fn rejects_overlapping_pairs() {
        let mut builder = two_instruction_builder();
        let x = builder.capability("x").unwrap();
        builder.instruction("third", [("value", Field::operand(3, x))]).unwrap();
        builder.pair("load", "store");
        builder.pair("load", "third");
        assert!(matches!(builder.build(), Err(CatalogError::OverlappingPairs { .. })));
    }

    #[test]
    fn zero_width_fields_are_kept() {
        let mut builder = Catalog::builder(8);
        let x = builder.capability("x").unwrap();
        builder.instruction("implicit", [("hardwired", Field::operand(0, x))]).unwrap();
        let catalog = builder.build().unwrap();

        let instruction = catalog.instruction(0);
        assert_eq!(instruction.total_bits(), 0);
        assert_eq!(instruction.operand_fields().count(), 1);
    }
}
