//! Catalog definition file loader.
//!
//! The on-disk format is a single JSON document:
//!
//! ```json
//! {
//!     "word_bits": 16,
//!     "capabilities": ["load_reg", "reg_to_left_bus"],
//!     "instructions": {
//!         "pop_push": {
//!             "store_flag": { "width": 1, "opcode": true },
//!             "data": { "width": 3, "caps": ["load_reg", "reg_to_left_bus"] }
//!         },
//!         "reti": {}
//!     },
//!     "pairs": [["pop_push", "other"]]
//! }
//! ```
//!
//! `word_bits` defaults to 16 and `pairs` to empty. Field order inside an
//! instruction is significant and preserved (`preserve_order` / `IndexMap`).

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::capability::CapabilitySet;
use crate::catalog::{Catalog, Field, DEFAULT_WORD_BITS};
use crate::error::{CatalogError, LoadError};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default = "default_word_bits")]
    word_bits: u32,
    #[serde(default)]
    capabilities: Vec<String>,
    instructions: IndexMap<String, IndexMap<String, FieldSpec>>,
    #[serde(default)]
    pairs: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldSpec {
    width: u32,
    #[serde(default)]
    caps: Vec<String>,
    #[serde(default)]
    opcode: bool,
}

fn default_word_bits() -> u32 {
    DEFAULT_WORD_BITS
}

impl Catalog {
    /// Parse a catalog from its JSON definition.
    pub fn from_json(json: &str) -> Result<Catalog, LoadError> {
        let file: CatalogFile = serde_json::from_str(json)?;

        let mut builder = Catalog::builder(file.word_bits);
        for capability in &file.capabilities {
            builder.capability(capability)?;
        }

        for (name, fields) in &file.instructions {
            let mut resolved = Vec::with_capacity(fields.len());
            for (field_name, spec) in fields {
                let field = if spec.opcode {
                    if !spec.caps.is_empty() {
                        return Err(CatalogError::OpcodeFieldWithCapabilities {
                            instruction: name.clone(),
                            field: field_name.clone(),
                        }
                        .into());
                    }
                    Field::opcode(spec.width)
                } else {
                    let mut capabilities = CapabilitySet::EMPTY;
                    for capability in &spec.caps {
                        capabilities |= builder.registry().get(capability).ok_or_else(|| {
                            CatalogError::UnknownCapability {
                                instruction: name.clone(),
                                field: field_name.clone(),
                                capability: capability.clone(),
                            }
                        })?;
                    }
                    Field::operand(spec.width, capabilities)
                };
                resolved.push((field_name.as_str(), field));
            }
            builder.instruction(name, resolved)?;
        }

        for (first, second) in &file.pairs {
            builder.pair(first, second);
        }

        Ok(builder.build()?)
    }

    /// Load a catalog from a JSON definition file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Catalog, LoadError> {
        let json = std::fs::read_to_string(path)?;
        Catalog::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_CATALOG: &str = r#"{
        "word_bits": 8,
        "capabilities": ["x", "y"],
        "instructions": {
            "a": { "val": { "width": 3, "caps": ["x"] } },
            "b": { "flag": { "width": 1, "opcode": true },
                   "val": { "width": 3, "caps": ["x", "y"] } },
            "c": {}
        },
        "pairs": [["a", "b"]]
    }"#;

    #[test]
    fn loads_a_full_catalog() {
        let catalog = Catalog::from_json(SMALL_CATALOG).unwrap();

        assert_eq!(catalog.word_bits(), 8);
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.registry().len(), 2);
        assert_eq!(catalog.pairs(), &[(0, 1)]);

        let b = catalog.instruction(1);
        assert_eq!(b.extra_opcode_bits(), 1);
        let (_, name, field) = b.operand_fields().next().unwrap();
        assert_eq!(name, "val");
        assert_eq!(field.capabilities().count(), 2);
    }

    #[test]
    fn word_bits_defaults_to_sixteen() {
        let catalog = Catalog::from_json(r#"{ "instructions": { "nop": {} } }"#).unwrap();
        assert_eq!(catalog.word_bits(), DEFAULT_WORD_BITS);
    }

    #[test]
    fn rejects_unknown_capability() {
        let err = Catalog::from_json(
            r#"{ "capabilities": [], "instructions": { "a": { "val": { "width": 2, "caps": ["nope"] } } } }"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LoadError::Catalog(CatalogError::UnknownCapability { .. })
        ));
    }

    #[test]
    fn rejects_opcode_field_with_capabilities() {
        let err = Catalog::from_json(
            r#"{ "capabilities": ["x"], "instructions": { "a": { "op": { "width": 2, "opcode": true, "caps": ["x"] } } } }"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LoadError::Catalog(CatalogError::OpcodeFieldWithCapabilities { .. })
        ));
    }
}
