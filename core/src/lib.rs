//! Instruction catalog model for the encoding synthesizer.
//!
//! This crate holds the pure data side of the system: capability signals,
//! fields, instructions and the validated [`Catalog`], plus the JSON loader
//! for catalog definition files. All optimization lives in `opforge-synth`.

pub mod capability;
pub mod catalog;
pub mod error;
pub mod loader;

pub use capability::{CapabilityRegistry, CapabilitySet, MAX_CAPABILITIES};
pub use catalog::{Catalog, CatalogBuilder, Field, FieldRole, Instruction, DEFAULT_WORD_BITS};
pub use error::{CatalogError, LoadError};
