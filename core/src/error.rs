//! Catalog construction and loading errors.

/// Errors detected while building or validating an instruction catalog.
///
/// All of these are deterministic functions of the catalog definition, so
/// they are surfaced immediately and never retried.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("word width {word_bits} is out of range (1..={max})")]
    InvalidWordWidth { word_bits: u32, max: u32 },

    #[error("more than {limit} distinct capabilities")]
    TooManyCapabilities { limit: usize },

    #[error("unknown capability `{capability}` in field `{instruction}/{field}`")]
    UnknownCapability { instruction: String, field: String, capability: String },

    #[error("field `{instruction}/{field}` is marked as opcode but also names capabilities")]
    OpcodeFieldWithCapabilities { instruction: String, field: String },

    #[error("duplicate instruction `{name}`")]
    DuplicateInstruction { name: String },

    #[error("duplicate field `{field}` in instruction `{instruction}`")]
    DuplicateField { instruction: String, field: String },

    #[error("instruction `{instruction}` declares {declared_bits} field bits, more than the {word_bits}-bit word")]
    WordOverflow { instruction: String, declared_bits: u32, word_bits: u32 },

    #[error("pairing constraint references unknown instruction `{name}`")]
    UnknownPairInstruction { name: String },

    #[error("instruction `{name}` is paired with itself")]
    SelfPair { name: String },

    #[error("instruction `{name}` appears in more than one pairing constraint")]
    OverlappingPairs { name: String },
}

/// Errors produced while reading a catalog definition file.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
