//! Synthesis errors.

/// Errors produced while assigning opcodes or searching field allocations.
///
/// Every failure here is a deterministic function of the input catalog and
/// the tunable parameters; retrying without changing either reproduces it.
#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    /// No maximum opcode length between 1 and the word width yields a valid
    /// prefix-free assignment: the instruction set cannot be encoded.
    #[error("instruction set cannot be encoded within a {word_bits}-bit word")]
    Unencodable { word_bits: u32 },

    /// An instruction's operand fields do not fit below its opcode.
    #[error(
        "instruction `{instruction}` cannot fit its fields under a {opcode_bits}-bit opcode in a {word_bits}-bit word"
    )]
    PlacementOverflow { instruction: String, opcode_bits: u32, word_bits: u32 },

    /// An instruction contributed no candidate placements to the search.
    #[error("instruction `{instruction}` has no candidate placements")]
    NoCandidates { instruction: String },

    /// The placement product is too large to scan within the configured
    /// bound; raise `max_combinations` or shrink the catalog.
    #[error("search space of {combinations} placement combinations exceeds the limit of {limit}")]
    SearchSpaceExceeded { combinations: u128, limit: u128 },

    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
}
