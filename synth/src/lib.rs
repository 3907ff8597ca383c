//! Encoding synthesis for a fixed-width instruction word.
//!
//! Two outputs are computed from a validated instruction catalog:
//!
//! - a prefix-free, minimal-maximum-length opcode per instruction
//!   ([`opcode`]), and
//! - a placement of every instruction's operand fields onto concrete bit
//!   positions minimizing the decoder hardware cost ([`placement`],
//!   [`search`], [`cost`]).
//!
//! Both are pure functions of the catalog plus the search tunables, so a
//! rerun over the same inputs reproduces them bit for bit.

pub mod cost;
pub mod error;
pub mod opcode;
pub mod placement;
pub mod progress;
pub mod search;

pub use cost::{Cost, SlotMap};
pub use error::SynthError;
pub use opcode::{assign_opcodes, Opcode, OpcodeAssignment};
pub use placement::{candidate_placements, placements, PlacedField, Placement};
pub use progress::{NullSink, ProgressSink};
pub use search::{search, GlobalAllocation, MergedGroup, SearchConfig};

use opforge_core::Catalog;

/// The two synthesis outputs together.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub opcodes: OpcodeAssignment,
    pub allocation: GlobalAllocation,
}

/// Run the full pipeline: opcode assignment, candidate enumeration, global
/// search. Improvements stream to `sink` while the search runs.
pub fn synthesize(
    catalog: &Catalog,
    config: &SearchConfig,
    sink: &mut dyn ProgressSink,
) -> Result<Synthesis, SynthError> {
    let opcodes = assign_opcodes(catalog)?;
    let candidates = candidate_placements(catalog, &opcodes)?;
    let allocation = search(catalog, &candidates, config, sink)?;
    Ok(Synthesis { opcodes, allocation })
}
