//! Prefix-free opcode assignment.
//!
//! Instructions get opcodes from a Huffman-style merge over "capacity"
//! instead of frequency: a leaf's capacity is the number of additional
//! prefix bits the instruction can still absorb without overflowing either
//! the instruction word or the trial maximum opcode length. Merging the two
//! highest-capacity subtrees first keeps short codes for the instructions
//! with the least room, which is exactly what minimizes the maximum code
//! length.
//!
//! Instructions may reserve some of their own field bits as in-word
//! discriminators (opcode-role fields). Those bits count toward the opcode
//! length budget but are not part of the assigned prefix; they render as `x`
//! in the code string, e.g. `101xx`.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, BTreeMap, BTreeSet};
use std::fmt;

use opforge_core::Catalog;

use crate::error::SynthError;

/// One instruction's opcode: an assigned prefix (most-significant bits of
/// the word) plus the count of reserved in-word discriminator bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    prefix: u16,
    prefix_len: u32,
    extra_bits: u32,
}

impl Opcode {
    pub fn prefix(&self) -> u16 {
        self.prefix
    }

    pub fn prefix_len(&self) -> u32 {
        self.prefix_len
    }

    pub fn extra_bits(&self) -> u32 {
        self.extra_bits
    }

    /// Total opcode length: assigned prefix plus reserved discriminator
    /// bits. The top `total_len()` bits of the word belong to the opcode.
    pub fn total_len(&self) -> u32 {
        self.prefix_len + self.extra_bits
    }

    /// Mask of the word bits occupied by this opcode (prefix and
    /// discriminators).
    pub fn region_mask(&self, word_bits: u32) -> u16 {
        let len = self.total_len();
        if len == 0 {
            return 0;
        }
        (((1u32 << len) - 1) << (word_bits - len)) as u16
    }

    /// True if this opcode's assigned prefix is a prefix of `other`'s.
    pub fn is_prefix_of(&self, other: &Opcode) -> bool {
        self.prefix_len <= other.prefix_len
            && other.prefix >> (other.prefix_len - self.prefix_len) == self.prefix
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in (0..self.prefix_len).rev() {
            write!(f, "{}", (self.prefix >> i) & 1)?;
        }
        for _ in 0..self.extra_bits {
            write!(f, "x")?;
        }
        Ok(())
    }
}

/// Prefix-free opcode assignment for a whole catalog, indexed by
/// instruction declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpcodeAssignment {
    codes: Vec<Opcode>,
    max_opcode_len: u32,
}

impl OpcodeAssignment {
    pub fn opcode(&self, instruction_index: usize) -> &Opcode {
        &self.codes[instruction_index]
    }

    pub fn codes(&self) -> &[Opcode] {
        &self.codes
    }

    /// Longest total opcode length actually assigned.
    pub fn max_opcode_len(&self) -> u32 {
        self.max_opcode_len
    }
}

/// A subtree of the merge: the codes built so far and the prefix bits the
/// subtree can still absorb.
struct MergeNode {
    capacity: i32,
    min_id: usize,
    max_id: usize,
    /// (instruction index, prefix bits, prefix length)
    codes: Vec<(usize, u16, u32)>,
}

impl MergeNode {
    fn leaf(id: usize, capacity: i32) -> Self {
        MergeNode { capacity, min_id: id, max_id: id, codes: vec![(id, 0, 0)] }
    }

    /// Merge two subtrees, prepending `0` to the left side's codes and `1`
    /// to the right side's. Returns `None` once a side runs out of capacity.
    fn merge(left: MergeNode, right: MergeNode) -> Option<MergeNode> {
        let capacity = left.capacity.min(right.capacity) - 1;
        if capacity < 0 {
            return None;
        }

        let mut codes = Vec::with_capacity(left.codes.len() + right.codes.len());
        for (id, bits, len) in left.codes {
            codes.push((id, bits, len + 1));
        }
        for (id, bits, len) in right.codes {
            codes.push((id, bits | (1 << len), len + 1));
        }

        Some(MergeNode {
            capacity,
            min_id: left.min_id.min(right.min_id),
            max_id: left.max_id.max(right.max_id),
            codes,
        })
    }
}

// Max-heap order: largest capacity pops first; capacity ties prefer the
// subtree containing the earliest-declared instruction, then the one whose
// latest member is earliest. This is the canonical tie-break rule.
impl Ord for MergeNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.capacity
            .cmp(&other.capacity)
            .then_with(|| other.min_id.cmp(&self.min_id))
            .then_with(|| other.max_id.cmp(&self.max_id))
    }
}

impl PartialOrd for MergeNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MergeNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeNode {}

/// Assign a prefix-free opcode to every instruction, minimizing the maximum
/// opcode length. Trial lengths grow from 1 to the word width; the first
/// length the merge succeeds under is adopted.
pub fn assign_opcodes(catalog: &Catalog) -> Result<OpcodeAssignment, SynthError> {
    if catalog.is_empty() {
        return Ok(OpcodeAssignment { codes: Vec::new(), max_opcode_len: 0 });
    }

    for trial in 1..=catalog.word_bits() {
        if let Some(mut raw) = try_trial(catalog, trial) {
            normalize(&mut raw);

            let codes = raw
                .into_iter()
                .enumerate()
                .map(|(id, (prefix, prefix_len))| Opcode {
                    prefix,
                    prefix_len,
                    extra_bits: catalog.instruction(id).extra_opcode_bits(),
                })
                .collect::<Vec<_>>();
            let max_opcode_len = codes.iter().map(Opcode::total_len).max().unwrap_or(0);

            return Ok(OpcodeAssignment { codes, max_opcode_len });
        }
    }

    Err(SynthError::Unencodable { word_bits: catalog.word_bits() })
}

/// Run one merge under a trial maximum opcode length. Returns the raw
/// (prefix bits, prefix length) per instruction, or `None` if the trial is
/// infeasible.
fn try_trial(catalog: &Catalog, trial: u32) -> Option<Vec<(u16, u32)>> {
    let word_bits = catalog.word_bits();

    let mut nodes = Vec::with_capacity(catalog.len());
    for (id, instruction) in catalog.instructions().iter().enumerate() {
        let used_bits = instruction.total_bits();
        let extra_opcode_bits = instruction.extra_opcode_bits();
        if extra_opcode_bits >= trial {
            return None;
        }
        let capacity = (word_bits - used_bits).min(trial - extra_opcode_bits) as i32;
        nodes.push(MergeNode::leaf(id, capacity));
    }

    // Pairing constraints become sibling subtrees before the generic merge.
    for &(first, second) in catalog.pairs() {
        let left = take_node(&mut nodes, first)?;
        let right = take_node(&mut nodes, second)?;
        nodes.push(MergeNode::merge(left, right)?);
    }

    let mut heap = BinaryHeap::from(nodes);
    while heap.len() > 1 {
        let left = heap.pop()?;
        let right = heap.pop()?;
        heap.push(MergeNode::merge(left, right)?);
    }

    let root = heap.pop()?;
    let mut raw = vec![(0u16, 0u32); catalog.len()];
    for (id, bits, len) in root.codes {
        raw[id] = (bits, len);
    }
    Some(raw)
}

fn take_node(nodes: &mut Vec<MergeNode>, instruction: usize) -> Option<MergeNode> {
    let position = nodes.iter().position(|node| {
        node.codes.iter().any(|(id, _, _)| *id == instruction)
    })?;
    Some(nodes.swap_remove(position))
}

#[derive(Default)]
struct GroupWeight {
    sum: u64,
    count: u64,
    max: usize,
}

impl GroupWeight {
    fn add(&mut self, id: usize) {
        self.sum += id as u64;
        self.count += 1;
        self.max = self.max.max(id);
    }

    // (mean, max) declaration-order weight; means compared without division.
    fn lighter_than(&self, other: &GroupWeight) -> bool {
        (self.sum * other.count)
            .cmp(&(other.sum * self.count))
            .then_with(|| self.max.cmp(&other.max))
            == Ordering::Less
    }
}

/// Cosmetic, length-preserving normalization: for every shared-prefix length
/// from long to short, sibling code groups are swapped so the group with the
/// lower declaration-order weight takes the lexicographically earlier
/// prefix. Uniqueness and code lengths are untouched.
fn normalize(raw: &mut [(u16, u32)]) {
    let max_len = raw.iter().map(|&(_, len)| len).max().unwrap_or(0);

    for plen in (1..=max_len).rev() {
        let mut groups: BTreeMap<u16, GroupWeight> = BTreeMap::new();
        for (id, &(bits, len)) in raw.iter().enumerate() {
            if len >= plen {
                groups.entry(bits >> (len - plen)).or_default().add(id);
            }
        }

        let parents: BTreeSet<u16> = groups.keys().map(|prefix| prefix >> 1).collect();
        for parent in parents {
            let zero = parent << 1;
            let one = zero | 1;
            let swap = match (groups.get(&zero), groups.get(&one)) {
                (Some(g0), Some(g1)) => g1.lighter_than(g0),
                _ => false,
            };
            if swap {
                for (bits, len) in raw.iter_mut() {
                    if *len >= plen && (*bits >> (*len - plen)) >> 1 == parent {
                        *bits ^= 1 << (*len - plen);
                    }
                }
            }
        }
    }
}
