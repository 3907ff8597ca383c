//! Exhaustive parallel search over the placement product.
//!
//! The search space is the Cartesian product of every instruction's
//! candidate placements. It is split into a task prefix (the smallest
//! leading slice of instructions whose combination count reaches a small
//! multiple of the worker count) and a remainder suffix. Every worker owns
//! one fixed prefix combination, pre-merges its slot map once, exhaustively
//! scans the whole remainder product and reports its local best over a
//! channel. The coordinating thread is the only writer of the global best;
//! workers never observe each other's state.
//!
//! Ties are broken by the combination's lexicographic rank in the canonical
//! iteration order (instruction 0's choice most significant), so for a
//! fixed catalog the winning allocation is reproducible no matter how the
//! workers are scheduled. The search is exhaustive: once the channel closes
//! the accepted best is the true optimum, not a heuristic.

use std::sync::mpsc;

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use rayon::ThreadPoolBuilder;
use tracing::debug;

use opforge_core::{Catalog, CapabilitySet};

use crate::cost::{Cost, SlotMap};
use crate::error::SynthError;
use crate::placement::Placement;
use crate::progress::ProgressSink;

/// Tunables for the global search.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Worker count; defaults to the available processing units.
    pub workers: usize,
    /// Target number of tasks per worker; more tasks smooth out imbalance
    /// between cheap and expensive prefixes.
    pub task_oversubscription: usize,
    /// Upper bound on the combination count the search will accept.
    pub max_combinations: u128,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            workers: std::thread::available_parallelism().map(usize::from).unwrap_or(1),
            task_oversubscription: 16,
            max_combinations: 1 << 40,
        }
    }
}

/// One chosen placement per instruction, with its cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalAllocation {
    /// Indexed by instruction declaration order.
    pub placements: Vec<Placement>,
    pub cost: Cost,
}

/// A physical decode slot shared by every field that landed on `mask`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedGroup {
    pub mask: u16,
    pub capabilities: CapabilitySet,
    /// (instruction name, field name) of every user, in declaration order.
    pub users: Vec<(String, String)>,
}

impl GlobalAllocation {
    /// Mask assigned to `(instruction_index, field_index)`, if that field is
    /// an operand field.
    pub fn field_mask(&self, instruction_index: usize, field_index: usize) -> Option<u16> {
        self.placements.get(instruction_index)?.mask_of(field_index)
    }

    /// Group the allocation by shared bitmask, merging capability sets and
    /// collecting users; sorted by mask.
    pub fn merged_groups(&self, catalog: &Catalog) -> Vec<MergedGroup> {
        let mut groups: std::collections::BTreeMap<u16, MergedGroup> =
            std::collections::BTreeMap::new();
        for (instruction_index, placement) in self.placements.iter().enumerate() {
            let instruction = catalog.instruction(instruction_index);
            for field in &placement.fields {
                let group = groups.entry(field.mask).or_insert_with(|| MergedGroup {
                    mask: field.mask,
                    capabilities: CapabilitySet::EMPTY,
                    users: Vec::new(),
                });
                group.capabilities |= field.capabilities;
                group.users.push((
                    instruction.name().to_string(),
                    instruction.field_name(field.field_index).unwrap_or_default().to_string(),
                ));
            }
        }
        groups.into_values().collect()
    }
}

/// A worker's best combination: cost plus the combination's lexicographic
/// rank, the deterministic tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct LocalBest {
    cost: Cost,
    rank: u128,
}

/// Find the placement combination minimizing the cost model.
///
/// `candidates` holds one non-empty placement list per instruction, in
/// declaration order. Every strict improvement of the global best is
/// forwarded to `sink`; the final result is only claimed once every worker
/// has reported.
pub fn search(
    catalog: &Catalog,
    candidates: &[Vec<Placement>],
    config: &SearchConfig,
    sink: &mut dyn ProgressSink,
) -> Result<GlobalAllocation, SynthError> {
    debug_assert_eq!(candidates.len(), catalog.len());
    if candidates.is_empty() {
        return Ok(GlobalAllocation { placements: Vec::new(), cost: SlotMap::new().cost() });
    }
    for (index, list) in candidates.iter().enumerate() {
        if list.is_empty() {
            return Err(SynthError::NoCandidates {
                instruction: catalog.instruction(index).name().to_string(),
            });
        }
    }

    let lens: Vec<u128> = candidates.iter().map(|list| list.len() as u128).collect();
    let total = lens.iter().fold(1u128, |product, &len| product.saturating_mul(len));
    if total > config.max_combinations {
        return Err(SynthError::SearchSpaceExceeded {
            combinations: total,
            limit: config.max_combinations,
        });
    }

    // Task split: just enough leading instructions that every worker gets
    // several independent prefixes.
    let target = (config.workers.max(1) * config.task_oversubscription.max(1)) as u128;
    let mut split = 0;
    let mut task_count = 1u128;
    while split < lens.len() && task_count < target {
        task_count *= lens[split];
        split += 1;
    }
    let remainder_size = total / task_count;
    let tasks = u64::try_from(task_count).map_err(|_| SynthError::SearchSpaceExceeded {
        combinations: total,
        limit: config.max_combinations,
    })?;

    debug!(
        combinations = %total,
        tasks,
        remainder_size = %remainder_size,
        workers = config.workers,
        "searching placement product"
    );

    let pool = ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .build()
        .map_err(|err| SynthError::WorkerPool(err.to_string()))?;

    let (tx, rx) = mpsc::channel::<LocalBest>();
    let mut best: Option<LocalBest> = None;

    pool.in_place_scope(|scope| {
        scope.spawn(|_| {
            (0..tasks).into_par_iter().for_each_with(tx, |tx, task| {
                let local = scan_task(candidates, &lens, split, task, remainder_size);
                let _ = tx.send(local);
            });
        });

        // Single-writer reduction: the coordinator alone touches `best`.
        for local in rx.iter() {
            if best.is_none_or(|current| local < current) {
                best = Some(local);
                sink.improved(&allocation_at(candidates, &lens, local));
            }
        }
    });

    // All workers have reported; the accepted best is the optimum.
    let best = best.ok_or(SynthError::NoCandidates {
        instruction: catalog.instruction(0).name().to_string(),
    })?;
    Ok(allocation_at(candidates, &lens, best))
}

/// Exhaustively scan one task: a fixed prefix combination crossed with the
/// whole remainder product.
fn scan_task(
    candidates: &[Vec<Placement>],
    lens: &[u128],
    split: usize,
    task: u64,
    remainder_size: u128,
) -> LocalBest {
    // Decode the task id into prefix choices, instruction 0 most
    // significant, and pre-merge their slots once.
    let mut prefix_choice = vec![0usize; split];
    let mut id = task as u128;
    for index in (0..split).rev() {
        prefix_choice[index] = (id % lens[index]) as usize;
        id /= lens[index];
    }
    let mut prefix_slots = SlotMap::new();
    for (index, &choice) in prefix_choice.iter().enumerate() {
        prefix_slots.add_placement(&candidates[index][choice]);
    }

    let remainder = &candidates[split..];
    let mut choice = vec![0usize; remainder.len()];
    let mut rank_in_task = 0u128;
    let mut best: Option<LocalBest> = None;

    loop {
        let mut slots = prefix_slots.clone();
        for (list, &index) in remainder.iter().zip(choice.iter()) {
            slots.add_placement(&list[index]);
        }
        let local = LocalBest {
            cost: slots.cost(),
            rank: task as u128 * remainder_size + rank_in_task,
        };
        if best.is_none_or(|current| local < current) {
            best = Some(local);
        }

        rank_in_task += 1;
        // Odometer over the remainder choices, last instruction fastest.
        let mut position = remainder.len();
        loop {
            if position == 0 {
                return best.unwrap_or(local);
            }
            position -= 1;
            choice[position] += 1;
            if choice[position] < remainder[position].len() {
                break;
            }
            choice[position] = 0;
        }
    }
}

/// Rebuild the concrete allocation for a combination rank.
fn allocation_at(candidates: &[Vec<Placement>], lens: &[u128], best: LocalBest) -> GlobalAllocation {
    let mut choice = vec![0usize; lens.len()];
    let mut rank = best.rank;
    for index in (0..lens.len()).rev() {
        choice[index] = (rank % lens[index]) as usize;
        rank /= lens[index];
    }
    GlobalAllocation {
        placements: choice
            .iter()
            .enumerate()
            .map(|(index, &pick)| candidates[index][pick].clone())
            .collect(),
        cost: best.cost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::assign_opcodes;
    use crate::placement::candidate_placements;
    use crate::progress::NullSink;
    use opforge_core::Field;

    fn searched(catalog: &Catalog, config: &SearchConfig) -> GlobalAllocation {
        let assignment = assign_opcodes(catalog).unwrap();
        let candidates = candidate_placements(catalog, &assignment).unwrap();
        search(catalog, &candidates, config, &mut NullSink).unwrap()
    }

    fn abc_catalog() -> Catalog {
        let mut builder = Catalog::builder(8);
        let x = builder.capability("x").unwrap();
        builder.instruction("a", [("val", Field::operand(3, x))]).unwrap();
        builder.instruction("b", [("val", Field::operand(3, x))]).unwrap();
        builder.instruction("c", []).unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn shared_capability_fields_land_on_one_mask() {
        let catalog = abc_catalog();
        let best = searched(&catalog, &SearchConfig::default());

        // Both 3-bit fields need only capability x, so the optimum shares
        // one slot: one control line on one mask.
        assert_eq!(best.cost, Cost { control_lines: 1, decode_slots: 1 });
        assert_eq!(best.field_mask(0, 0), best.field_mask(1, 0));

        let groups = best.merged_groups(&catalog);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].users.len(), 2);
    }

    #[test]
    fn search_is_deterministic_across_runs_and_worker_counts() {
        let catalog = abc_catalog();
        let first = searched(&catalog, &SearchConfig::default());
        let second = searched(&catalog, &SearchConfig::default());
        let serial =
            searched(&catalog, &SearchConfig { workers: 1, ..SearchConfig::default() });

        assert_eq!(first, second);
        assert_eq!(first, serial);
    }

    #[test]
    fn oversized_products_are_rejected_up_front() {
        let catalog = abc_catalog();
        let assignment = assign_opcodes(&catalog).unwrap();
        let candidates = candidate_placements(&catalog, &assignment).unwrap();
        let config = SearchConfig { max_combinations: 1, ..SearchConfig::default() };

        assert!(matches!(
            search(&catalog, &candidates, &config, &mut NullSink),
            Err(SynthError::SearchSpaceExceeded { limit: 1, .. })
        ));
    }

    #[test]
    fn empty_catalog_searches_to_an_empty_allocation() {
        let catalog = Catalog::builder(16).build().unwrap();
        let best = search(&catalog, &[], &SearchConfig::default(), &mut NullSink).unwrap();
        assert!(best.placements.is_empty());
        assert_eq!(best.cost, Cost { control_lines: 0, decode_slots: 0 });
    }
}
