//! Read/reader adjacency between cells.
//!
//! Every formula edit rewires two mirrored maps: which cells a formula
//! pulls values from, and which formulas pull from a given cell. The
//! mirror is what keeps staleness propagation and the pre-edit cycle
//! probe cheap: both only ever walk reader edges.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::CycleError;
use crate::position::Position;

/// Mirrored adjacency over formula references.
///
/// `reads` holds the forward direction (formula cell to the cells it
/// reads), `readers` the reverse. Both maps always describe the same edge
/// set and neither stores an empty set; a cell with no formula simply has
/// no entry. All rewiring funnels through [`DepGraph::replace_edges`] so
/// the mirror cannot drift.
#[derive(Default, Debug, Clone)]
pub struct DepGraph {
    /// cell -> cells its formula reads
    reads: FxHashMap<Position, FxHashSet<Position>>,

    /// cell -> formula cells that read it
    readers: FxHashMap<Position, FxHashSet<Position>>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cells the formula at `cell` reads.
    pub fn reads_of(&self, cell: Position) -> impl Iterator<Item = Position> + '_ {
        self.reads.get(&cell).into_iter().flatten().copied()
    }

    /// Formula cells that read `cell`.
    pub fn readers_of(&self, cell: Position) -> impl Iterator<Item = Position> + '_ {
        self.readers.get(&cell).into_iter().flatten().copied()
    }

    /// Whether any formula currently reads `cell`.
    pub fn is_referenced(&self, cell: Position) -> bool {
        self.readers.contains_key(&cell)
    }

    /// Number of cells that currently have read edges.
    pub fn formula_cell_count(&self) -> usize {
        self.reads.len()
    }

    /// Number of cells some formula reads.
    pub fn referenced_cell_count(&self) -> usize {
        self.readers.len()
    }

    /// Swap the read set of `cell`, keeping the mirror exact.
    ///
    /// The old edges are unhooked before the new set is wired in, and a
    /// reader set that ends up empty is removed rather than kept around.
    /// Passing an empty `new_reads` leaves `cell` with no entry at all,
    /// which is how non-formula cells are represented.
    pub fn replace_edges(&mut self, cell: Position, new_reads: FxHashSet<Position>) {
        if let Some(old_reads) = self.reads.remove(&cell) {
            for old in old_reads {
                let emptied = self
                    .readers
                    .get_mut(&old)
                    .map(|set| {
                        set.remove(&cell);
                        set.is_empty()
                    })
                    .unwrap_or(false);
                if emptied {
                    self.readers.remove(&old);
                }
            }
        }

        if new_reads.is_empty() {
            return;
        }
        for &read in &new_reads {
            self.readers.entry(read).or_default().insert(cell);
        }
        self.reads.insert(cell, new_reads);
    }

    /// Forget the read set of `cell` (its formula went away).
    pub fn clear_cell(&mut self, cell: Position) {
        self.replace_edges(cell, FxHashSet::default());
    }

    /// Probe whether installing `new_reads` on `cell` would close a cycle.
    ///
    /// Read-only. A new edge `cell -> r` is safe unless `r` already sits
    /// downstream of `cell`, so the probe walks reader edges outward from
    /// `cell` and fails as soon as the frontier touches the proposed read
    /// set. Mentioning yourself is the degenerate one-hop case and is
    /// reported separately.
    pub fn would_create_cycle(
        &self,
        cell: Position,
        new_reads: &FxHashSet<Position>,
    ) -> Option<CycleError> {
        if new_reads.contains(&cell) {
            return Some(CycleError::self_reference(cell));
        }
        if new_reads.is_empty() {
            return None;
        }

        let mut seen = FxHashSet::default();
        seen.insert(cell);
        let mut frontier: Vec<Position> = self.readers_of(cell).collect();

        while let Some(current) = frontier.pop() {
            if !seen.insert(current) {
                continue;
            }
            if new_reads.contains(&current) {
                return Some(CycleError::cycle(vec![current, cell]));
            }
            frontier.extend(self.readers_of(current));
        }

        None
    }

    /// Panic unless both maps tell the same story.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (&cell, reads) in &self.reads {
            assert!(!reads.is_empty(), "stored an empty read set for {}", cell);
            for read in reads {
                assert!(
                    self.readers.get(read).is_some_and(|s| s.contains(&cell)),
                    "{} reads {} but the reverse edge is missing",
                    cell,
                    read
                );
            }
        }
        for (&cell, readers) in &self.readers {
            assert!(!readers.is_empty(), "stored an empty reader set for {}", cell);
            for reader in readers {
                assert!(
                    self.reads.get(reader).is_some_and(|s| s.contains(&cell)),
                    "{} is read by {} but the forward edge is missing",
                    cell,
                    reader
                );
            }
        }
    }
}
