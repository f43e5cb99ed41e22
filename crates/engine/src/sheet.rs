//! The sheet: owner of the cell map, mediator of every cross-cell mutation.
//!
//! Edits go through [`Sheet::set_cell`] / [`Sheet::clear_cell`] only. After
//! each returns, the dependency graph mirrors the installed formulas, is
//! acyclic, and every stale cache has been dropped. A rejected edit leaves
//! the sheet exactly as it was.

use std::fmt::{self, Write};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cell::{Cell, CellBody};
use crate::dep_graph::DepGraph;
use crate::error::EngineError;
use crate::formula::{CellLookup, Value};
use crate::position::{Position, Size};

#[derive(Debug, Default)]
pub struct Sheet {
    cells: FxHashMap<Position, Cell>,
    deps: DepGraph,
}

impl Sheet {
    /// Create an empty sheet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cell at `pos` from raw input text.
    ///
    /// Classification: empty input clears the body, a leading `=` with at
    /// least one further character is a formula, everything else is text.
    ///
    /// Atomic: a syntax error or a cycle-inducing formula leaves the sheet
    /// untouched. On success, edges are rewired, referenced cells are
    /// materialized (empty) so their reader edges have a home, and stale
    /// caches are dropped transitively.
    pub fn set_cell(&mut self, pos: Position, text: &str) -> Result<(), EngineError> {
        if !pos.is_valid() {
            return Err(EngineError::InvalidPosition(pos));
        }

        let body = CellBody::from_input(text)?;

        let new_reads: FxHashSet<Position> = match &body {
            CellBody::Formula(formula) => formula.referenced_cells().into_iter().collect(),
            _ => FxHashSet::default(),
        };

        if let Some(cycle) = self.deps.would_create_cycle(pos, &new_reads) {
            return Err(EngineError::CircularDependency(cycle));
        }

        // Commit point: nothing below can fail.
        let old_reads: Vec<Position> = self.deps.reads_of(pos).collect();

        for read in &new_reads {
            self.cells.entry(*read).or_default();
        }
        self.deps.replace_edges(pos, new_reads);
        self.cells.entry(pos).or_default().install_body(body);

        self.invalidate_from(pos);
        self.drop_orphans(&old_reads);
        Ok(())
    }

    /// The cell at `pos`, or `None` when absent.
    pub fn get_cell(&self, pos: Position) -> Result<Option<&Cell>, EngineError> {
        if !pos.is_valid() {
            return Err(EngineError::InvalidPosition(pos));
        }
        Ok(self.cells.get(&pos))
    }

    /// Value form of the cell at `pos`; absent cells present as empty text.
    pub fn cell_value(&self, pos: Position) -> Result<Value, EngineError> {
        Ok(self
            .get_cell(pos)?
            .map(|cell| cell.value(self))
            .unwrap_or_else(|| Value::Text(String::new())))
    }

    /// Raw text of the cell at `pos`; absent cells present as `""`.
    pub fn cell_text(&self, pos: Position) -> Result<String, EngineError> {
        Ok(self
            .get_cell(pos)?
            .map(|cell| cell.text())
            .unwrap_or_default())
    }

    /// Clear the cell at `pos`, dropping it (and any referenced cells left
    /// empty and unread) once nothing references it.
    pub fn clear_cell(&mut self, pos: Position) -> Result<(), EngineError> {
        if !pos.is_valid() {
            return Err(EngineError::InvalidPosition(pos));
        }
        if !self.cells.contains_key(&pos) {
            return Ok(());
        }
        self.set_cell(pos, "")?;
        if !self.deps.is_referenced(pos) {
            self.cells.remove(&pos);
        }
        Ok(())
    }

    /// True when at least one formula reads `pos`.
    pub fn is_referenced(&self, pos: Position) -> bool {
        self.deps.is_referenced(pos)
    }

    /// Smallest rectangle anchored at A1 containing every cell with
    /// non-empty text. Cells that exist only because a formula reads them
    /// do not count.
    pub fn printable_size(&self) -> Size {
        let mut size = Size::default();
        for (pos, cell) in &self.cells {
            if !cell.is_empty() {
                size.rows = size.rows.max(pos.row + 1);
                size.cols = size.cols.max(pos.col + 1);
            }
        }
        size
    }

    /// Write the printable region as tab-separated value rows.
    pub fn print_values<W: Write>(&self, out: &mut W) -> fmt::Result {
        self.print_region(out, |sheet, cell| cell.value(sheet).to_string())
    }

    /// Write the printable region as tab-separated raw-text rows.
    pub fn print_texts<W: Write>(&self, out: &mut W) -> fmt::Result {
        self.print_region(out, |_, cell| cell.text())
    }

    fn print_region<W, F>(&self, out: &mut W, render: F) -> fmt::Result
    where
        W: Write,
        F: Fn(&Sheet, &Cell) -> String,
    {
        let size = self.printable_size();
        for row in 0..size.rows {
            for col in 0..size.cols {
                if col > 0 {
                    out.write_char('\t')?;
                }
                if let Some(cell) = self.cells.get(&Position::new(row, col)) {
                    out.write_str(&render(self, cell))?;
                }
            }
            out.write_char('\n')?;
        }
        Ok(())
    }

    /// Drop previously referenced cells that are now empty and unread.
    fn drop_orphans(&mut self, candidates: &[Position]) {
        for &pos in candidates {
            if self.deps.is_referenced(pos) {
                continue;
            }
            if self.cells.get(&pos).is_some_and(|cell| cell.is_empty()) {
                self.cells.remove(&pos);
            }
        }
    }

    /// Propagate staleness from an edited cell.
    ///
    /// The edited cell's cache is dropped unconditionally (it may have been
    /// empty while its readers are stale); from there the walk follows
    /// reader edges and stops at cells that had no cached value.
    fn invalidate_from(&self, start: Position) {
        if let Some(cell) = self.cells.get(&start) {
            cell.invalidate_cache();
        }

        let mut visited = FxHashSet::default();
        let mut stack: Vec<Position> = self.deps.readers_of(start).collect();

        while let Some(pos) = stack.pop() {
            if !visited.insert(pos) {
                continue;
            }
            if let Some(cell) = self.cells.get(&pos) {
                if cell.has_cached_value() {
                    cell.invalidate_cache();
                    stack.extend(self.deps.readers_of(pos));
                }
            }
        }
    }

    #[cfg(test)]
    fn assert_graph_consistent(&self) {
        self.deps.assert_consistent();
    }
}

impl CellLookup for Sheet {
    fn value_at(&self, pos: Position) -> Option<Value> {
        self.cells.get(&pos).map(|cell| cell.value(self))
    }
}
