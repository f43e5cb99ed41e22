//! The formula layer: parsing, evaluation, reference enumeration.

pub mod eval;
pub mod parser;
pub mod refs;

pub use eval::{CellLookup, FormulaError, FormulaValue, Value};

use crate::error::EngineError;
use crate::position::Position;

use self::parser::Expr;

/// A parsed arithmetic formula.
///
/// Immutable after construction. Evaluation never fails at the Rust level:
/// formula errors come back as values.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    ast: Expr,
}

/// Parse an expression (without the leading `=` marker) into a [`Formula`].
pub fn parse_formula(expression: &str) -> Result<Formula, EngineError> {
    Formula::parse(expression)
}

impl Formula {
    /// Parse an expression, wrapping any parser diagnostic in
    /// [`EngineError::Syntax`].
    pub fn parse(expression: &str) -> Result<Formula, EngineError> {
        let ast = parser::parse(expression).map_err(EngineError::Syntax)?;
        Ok(Formula { ast })
    }

    /// Evaluate against a cell lookup.
    pub fn evaluate<L: CellLookup>(&self, lookup: &L) -> FormulaValue {
        match eval::evaluate(&self.ast, lookup) {
            Ok(n) => FormulaValue::Number(n),
            Err(e) => FormulaValue::Error(e),
        }
    }

    /// The valid positions this formula reads, first occurrence first.
    pub fn referenced_cells(&self) -> Vec<Position> {
        refs::unique_valid_positions(&self.ast)
    }

    /// Canonical text form, idempotent under re-parsing.
    pub fn expression(&self) -> String {
        self.ast.to_string()
    }
}
