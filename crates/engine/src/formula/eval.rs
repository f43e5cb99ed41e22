// Formula evaluator - evaluates expression trees against a cell lookup

use serde::{Deserialize, Serialize};

use crate::position::Position;

use super::parser::{BinaryOp, Expr, UnaryOp};

/// Evaluation failure, stored and displayed as a cell value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormulaError {
    /// Reference to a position outside the sheet bounds, or to a cell
    /// whose own value is a `Ref` error.
    Ref,
    /// A referenced text cell does not parse as a finite number.
    Value,
    /// A computation produced a non-finite result.
    Arithmetic,
}

impl FormulaError {
    /// The spreadsheet-style error code.
    pub fn code(&self) -> &'static str {
        match self {
            FormulaError::Ref => "#REF!",
            FormulaError::Value => "#VALUE!",
            FormulaError::Arithmetic => "#ARITHM!",
        }
    }
}

impl std::fmt::Display for FormulaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::error::Error for FormulaError {}

/// A cell's externally visible value.
///
/// Empty cells present as empty text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Text(String),
    Number(f64),
    Error(FormulaError),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Error(e) => write!(f, "{}", e),
        }
    }
}

/// Outcome of evaluating a formula; the memoization payload.
///
/// A cached error is as authoritative as a cached number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FormulaValue {
    Number(f64),
    Error(FormulaError),
}

impl From<FormulaValue> for Value {
    fn from(v: FormulaValue) -> Self {
        match v {
            FormulaValue::Number(n) => Value::Number(n),
            FormulaValue::Error(e) => Value::Error(e),
        }
    }
}

/// Read access to cell values, the seam between formulas and the sheet.
pub trait CellLookup {
    /// Current value of the cell at `pos`, or `None` when no cell exists there.
    fn value_at(&self, pos: Position) -> Option<Value>;
}

/// Evaluate an expression tree.
///
/// Every intermediate result is checked for finiteness; division by zero,
/// overflow to an infinity, and NaN all abort with `Arithmetic`. Lookup
/// failures abort with the underlying error.
pub fn evaluate<L: CellLookup>(expr: &Expr, lookup: &L) -> Result<f64, FormulaError> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Ref(pos) => resolve_ref(*pos, lookup),
        Expr::Unary { op, operand } => {
            let v = evaluate(operand, lookup)?;
            let result = match op {
                UnaryOp::Plus => v,
                UnaryOp::Minus => -v,
            };
            require_finite(result)
        }
        Expr::Binary { op, left, right } => {
            let l = evaluate(left, lookup)?;
            let r = evaluate(right, lookup)?;
            let result = match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => l / r,
            };
            require_finite(result)
        }
    }
}

fn require_finite(v: f64) -> Result<f64, FormulaError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(FormulaError::Arithmetic)
    }
}

/// Resolve a single cell reference to a number.
///
/// - invalid position -> `Ref`
/// - no cell -> `0.0`
/// - numeric value -> itself
/// - text value -> parsed as a complete finite number (empty text -> `0.0`,
///   anything else unparsable -> `Value`)
/// - error value -> propagated
fn resolve_ref<L: CellLookup>(pos: Position, lookup: &L) -> Result<f64, FormulaError> {
    if !pos.is_valid() {
        return Err(FormulaError::Ref);
    }
    match lookup.value_at(pos) {
        None => Ok(0.0),
        Some(Value::Number(n)) => Ok(n),
        Some(Value::Text(s)) => number_from_text(&s),
        Some(Value::Error(e)) => Err(e),
    }
}

fn number_from_text(text: &str) -> Result<f64, FormulaError> {
    if text.is_empty() {
        return Ok(0.0);
    }
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or(FormulaError::Value)
}
