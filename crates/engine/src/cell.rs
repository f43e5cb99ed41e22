//! Cell bodies and memoized evaluation.

use std::cell::RefCell;

use crate::error::EngineError;
use crate::formula::{CellLookup, Formula, FormulaValue, Value};
use crate::position::Position;

/// First character of a formula cell's raw text.
pub const FORMULA_MARKER: char = '=';
/// Leading character that escapes text which would otherwise look special.
pub const ESCAPE_CHAR: char = '\'';

/// Content of a cell. A closed set: each edit installs exactly one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum CellBody {
    Empty,
    /// Non-empty raw text. A leading `'` is kept in the text form and
    /// stripped from the value form.
    Text(String),
    Formula(Formula),
}

impl Default for CellBody {
    fn default() -> Self {
        CellBody::Empty
    }
}

impl CellBody {
    /// Classify raw input.
    ///
    /// - empty -> `Empty`
    /// - `=` followed by at least one character -> `Formula` (may fail to parse)
    /// - anything else, including a lone `=` -> `Text`
    pub fn from_input(input: &str) -> Result<CellBody, EngineError> {
        if input.is_empty() {
            Ok(CellBody::Empty)
        } else if input.len() >= 2 && input.starts_with(FORMULA_MARKER) {
            Ok(CellBody::Formula(Formula::parse(&input[1..])?))
        } else {
            Ok(CellBody::Text(input.to_string()))
        }
    }
}

/// A cell: one body plus the memoized result of its last evaluation.
///
/// The cache lives behind a `RefCell` because it fills lazily while the
/// sheet is only shared (`&Sheet`) during evaluation. Presence of a cached
/// value means it is authoritative; invalidation is the sheet's job.
#[derive(Debug, Default)]
pub struct Cell {
    body: CellBody,
    cache: RefCell<Option<FormulaValue>>,
}

impl Cell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(&self) -> &CellBody {
        &self.body
    }

    /// Replace the body. The caller is responsible for running cache
    /// invalidation afterwards; this only swaps the content.
    pub(crate) fn install_body(&mut self, body: CellBody) {
        self.body = body;
    }

    /// True when the body is `Empty`. Such a cell prints as nothing and is
    /// droppable once nothing references it.
    pub fn is_empty(&self) -> bool {
        matches!(self.body, CellBody::Empty)
    }

    /// Raw text form: `""` for empty, verbatim text (escape kept), or the
    /// `=`-prefixed canonical expression.
    pub fn text(&self) -> String {
        match &self.body {
            CellBody::Empty => String::new(),
            CellBody::Text(s) => s.clone(),
            CellBody::Formula(formula) => format!("{}{}", FORMULA_MARKER, formula.expression()),
        }
    }

    /// Value form. Formula results are memoized; text strips a leading
    /// escape character; empty cells present as empty text.
    pub fn value<L: CellLookup>(&self, lookup: &L) -> Value {
        match &self.body {
            CellBody::Empty => Value::Text(String::new()),
            CellBody::Text(s) => {
                Value::Text(s.strip_prefix(ESCAPE_CHAR).unwrap_or(s).to_string())
            }
            CellBody::Formula(formula) => {
                if let Some(cached) = *self.cache.borrow() {
                    return cached.into();
                }
                let computed = formula.evaluate(lookup);
                *self.cache.borrow_mut() = Some(computed);
                computed.into()
            }
        }
    }

    /// The valid positions this cell's formula reads; empty for other bodies.
    pub fn referenced_cells(&self) -> Vec<Position> {
        match &self.body {
            CellBody::Formula(formula) => formula.referenced_cells(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn has_cached_value(&self) -> bool {
        self.cache.borrow().is_some()
    }

    pub(crate) fn invalidate_cache(&self) {
        self.cache.borrow_mut().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::FormulaError;

    /// Lookup over no cells at all.
    struct NoCells;

    impl CellLookup for NoCells {
        fn value_at(&self, _pos: Position) -> Option<Value> {
            None
        }
    }

    #[test]
    fn test_classify_empty() {
        assert_eq!(CellBody::from_input("").unwrap(), CellBody::Empty);
    }

    #[test]
    fn test_classify_text() {
        assert_eq!(
            CellBody::from_input("hello").unwrap(),
            CellBody::Text("hello".to_string())
        );
        // A lone '=' is text, not a formula
        assert_eq!(
            CellBody::from_input("=").unwrap(),
            CellBody::Text("=".to_string())
        );
        // Numbers are stored as text; coercion happens at evaluation
        assert_eq!(
            CellBody::from_input("42").unwrap(),
            CellBody::Text("42".to_string())
        );
    }

    #[test]
    fn test_classify_formula() {
        match CellBody::from_input("=1+2").unwrap() {
            CellBody::Formula(f) => assert_eq!(f.expression(), "1+2"),
            other => panic!("expected formula, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_bad_formula() {
        assert!(CellBody::from_input("=1+").is_err());
    }

    #[test]
    fn test_text_and_value_forms() {
        let mut cell = Cell::new();
        assert_eq!(cell.text(), "");
        assert_eq!(cell.value(&NoCells), Value::Text(String::new()));

        cell.install_body(CellBody::from_input("plain").unwrap());
        assert_eq!(cell.text(), "plain");
        assert_eq!(cell.value(&NoCells), Value::Text("plain".to_string()));
    }

    #[test]
    fn test_escape_stripped_from_value_only() {
        let mut cell = Cell::new();
        cell.install_body(CellBody::from_input("'=text").unwrap());
        assert_eq!(cell.text(), "'=text");
        assert_eq!(cell.value(&NoCells), Value::Text("=text".to_string()));
        assert!(cell.referenced_cells().is_empty());
    }

    #[test]
    fn test_formula_text_is_canonical() {
        let mut cell = Cell::new();
        cell.install_body(CellBody::from_input("= 1 + (2+3)").unwrap());
        assert_eq!(cell.text(), "=1+2+3");
    }

    #[test]
    fn test_formula_value_is_cached() {
        let mut cell = Cell::new();
        cell.install_body(CellBody::from_input("=2*3").unwrap());

        assert!(!cell.has_cached_value());
        assert_eq!(cell.value(&NoCells), Value::Number(6.0));
        assert!(cell.has_cached_value());

        cell.invalidate_cache();
        assert!(!cell.has_cached_value());
        assert_eq!(cell.value(&NoCells), Value::Number(6.0));
    }

    #[test]
    fn test_error_result_is_cached_too() {
        let mut cell = Cell::new();
        cell.install_body(CellBody::from_input("=1/0").unwrap());

        assert_eq!(cell.value(&NoCells), Value::Error(FormulaError::Arithmetic));
        assert!(cell.has_cached_value());
    }

    #[test]
    fn test_referenced_cells_from_formula() {
        let mut cell = Cell::new();
        cell.install_body(CellBody::from_input("=B1+A1+B1").unwrap());
        assert_eq!(
            cell.referenced_cells(),
            vec![Position::parse("B1"), Position::parse("A1")]
        );
    }
}
