//! Reference extraction from formula AST.
//!
//! Walks an expression tree and lists the positions it mentions, in source
//! order, for dependency-graph construction and reference reporting.

use rustc_hash::FxHashSet;

use crate::position::Position;

use super::parser::Expr;

/// All positions appearing in the expression, in source order.
///
/// Duplicates and out-of-bounds positions are kept; callers that build
/// graph edges filter through [`unique_valid_positions`].
pub fn referenced_positions(expr: &Expr) -> Vec<Position> {
    let mut refs = Vec::new();
    collect_refs(expr, &mut refs);
    refs
}

/// Valid positions only, de-duplicated, first occurrence wins.
pub fn unique_valid_positions(expr: &Expr) -> Vec<Position> {
    let mut seen = FxHashSet::default();
    referenced_positions(expr)
        .into_iter()
        .filter(|p| p.is_valid() && seen.insert(*p))
        .collect()
}

fn collect_refs(expr: &Expr, refs: &mut Vec<Position>) {
    match expr {
        Expr::Number(_) => {}
        Expr::Ref(pos) => refs.push(*pos),
        Expr::Unary { operand, .. } => collect_refs(operand, refs),
        Expr::Binary { left, right, .. } => {
            collect_refs(left, refs);
            collect_refs(right, refs);
        }
    }
}
