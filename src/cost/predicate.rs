use crate::expr::{ExprId, Predicate};

/// Selectivity of an equality comparison on an attribute without distinct value statistics.
pub const UNKNOWN_EQUALITY_SELECTIVITY: f64 = 0.1;
/// Selectivity of any other comparison without statistics.
pub const UNKNOWN_COMPARISON_SELECTIVITY: f64 = 0.5;

/// Estimates the fraction of rows satisfying `predicate`.
///
/// `num_distinct_values` looks up the known distinct value count of an attribute, if any.
/// Conjunctions take the most selective operand and disjunctions sum their operands, capped at
/// one.
pub fn estimate_selectivity_for_predicate<F>(predicate: &Predicate, num_distinct_values: &F) -> f64
where
    F: Fn(ExprId) -> Option<usize>,
{
    match predicate {
        Predicate::Comparison { op, .. } => {
            if let Some((op, attr, _)) = predicate.as_attribute_literal_comparison() {
                if let Some(d) = num_distinct_values(attr.id()) {
                    let d = d.max(1) as f64;
                    return if op.is_equality() {
                        1.0 / d
                    } else {
                        1.0 / (d / 100.0).clamp(2.0, 10.0)
                    };
                }
            }
            if op.is_equality() {
                UNKNOWN_EQUALITY_SELECTIVITY
            } else {
                UNKNOWN_COMPARISON_SELECTIVITY
            }
        }
        Predicate::And(operands) => operands
            .iter()
            .map(|p| estimate_selectivity_for_predicate(p, num_distinct_values))
            .fold(1.0, f64::min),
        Predicate::Or(operands) => operands
            .iter()
            .map(|p| estimate_selectivity_for_predicate(p, num_distinct_values))
            .sum::<f64>()
            .min(1.0),
        Predicate::Literal(_) | Predicate::Not(_) => 1.0,
    }
}
