#![allow(dead_code)]

use std::rc::Rc;

use serde_json::Value;

use rust_physical_optimizer::config::OptimizerConfig;
use rust_physical_optimizer::expr::{AttributeReference, DataType, ExprId, ExprIdGen, Literal};
use rust_physical_optimizer::optimizer::OptimizerContext;
use rust_physical_optimizer::plan::{PhysicalPlanBuilder, PlanNodeRef};
use rust_physical_optimizer::stat::{Relation, RelationRef, Statistics};

/// Every fixture expression id is below this one.
pub const LAST_FIXTURE_EXPR_ID: u64 = 1000;

/// Loads catalog statistics from a fixture of the form
///
/// ```json
/// {
///   "f": { "num_tuples": 1000000 },
///   "d": {
///     "num_tuples": 100,
///     "columns": { "pk": { "distinct": 100, "min": 1, "max": 100, "exact": true } }
///   }
/// }
/// ```
pub fn statistics(fixture: Value) -> Statistics {
    let relations = fixture
        .as_object()
        .expect("statistics fixture must be an object");
    let mut stats = Statistics::new();
    for (relation, entry) in relations {
        if let Some(num_tuples) = entry.get("num_tuples").and_then(Value::as_u64) {
            stats = stats.with_num_tuples(relation, num_tuples as usize);
        }
        let columns = match entry.get("columns").and_then(Value::as_object) {
            Some(columns) => columns,
            None => continue,
        };
        for (column, column_stats) in columns {
            if let Some(distinct) = column_stats.get("distinct").and_then(Value::as_u64) {
                stats = stats.with_num_distinct_values(relation, column, distinct as usize);
            }
            let low = column_stats.get("min").and_then(Value::as_i64);
            let high = column_stats.get("max").and_then(Value::as_i64);
            if let (Some(low), Some(high)) = (low, high) {
                let exact = column_stats
                    .get("exact")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                stats = stats.with_min_max(
                    relation,
                    column,
                    Literal::Long(low),
                    Literal::Long(high),
                    exact,
                );
            }
        }
    }
    stats
}

pub fn optimizer_context(config: OptimizerConfig, fixture: Value) -> OptimizerContext {
    OptimizerContext::new(
        config,
        Rc::new(statistics(fixture)),
        ExprIdGen::starting_after(ExprId::from(LAST_FIXTURE_EXPR_ID)),
    )
}

pub fn context(config: OptimizerConfig, fixture: Value) -> Rc<OptimizerContext> {
    Rc::new(optimizer_context(config, fixture))
}

pub fn attr(id: u64, name: &str, relation: &str) -> AttributeReference {
    AttributeReference::new(ExprId::from(id), name, relation, DataType::Int)
}

pub fn relation(name: &str, attrs: &[AttributeReference]) -> RelationRef {
    Rc::new(Relation::new(
        name,
        attrs
            .iter()
            .map(|a| (a.name().to_string(), a.data_type()))
            .collect(),
    ))
}

pub fn scan(name: &str, attrs: &[AttributeReference]) -> PhysicalPlanBuilder {
    PhysicalPlanBuilder::scan(relation(name, attrs), name, attrs.to_vec())
}

pub fn ids(node: &PlanNodeRef) -> Vec<ExprId> {
    node.output_attributes().iter().map(|a| a.id()).collect()
}

/// Every node of the subtree rooted at `node`, depth first.
pub fn collect_nodes(node: &PlanNodeRef) -> Vec<PlanNodeRef> {
    let mut nodes = vec![node.clone()];
    for input in node.inputs() {
        nodes.extend(collect_nodes(input));
    }
    nodes
}
