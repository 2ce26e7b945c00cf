//! Tabular rendering of physical plans with their estimates.

use enumset::{enum_set, EnumSet};
use itertools::Itertools;
use prettytable::Table;

use crate::cost::{CostModel, StarSchemaCostModel};
use crate::operator::PhysicalType;
use crate::plan::PlanNodeRef;

/// Statements the cost model has no estimates for.
const STATEMENT_TYPES: EnumSet<PhysicalType> = enum_set!(
    PhysicalType::InsertTuple
        | PhysicalType::InsertSelection
        | PhysicalType::CreateTable
        | PhysicalType::DropTable
        | PhysicalType::DeleteTuples
        | PhysicalType::UpdateTable
        | PhysicalType::CopyFrom
        | PhysicalType::CopyTo
);

/// One row per node of the plan rooted at `root`, in depth first order.
pub fn explain(root: &PlanNodeRef, cost_model: &StarSchemaCostModel) -> Table {
    let mut table = Table::new();
    table.set_titles(row![
        "Operator",
        "Id",
        "Cardinality",
        "Selectivity",
        "Output",
        "Partitioning"
    ]);
    add_rows(&mut table, root, 0, cost_model);
    table
}

fn add_rows(table: &mut Table, node: &PlanNodeRef, depth: usize, cost_model: &StarSchemaCostModel) {
    let (cardinality, selectivity) = if has_estimates(node) {
        (
            cost_model.estimate_cardinality(node).to_string(),
            format!("{:.4}", cost_model.estimate_selectivity(node)),
        )
    } else {
        ("-".to_string(), "-".to_string())
    };
    let partitioning = match node.partition_scheme() {
        Some(header) if node.physical_props().has_repartition() => format!("{} repartitioned", header),
        Some(header) => header.to_string(),
        None => "-".to_string(),
    };
    table.add_row(row![
        format!("{}{}", "  ".repeat(depth), node.name()),
        node.id(),
        cardinality,
        selectivity,
        node.output_attributes().iter().join(", "),
        partitioning
    ]);

    for input in node.inputs() {
        add_rows(table, input, depth + 1, cost_model);
    }
}

fn has_estimates(node: &PlanNodeRef) -> bool {
    match node.physical_type() {
        t if STATEMENT_TYPES.contains(t) => false,
        PhysicalType::TopLevelPlan => has_estimates(node.input(0)),
        _ => true,
    }
}
