mod common;

use serde_json::{json, Value};

use common::{attr, collect_nodes, ids, optimizer_context, scan};
use rust_physical_optimizer::config::{FilterAttachStrategy, OptimizerConfig};
use rust_physical_optimizer::cost::StarSchemaCostModel;
use rust_physical_optimizer::explain::explain;
use rust_physical_optimizer::expr::{to_named_expressions, ComparisonOp, Literal, Predicate};
use rust_physical_optimizer::operator::{JoinType, PhysicalOperator, PhysicalType};
use rust_physical_optimizer::optimizer::PhysicalOptimizer;
use rust_physical_optimizer::plan::{Plan, PlanNodeRef};
use rust_physical_optimizer::properties::LipFilterBuildInfo;

fn fixture() -> Value {
    json!({
        "f": { "num_tuples": 1000000000 },
        "d1": {
            "num_tuples": 1000,
            "columns": {
                "pk1": { "distinct": 1000, "min": 1, "max": 1000, "exact": true },
                "c1": { "distinct": 1000 }
            }
        },
        "d2": {
            "num_tuples": 500,
            "columns": {
                "pk2": { "distinct": 500 },
                "c2": { "distinct": 50 }
            }
        }
    })
}

/// `SELECT m, c2 FROM f, d1, d2 WHERE fk1 = pk1 AND fk2 = pk2 AND c1 < 5 AND c2 = 3`, with the
/// dimensions joined in the order they are written.
fn star_query() -> Plan {
    let (fk1, fk2, m) = (attr(1, "fk1", "f"), attr(2, "fk2", "f"), attr(3, "m", "f"));
    let (pk1, c1) = (attr(4, "pk1", "d1"), attr(5, "c1", "d1"));
    let (pk2, c2) = (attr(6, "pk2", "d2"), attr(7, "c2", "d2"));

    let d1 = scan("d1", &[pk1.clone(), c1.clone()])
        .filter(Predicate::comparison(ComparisonOp::Less, c1, Literal::Int(5)))
        .node();
    let d2 = scan("d2", &[pk2.clone(), c2.clone()])
        .filter(Predicate::eq(c2.clone(), Literal::Int(3)))
        .node();
    scan("f", &[fk1.clone(), fk2.clone(), m.clone()])
        .hash_join(
            d1,
            vec![fk1],
            vec![pk1],
            None,
            to_named_expressions(&[fk2.clone(), m.clone()]),
            JoinType::Inner,
        )
        .unwrap()
        .hash_join(
            d2,
            vec![fk2],
            vec![pk2],
            None,
            to_named_expressions(&[m.clone(), c2.clone()]),
            JoinType::Inner,
        )
        .unwrap()
        .select(to_named_expressions(&[m, c2]), None)
        .build()
}

fn count(root: &PlanNodeRef, physical_type: PhysicalType) -> usize {
    collect_nodes(root)
        .iter()
        .filter(|n| n.physical_type() == physical_type)
        .count()
}

#[test]
fn test_star_query_gets_exact_and_hash_filters() {
    let plan = star_query();
    let output_ids = ids(&plan.root());
    let optimizer = PhysicalOptimizer::new(optimizer_context(OptimizerConfig::default(), fixture()));
    let root = optimizer.optimize(plan).unwrap().root();

    assert_eq!(output_ids, ids(&root));
    // The join with d1 only filters the fact table and has a dense key.
    assert_eq!(1, count(&root, PhysicalType::FilterJoin));
    assert_eq!(1, count(&root, PhysicalType::HashJoin));

    let configuration = root
        .operator()
        .as_top_level_plan()
        .unwrap()
        .lip_filter_configuration()
        .unwrap();
    let nodes = collect_nodes(&root);
    let filter_join = nodes
        .iter()
        .find(|n| n.physical_type() == PhysicalType::FilterJoin)
        .unwrap();
    assert!(matches!(
        configuration.build_info(filter_join.id()),
        [LipFilterBuildInfo::BitVectorExactFilter { min_value: 1, max_value: 1000, .. }]
    ));
    let hash_join = nodes
        .iter()
        .find(|n| n.physical_type() == PhysicalType::HashJoin)
        .unwrap();
    assert!(matches!(
        configuration.build_info(hash_join.id()),
        [LipFilterBuildInfo::SingleIdentityHashFilter { .. }]
    ));

    // Every builder and prober is part of the final plan.
    let node_ids: Vec<_> = nodes.iter().map(|n| n.id()).collect();
    assert!(configuration.builders().all(|n| node_ids.contains(&n.id())));
    assert!(configuration.probers().all(|n| node_ids.contains(&n.id())));
}

#[test]
fn test_bloom_filters_replace_lip_filters() {
    let config = OptimizerConfig {
        use_filter_joins: false,
        filter_attach_strategy: FilterAttachStrategy::BloomFilters,
        ..OptimizerConfig::default()
    };
    let plan = star_query();
    let output_ids = ids(&plan.root());
    let root = PhysicalOptimizer::new(optimizer_context(config, fixture()))
        .optimize(plan)
        .unwrap()
        .root();

    assert_eq!(output_ids, ids(&root));
    assert_eq!(2, count(&root, PhysicalType::HashJoin));
    assert!(root
        .operator()
        .as_top_level_plan()
        .unwrap()
        .lip_filter_configuration()
        .is_none());
    let has_bloom_filters = collect_nodes(&root).iter().any(|n| match n.operator() {
        PhysicalOperator::HashJoin(join) => join.bloom_filter_config().is_some(),
        _ => false,
    });
    assert!(has_bloom_filters);
}

#[test]
fn test_disabled_passes_leave_joins_alone() {
    let config = OptimizerConfig {
        use_star_join_optimization: false,
        reorder_columns: false,
        use_filter_joins: false,
        filter_attach_strategy: FilterAttachStrategy::Disabled,
        enable_partitioning: false,
        ..OptimizerConfig::default()
    };
    let plan = star_query();
    let input = plan.root();
    let root = PhysicalOptimizer::new(optimizer_context(config, fixture()))
        .optimize(plan)
        .unwrap()
        .root();

    assert_eq!(ids(&input), ids(&root));
    assert_eq!(2, count(&root, PhysicalType::HashJoin));
    assert_eq!(0, count(&root, PhysicalType::FilterJoin));
    // Only column pruning ran, dropping the filter columns of the dimension selections.
    let top_join = root.input(0).input(0);
    assert_eq!(ids(input.input(0).input(0)), ids(top_join));
    assert_eq!(1, top_join.input(0).input(1).output_attributes().len());
    assert!(root
        .operator()
        .as_top_level_plan()
        .unwrap()
        .lip_filter_configuration()
        .is_none());
}

#[test]
fn test_explain_lists_every_node() {
    let plan = star_query();
    let root = PhysicalOptimizer::new(optimizer_context(OptimizerConfig::default(), fixture()))
        .optimize(plan)
        .unwrap()
        .root();
    let cost_model = StarSchemaCostModel::for_plan(
        std::rc::Rc::new(common::statistics(fixture())),
        &root,
    );
    let table = explain(&root, &cost_model);
    assert_eq!(collect_nodes(&root).len(), table.len());
    assert_eq!("TopLevelPlan", table.get_row(0).unwrap().get_cell(0).unwrap().get_content());
}
