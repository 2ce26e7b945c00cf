mod common;

use std::rc::Rc;

use serde_json::{json, Value};

use common::{attr, collect_nodes, context, ids, relation, scan};
use rust_physical_optimizer::config::OptimizerConfig;
use rust_physical_optimizer::expr::{to_named_expressions, AttributeReference, ExprId};
use rust_physical_optimizer::operator::{JoinType, PhysicalOperator, PhysicalType};
use rust_physical_optimizer::plan::{PhysicalPlanBuilder, PlanNodeRef};
use rust_physical_optimizer::properties::{LipFilterBuildInfo, PartitionSchemeHeader};
use rust_physical_optimizer::rules::{
    InjectJoinFilters, Partition, PruneColumns, Rule, StarSchemaHashJoinOrderOptimization,
};

fn star_schema_statistics() -> Value {
    json!({
        "f": { "num_tuples": 1000000 },
        "d1": { "num_tuples": 100, "columns": { "pk1": { "distinct": 100 } } },
        "d2": { "num_tuples": 50, "columns": { "pk2": { "distinct": 50 } } },
        "d3": { "num_tuples": 20, "columns": { "pk3": { "distinct": 20 } } }
    })
}

/// `f` joined with the first `num_dimensions` of `d1`, `d2`, `d3`, written with the dimensions
/// on the probe side. Returns the plan root and the projected fact measure.
fn star_join(num_dimensions: usize) -> (PlanNodeRef, AttributeReference) {
    let m = attr(10, "m", "f");
    let foreign_keys: Vec<AttributeReference> = (1..=3)
        .map(|i| attr(i, &format!("fk{}", i), "f"))
        .collect();
    let mut fact_attrs = foreign_keys.clone();
    fact_attrs.push(m.clone());

    let mut plan = scan("f", &fact_attrs).node();
    let mut projected = fact_attrs.clone();
    for i in 0..num_dimensions {
        let pk = attr(20 + i as u64, &format!("pk{}", i + 1), &format!("d{}", i + 1));
        projected.push(pk.clone());
        let project = if i + 1 == num_dimensions {
            to_named_expressions(&[m.clone()])
        } else {
            to_named_expressions(&projected)
        };
        plan = scan(&format!("d{}", i + 1), &[pk.clone()])
            .hash_join(
                plan,
                vec![pk],
                vec![foreign_keys[i].clone()],
                None,
                project,
                JoinType::Inner,
            )
            .unwrap()
            .node();
    }
    (PhysicalPlanBuilder::from_node(plan).build().root(), m)
}

fn join_order(num_dimensions: usize) -> (PlanNodeRef, AttributeReference) {
    let (root, m) = star_join(num_dimensions);
    let rule = StarSchemaHashJoinOrderOptimization::new(context(
        OptimizerConfig::default(),
        star_schema_statistics(),
    ));
    (rule.apply(&root).unwrap(), m)
}

#[test]
fn test_fact_table_is_always_probed() {
    let (output, m) = join_order(2);
    let top = output.input(0);
    assert_eq!(vec![m.id()], ids(top));

    let mut node = top.clone();
    while let PhysicalOperator::HashJoin(_) = node.operator() {
        let build = node.input(1);
        assert_eq!(PhysicalType::TableReference, build.physical_type());
        assert_ne!("TableReference(f)", build.name());
        node = node.input(0).clone();
    }
    assert_eq!("TableReference(f)", node.name());
}

#[test]
fn test_join_order_keeps_every_table() {
    let (output, m) = join_order(3);
    let nodes = collect_nodes(output.input(0));
    let joins = nodes
        .iter()
        .filter(|n| n.physical_type() == PhysicalType::HashJoin)
        .count();
    let mut tables: Vec<String> = nodes
        .iter()
        .filter(|n| n.physical_type() == PhysicalType::TableReference)
        .map(|n| n.name())
        .collect();
    tables.sort();

    assert_eq!(3, joins);
    assert_eq!(
        vec![
            "TableReference(d1)",
            "TableReference(d2)",
            "TableReference(d3)",
            "TableReference(f)"
        ],
        tables
    );
    assert_eq!(vec![m.id()], ids(output.input(0)));
}

/// `SELECT a FROM r JOIN s ON a = k` with the join projecting `a, b, c`.
fn over_projected_join() -> PlanNodeRef {
    let (a, b) = (attr(1, "a", "r"), attr(2, "b", "r"));
    let (k, c) = (attr(3, "k", "s"), attr(4, "c", "s"));
    scan("r", &[a.clone(), b.clone()])
        .hash_join(
            scan("s", &[k.clone(), c.clone()]).node(),
            vec![a.clone()],
            vec![k],
            None,
            to_named_expressions(&[a.clone(), b, c]),
            JoinType::Inner,
        )
        .unwrap()
        .select(to_named_expressions(&[a]), None)
        .build()
        .root()
}

#[test]
fn test_unreferenced_join_outputs_are_pruned() {
    let root = over_projected_join();
    let output = PruneColumns::new().apply(&root).unwrap();

    let selection = output.input(0);
    assert_eq!(vec![ExprId::from(1)], ids(selection));
    let join = selection.input(0);
    assert_eq!(vec![ExprId::from(1)], ids(join));
    let hash_join = join.operator().as_hash_join().unwrap();
    assert_eq!(&[attr(1, "a", "r")], hash_join.left_join_attributes());
    assert_eq!(&[attr(3, "k", "s")], hash_join.right_join_attributes());
}

#[test]
fn test_pruning_is_idempotent() {
    let once = PruneColumns::new().apply(&over_projected_join()).unwrap();
    let twice = PruneColumns::new().apply(&once).unwrap();
    assert!(Rc::ptr_eq(&once, &twice));
}

fn filter_join_fixture() -> Value {
    json!({
        "f": { "num_tuples": 1000000 },
        "d": {
            "num_tuples": 100,
            "columns": { "pk": { "distinct": 100, "min": 1, "max": 100, "exact": true } }
        }
    })
}

/// `f(fk, v)` joined with the key of `d(pk)`, projecting fact columns only.
fn fact_dimension_join() -> PlanNodeRef {
    let (fk, v, pk) = (attr(1, "fk", "f"), attr(2, "v", "f"), attr(3, "pk", "d"));
    scan("f", &[fk.clone(), v.clone()])
        .hash_join(
            scan("d", &[pk.clone()]).node(),
            vec![fk.clone()],
            vec![pk],
            None,
            to_named_expressions(&[v, fk]),
            JoinType::Inner,
        )
        .unwrap()
        .build()
        .root()
}

fn inject(root: &PlanNodeRef, max_filter_join_range: i64) -> PlanNodeRef {
    let config = OptimizerConfig {
        max_filter_join_range,
        ..OptimizerConfig::default()
    };
    InjectJoinFilters::new(context(config, filter_join_fixture()))
        .apply(root)
        .unwrap()
}

#[test]
fn test_filter_join_keeps_join_schema() {
    let root = fact_dimension_join();
    let output = inject(&root, 1_000_000_000);

    let filter_join = collect_nodes(&output)
        .into_iter()
        .find(|n| n.physical_type() == PhysicalType::FilterJoin)
        .unwrap();
    assert_eq!(root.input(0).output_attributes(), filter_join.output_attributes());
    assert_eq!(root.input(0).output_attributes(), output.input(0).output_attributes());
}

#[test]
fn test_filter_join_ranges_respect_limit() {
    for max_filter_join_range in [1_000_000_000, 99, 98] {
        let output = inject(&fact_dimension_join(), max_filter_join_range);
        let filter_joins: Vec<PlanNodeRef> = collect_nodes(&output)
            .into_iter()
            .filter(|n| n.physical_type() == PhysicalType::FilterJoin)
            .collect();
        if max_filter_join_range < 99 {
            assert!(filter_joins.is_empty());
            continue;
        }

        let configuration = output
            .operator()
            .as_top_level_plan()
            .unwrap()
            .lip_filter_configuration()
            .unwrap();
        assert_eq!(1, filter_joins.len());
        for filter_join in filter_joins {
            for info in configuration.build_info(filter_join.id()) {
                match info {
                    LipFilterBuildInfo::BitVectorExactFilter {
                        min_value,
                        max_value,
                        ..
                    } => {
                        let range = max_value - min_value;
                        assert!(0 <= range && range <= max_filter_join_range);
                    }
                    other => panic!("unexpected filter {:?}", other),
                }
            }
        }
    }
}

#[test]
fn test_partitioned_probe_side_is_reused() {
    let (fk, v, pk) = (attr(1, "fk", "f"), attr(2, "v", "f"), attr(3, "pk", "d"));
    let probe = PhysicalPlanBuilder::partitioned_scan(
        relation("f", &[fk.clone(), v.clone()]),
        "f",
        vec![fk.clone(), v.clone()],
        PartitionSchemeHeader::hash(6, [fk.id()]),
    );
    let probe_node = probe.node();
    let build_node = scan("d", &[pk.clone()]).node();
    let root = probe
        .hash_join(
            build_node.clone(),
            vec![fk.clone()],
            vec![pk.clone()],
            None,
            to_named_expressions(&[v, fk]),
            JoinType::Inner,
        )
        .unwrap()
        .build()
        .root();

    let output = Partition::new(context(OptimizerConfig::default(), json!({})))
        .apply(&root)
        .unwrap();
    let join = output.input(0);
    assert!(Rc::ptr_eq(&probe_node, join.input(0)));
    assert_eq!(6, join.partition_scheme().unwrap().num_partitions());

    // The unpartitioned build side is broadcast to every partition.
    assert!(Rc::ptr_eq(&build_node, join.input(1)));
}

fn partition(root: &PlanNodeRef, num_repartitions: usize) -> PlanNodeRef {
    let config = OptimizerConfig {
        num_repartitions,
        ..OptimizerConfig::default()
    };
    Partition::new(context(config, json!({})))
        .apply(root)
        .unwrap()
}

#[test]
fn test_join_above_projected_away_key_is_repartitioned() {
    let (fk1, fk2, v) = (attr(1, "fk1", "f"), attr(2, "fk2", "f"), attr(3, "v", "f"));
    let (pk1, pk2) = (attr(4, "pk1", "d1"), attr(5, "pk2", "d2"));
    let d2 = PhysicalPlanBuilder::partitioned_scan(
        relation("d2", &[pk2.clone()]),
        "d2",
        vec![pk2.clone()],
        PartitionSchemeHeader::hash(4, [pk2.id()]),
    )
    .node();
    let root = PhysicalPlanBuilder::partitioned_scan(
        relation("f", &[fk1.clone(), fk2.clone(), v.clone()]),
        "f",
        vec![fk1.clone(), fk2.clone(), v.clone()],
        PartitionSchemeHeader::hash(4, [fk1.id()]),
    )
    .hash_join(
        scan("d1", &[pk1.clone()]).node(),
        vec![fk1],
        vec![pk1],
        None,
        to_named_expressions(&[fk2.clone(), v.clone()]),
        JoinType::Inner,
    )
    .unwrap()
    .hash_join(
        d2.clone(),
        vec![fk2.clone()],
        vec![pk2],
        None,
        to_named_expressions(&[v]),
        JoinType::Inner,
    )
    .unwrap()
    .build()
    .root();

    let output = partition(&root, 8);
    let top_join = output.input(0);
    let bottom_join = top_join.input(0);
    // The bottom join keeps its input partitioning but no longer outputs its partition key.
    assert_eq!(PhysicalType::HashJoin, bottom_join.physical_type());
    assert!(bottom_join.physical_props().has_repartition());
    assert_eq!(
        Some(&PartitionSchemeHeader::hash(4, [fk2.id()])),
        bottom_join.partition_scheme()
    );
    assert!(Rc::ptr_eq(&d2, top_join.input(1)));
    assert_eq!(4, top_join.partition_scheme().unwrap().num_partitions());
}

#[test]
fn test_multi_key_join_repartitions_single_key_partitioning() {
    let (a, b, v) = (attr(1, "a", "f"), attr(2, "b", "f"), attr(3, "v", "f"));
    let (x, y) = (attr(4, "x", "d"), attr(5, "y", "d"));
    let root = PhysicalPlanBuilder::partitioned_scan(
        relation("f", &[a.clone(), b.clone(), v.clone()]),
        "f",
        vec![a.clone(), b.clone(), v.clone()],
        PartitionSchemeHeader::hash(4, [a.id()]),
    )
    .hash_join(
        scan("d", &[x.clone(), y.clone()]).node(),
        vec![a.clone(), b.clone()],
        vec![x.clone(), y.clone()],
        None,
        to_named_expressions(&[v]),
        JoinType::Inner,
    )
    .unwrap()
    .build()
    .root();

    let join = partition(&root, 6).input(0).clone();
    let (left, right) = (join.input(0), join.input(1));
    assert_eq!(PhysicalType::Selection, left.physical_type());
    assert_eq!(
        Some(&PartitionSchemeHeader::hash(6, [a.id(), b.id()])),
        left.partition_scheme()
    );
    assert_eq!(PhysicalType::Selection, right.physical_type());
    assert_eq!(
        Some(&PartitionSchemeHeader::hash(6, [x.id(), y.id()])),
        right.partition_scheme()
    );
    assert_eq!(6, join.partition_scheme().unwrap().num_partitions());
}

#[test]
fn test_selection_dropping_partition_group_enables_reuse() {
    let (fk, g, v) = (attr(1, "fk", "f"), attr(2, "g", "f"), attr(3, "v", "f"));
    let pk = attr(4, "pk", "d");
    let build = scan("d", &[pk.clone()]).node();
    let root = PhysicalPlanBuilder::partitioned_scan(
        relation("f", &[fk.clone(), g.clone(), v.clone()]),
        "f",
        vec![fk.clone(), g.clone(), v.clone()],
        PartitionSchemeHeader::hash(4, [fk.id(), g.id()]),
    )
    .select(to_named_expressions(&[fk.clone(), v.clone()]), None)
    .hash_join(
        build.clone(),
        vec![fk.clone()],
        vec![pk.clone()],
        None,
        to_named_expressions(&[v]),
        JoinType::Inner,
    )
    .unwrap()
    .build()
    .root();

    let join = partition(&root, 8).input(0).clone();
    let selection = join.input(0);
    assert_eq!(PhysicalType::Selection, selection.physical_type());
    assert_eq!(PhysicalType::TableReference, selection.input(0).physical_type());
    assert_eq!(
        Some(&PartitionSchemeHeader::hash(4, [fk.id()])),
        selection.partition_scheme()
    );
    assert!(Rc::ptr_eq(&build, join.input(1)));
    let header = join.partition_scheme().unwrap();
    assert_eq!(4, header.num_partitions());
    // Both join attributes are projected away.
    assert!(header.partition_expr_ids().is_empty());
}
