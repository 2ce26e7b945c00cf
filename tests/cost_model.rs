mod common;

use std::rc::Rc;

use serde_json::json;

use common::{attr, scan, statistics};
use rust_physical_optimizer::cost::{CostModel, StarSchemaCostModel};
use rust_physical_optimizer::expr::{
    to_named_expressions, AggregateFunction, AggregateKind, Alias, ComparisonOp, ExprId, Literal,
    Predicate, Scalar,
};
use rust_physical_optimizer::operator::JoinType;
use rust_physical_optimizer::plan::{PhysicalPlanBuilder, PlanNodeRef};

fn cost_model(root: &PlanNodeRef, fixture: serde_json::Value) -> StarSchemaCostModel {
    StarSchemaCostModel::for_plan(Rc::new(statistics(fixture)), root)
}

#[test]
fn test_equality_filter_uses_distinct_values() {
    let x = attr(1, "x", "t");
    let root = scan("t", &[x.clone()])
        .filter(Predicate::eq(x, Literal::Int(5)))
        .build()
        .root();
    let model = cost_model(
        &root,
        json!({ "t": { "num_tuples": 1000, "columns": { "x": { "distinct": 10 } } } }),
    );

    assert_eq!(100, model.estimate_cardinality(root.input(0)));
    assert_eq!(1000, model.estimate_cardinality(root.input(0).input(0)));
}

#[test]
fn test_global_aggregate_has_one_row() {
    let v = attr(1, "v", "t");
    let count = Alias::new(
        ExprId::from(2),
        "c",
        "",
        Scalar::Aggregate(AggregateFunction::new(
            AggregateKind::Count,
            vec![v.clone().into()],
            false,
        )),
    );
    for num_tuples in [0u64, 1, 1_000_000_000] {
        let root = scan("t", &[v.clone()])
            .aggregate(vec![], vec![count.clone()], None)
            .build()
            .root();
        let model = cost_model(&root, json!({ "t": { "num_tuples": num_tuples } }));
        assert_eq!(1, model.estimate_cardinality(root.input(0)));
    }
}

#[test]
fn test_selection_never_grows_its_input() {
    let x = attr(1, "x", "t");
    let filters = [
        Predicate::eq(x.clone(), Literal::Int(5)),
        Predicate::comparison(ComparisonOp::Less, x.clone(), Literal::Int(5)),
        Predicate::or(vec![
            Predicate::eq(x.clone(), Literal::Int(1)),
            Predicate::eq(x.clone(), Literal::Int(2)),
            Predicate::eq(x.clone(), Literal::Int(3)),
        ]),
        Predicate::Literal(true),
    ];
    for num_tuples in [1u64, 7, 1000] {
        for filter in &filters {
            let root = scan("t", &[x.clone()])
                .filter(filter.clone())
                .build()
                .root();
            let model = cost_model(
                &root,
                json!({ "t": { "num_tuples": num_tuples, "columns": { "x": { "distinct": 2 } } } }),
            );
            let selection = root.input(0);
            assert!(
                model.estimate_cardinality(selection)
                    <= model.estimate_cardinality(selection.input(0)),
                "{} over {} rows",
                filter,
                num_tuples
            );
        }
    }
}

#[test]
fn test_join_estimate_ignores_side_order() {
    let (fk, v) = (attr(1, "fk", "f"), attr(2, "v", "f"));
    let (pk, c) = (attr(3, "pk", "d"), attr(4, "c", "d"));
    let fact = || scan("f", &[fk.clone(), v.clone()]);
    let dimension = || {
        scan("d", &[pk.clone(), c.clone()])
            .filter(Predicate::eq(c.clone(), Literal::Int(1)))
    };
    let project = to_named_expressions(&[v.clone(), c.clone()]);
    let fixture = json!({
        "f": { "num_tuples": 100000 },
        "d": { "num_tuples": 200, "columns": { "c": { "distinct": 4 } } }
    });

    let fact_probes = fact()
        .hash_join(
            dimension().node(),
            vec![fk.clone()],
            vec![pk.clone()],
            None,
            project.clone(),
            JoinType::Inner,
        )
        .unwrap()
        .build()
        .root();
    let dimension_probes = dimension()
        .hash_join(
            fact().node(),
            vec![pk.clone()],
            vec![fk.clone()],
            None,
            project,
            JoinType::Inner,
        )
        .unwrap()
        .build()
        .root();

    let left = cost_model(&fact_probes, fixture.clone()).estimate_cardinality(fact_probes.input(0));
    let right =
        cost_model(&dimension_probes, fixture).estimate_cardinality(dimension_probes.input(0));
    assert_eq!(left, right);
    assert_eq!(25000, left);
}

#[test]
fn test_unknown_statistics_fall_back_to_catalog_estimate() {
    let x = attr(1, "x", "t");
    let relation = Rc::new(
        rust_physical_optimizer::stat::Relation::new(
            "t",
            vec![("x".to_string(), x.data_type())],
        )
        .with_estimated_num_tuples(42),
    );
    let root = PhysicalPlanBuilder::scan(relation, "t", vec![x]).build().root();
    let model = cost_model(&root, json!({}));
    assert_eq!(42, model.estimate_cardinality(root.input(0)));
}
