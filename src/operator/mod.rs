//! Physical operators.
//!
//! An operator only holds its own expressions. Children live in the owning
//! [`PlanNode`](crate::plan::PlanNode), so attributes depending on inputs are computed from the
//! inputs passed in.

use enum_as_inner::EnumAsInner;
use enum_dispatch::enum_dispatch;
use enumset::EnumSetType;
use strum_macros::Display as StrumDisplay;

use crate::expr::AttributeReference;
use crate::plan::PlanNodeRef;

mod aggregate;
pub use aggregate::*;
mod ddl;
pub use ddl::*;
mod dml;
pub use dml::*;
mod join;
pub use join::*;
mod sample;
pub use sample::*;
mod selection;
pub use selection::*;
mod shared_subplan_reference;
pub use shared_subplan_reference::*;
mod sort;
pub use sort::*;
mod table_generator;
pub use table_generator::*;
mod table_reference;
pub use table_reference::*;
mod top_level_plan;
pub use top_level_plan::*;
mod union_all;
pub use union_all::*;
mod window_aggregate;
pub use window_aggregate::*;

/// Tag of an operator kind.
#[derive(EnumSetType, Debug, Hash, StrumDisplay)]
pub enum PhysicalType {
    TopLevelPlan,
    TableReference,
    Selection,
    HashJoin,
    FilterJoin,
    NestedLoopsJoin,
    Aggregate,
    CrossReferenceCoalesceAggregate,
    Sort,
    Sample,
    TableGenerator,
    UnionAll,
    InsertTuple,
    InsertSelection,
    CreateTable,
    DropTable,
    DeleteTuples,
    UpdateTable,
    CopyFrom,
    CopyTo,
    SharedSubplanReference,
    WindowAggregate,
}

#[enum_dispatch]
pub trait PhysicalOperatorTrait {
    fn physical_type(&self) -> PhysicalType;

    /// Display name, e.g. including the join type.
    fn name(&self) -> String {
        self.physical_type().to_string()
    }

    /// Columns produced by the operator, given its inputs.
    fn output_attributes(&self, inputs: &[PlanNodeRef]) -> Vec<AttributeReference>;

    /// Columns the operator consumes from its inputs.
    fn referenced_attributes(&self, inputs: &[PlanNodeRef]) -> Vec<AttributeReference>;
}

/// Physical relational operator.
#[enum_dispatch(PhysicalOperatorTrait)]
#[derive(Clone, Debug, PartialEq, EnumAsInner)]
pub enum PhysicalOperator {
    TopLevelPlan(TopLevelPlan),
    TableReference(TableReference),
    Selection(Selection),
    HashJoin(HashJoin),
    FilterJoin(FilterJoin),
    NestedLoopsJoin(NestedLoopsJoin),
    Aggregate(Aggregate),
    CrossReferenceCoalesceAggregate(CrossReferenceCoalesceAggregate),
    Sort(Sort),
    Sample(Sample),
    TableGenerator(TableGenerator),
    UnionAll(UnionAll),
    InsertTuple(InsertTuple),
    InsertSelection(InsertSelection),
    CreateTable(CreateTable),
    DropTable(DropTable),
    DeleteTuples(DeleteTuples),
    UpdateTable(UpdateTable),
    CopyFrom(CopyFrom),
    CopyTo(CopyTo),
    SharedSubplanReference(SharedSubplanReference),
    WindowAggregate(WindowAggregate),
}

pub(crate) fn input_output_attributes(inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
    inputs
        .first()
        .map(|input| input.output_attributes())
        .unwrap_or_default()
}
