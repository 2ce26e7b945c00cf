//! Data modification operators. None of them produce output attributes.

use crate::expr::{AttributeReference, Literal, Predicate, Scalar};
use crate::operator::{input_output_attributes, PhysicalOperatorTrait, PhysicalType};
use crate::plan::PlanNodeRef;
use crate::stat::RelationRef;

#[derive(Clone, Debug, PartialEq)]
pub struct InsertTuple {
    relation: RelationRef,
    column_values: Vec<Literal>,
}

impl InsertTuple {
    pub fn new(relation: RelationRef, column_values: Vec<Literal>) -> Self {
        Self {
            relation,
            column_values,
        }
    }

    pub fn relation(&self) -> &RelationRef {
        &self.relation
    }

    pub fn column_values(&self) -> &[Literal] {
        &self.column_values
    }
}

impl PhysicalOperatorTrait for InsertTuple {
    fn physical_type(&self) -> PhysicalType {
        PhysicalType::InsertTuple
    }

    fn output_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        vec![]
    }

    fn referenced_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        vec![]
    }
}

/// Inserts the rows of its single input.
#[derive(Clone, Debug, PartialEq)]
pub struct InsertSelection {
    relation: RelationRef,
}

impl InsertSelection {
    pub fn new(relation: RelationRef) -> Self {
        Self { relation }
    }

    pub fn relation(&self) -> &RelationRef {
        &self.relation
    }
}

impl PhysicalOperatorTrait for InsertSelection {
    fn physical_type(&self) -> PhysicalType {
        PhysicalType::InsertSelection
    }

    fn output_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        vec![]
    }

    fn referenced_attributes(&self, inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        input_output_attributes(inputs)
    }
}

/// Deletes the rows of its input table matching `predicate`.
#[derive(Clone, Debug, PartialEq)]
pub struct DeleteTuples {
    relation: RelationRef,
    predicate: Option<Predicate>,
}

impl DeleteTuples {
    pub fn new(relation: RelationRef, predicate: Option<Predicate>) -> Self {
        Self {
            relation,
            predicate,
        }
    }

    pub fn relation(&self) -> &RelationRef {
        &self.relation
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }
}

impl PhysicalOperatorTrait for DeleteTuples {
    fn physical_type(&self) -> PhysicalType {
        PhysicalType::DeleteTuples
    }

    fn output_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        vec![]
    }

    fn referenced_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        self.predicate
            .as_ref()
            .map(Predicate::referenced_attributes)
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateTable {
    relation: RelationRef,
    assignees: Vec<AttributeReference>,
    assignment_expressions: Vec<Scalar>,
    predicate: Option<Predicate>,
}

impl UpdateTable {
    pub fn new(
        relation: RelationRef,
        assignees: Vec<AttributeReference>,
        assignment_expressions: Vec<Scalar>,
        predicate: Option<Predicate>,
    ) -> Self {
        assert_eq!(assignees.len(), assignment_expressions.len());
        Self {
            relation,
            assignees,
            assignment_expressions,
            predicate,
        }
    }

    pub fn relation(&self) -> &RelationRef {
        &self.relation
    }

    pub fn assignees(&self) -> &[AttributeReference] {
        &self.assignees
    }

    pub fn assignment_expressions(&self) -> &[Scalar] {
        &self.assignment_expressions
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }
}

impl PhysicalOperatorTrait for UpdateTable {
    fn physical_type(&self) -> PhysicalType {
        PhysicalType::UpdateTable
    }

    fn output_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        vec![]
    }

    fn referenced_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        let mut attributes = self.assignees.clone();
        for expr in &self.assignment_expressions {
            attributes.extend(expr.referenced_attributes());
        }
        if let Some(predicate) = &self.predicate {
            attributes.extend(predicate.referenced_attributes());
        }
        attributes
    }
}

/// Bulk load from a file.
#[derive(Clone, Debug, PartialEq)]
pub struct CopyFrom {
    relation: RelationRef,
    file_name: String,
}

impl CopyFrom {
    pub fn new<S: Into<String>>(relation: RelationRef, file_name: S) -> Self {
        Self {
            relation,
            file_name: file_name.into(),
        }
    }

    pub fn relation(&self) -> &RelationRef {
        &self.relation
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl PhysicalOperatorTrait for CopyFrom {
    fn physical_type(&self) -> PhysicalType {
        PhysicalType::CopyFrom
    }

    fn output_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        vec![]
    }

    fn referenced_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        vec![]
    }
}

/// Writes the rows of its single input to a file.
#[derive(Clone, Debug, PartialEq)]
pub struct CopyTo {
    file_name: String,
}

impl CopyTo {
    pub fn new<S: Into<String>>(file_name: S) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl PhysicalOperatorTrait for CopyTo {
    fn physical_type(&self) -> PhysicalType {
        PhysicalType::CopyTo
    }

    fn output_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        vec![]
    }

    fn referenced_attributes(&self, inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        input_output_attributes(inputs)
    }
}
