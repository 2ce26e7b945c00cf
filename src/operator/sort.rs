use crate::expr::AttributeReference;
use crate::operator::{input_output_attributes, PhysicalOperatorTrait, PhysicalType};
use crate::plan::PlanNodeRef;

/// Sort with an optional limit. Outputs its input's attributes unchanged.
#[derive(Clone, Debug, PartialEq)]
pub struct Sort {
    sort_attributes: Vec<AttributeReference>,
    /// Attributes carried along with the sort keys.
    non_sort_attributes: Vec<AttributeReference>,
    sort_ascending: Vec<bool>,
    nulls_first_flags: Vec<bool>,
    limit: Option<usize>,
}

impl Sort {
    pub fn new(
        sort_attributes: Vec<AttributeReference>,
        non_sort_attributes: Vec<AttributeReference>,
        sort_ascending: Vec<bool>,
        nulls_first_flags: Vec<bool>,
        limit: Option<usize>,
    ) -> Self {
        assert_eq!(sort_attributes.len(), sort_ascending.len());
        assert_eq!(sort_attributes.len(), nulls_first_flags.len());
        Self {
            sort_attributes,
            non_sort_attributes,
            sort_ascending,
            nulls_first_flags,
            limit,
        }
    }

    pub fn with_non_sort_attributes(&self, non_sort_attributes: Vec<AttributeReference>) -> Self {
        Self {
            non_sort_attributes,
            ..self.clone()
        }
    }

    pub fn sort_attributes(&self) -> &[AttributeReference] {
        &self.sort_attributes
    }

    pub fn non_sort_attributes(&self) -> &[AttributeReference] {
        &self.non_sort_attributes
    }

    pub fn sort_ascending(&self) -> &[bool] {
        &self.sort_ascending
    }

    pub fn nulls_first_flags(&self) -> &[bool] {
        &self.nulls_first_flags
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

impl PhysicalOperatorTrait for Sort {
    fn physical_type(&self) -> PhysicalType {
        PhysicalType::Sort
    }

    fn output_attributes(&self, inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        input_output_attributes(inputs)
    }

    fn referenced_attributes(&self, _inputs: &[PlanNodeRef]) -> Vec<AttributeReference> {
        let mut attributes = self.sort_attributes.clone();
        attributes.extend(self.non_sort_attributes.iter().cloned());
        attributes
    }
}
