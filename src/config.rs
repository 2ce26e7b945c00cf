use std::str::FromStr;

use anyhow::{anyhow, ensure};
use strum_macros::{Display as StrumDisplay, EnumString};

use crate::error::{OptError, OptResult};

/// How the optimizer attaches semi-join filters to large probe inputs after the FilterJoin
/// injection pass.
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumString, StrumDisplay)]
#[strum(serialize_all = "snake_case")]
pub enum FilterAttachStrategy {
    Disabled,
    /// Per-node bloom filter configs on HashJoin/Aggregate/Selection nodes.
    BloomFilters,
    /// Plan-wide identity hash filters recorded in the top level plan.
    LipFilters,
}

/// Knobs read once per optimization run.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizerConfig {
    /// Largest `max - min` range of a build side join attribute for which a HashJoin may be
    /// replaced by a bit vector FilterJoin. One bit per value, so 1G values cost 128MB.
    pub max_filter_join_range: i64,
    /// Number of partitions used when both sides of a join have to be repartitioned.
    pub num_repartitions: usize,
    /// Probe inputs must be estimated larger than this before filters get attached to them.
    pub lip_filter_cardinality_threshold: usize,
    /// Stored relations no larger than this are pre-filtered with pushed down disjunctions.
    pub disjunctive_predicate_cardinality_threshold: usize,
    /// A stored relation contributing more group-by attributes than this is hoisted above the
    /// aggregation when it has a key attribute.
    pub reduce_group_by_attributes_threshold: usize,
    /// Aggregates with fewer estimated groups than this always get duplicate aggregate
    /// functions merged.
    pub reuse_aggregate_group_size_threshold: usize,
    /// Otherwise the merge needs more than this share of the aggregate functions to go away.
    pub reuse_aggregate_ratio_threshold: f64,
    /// Upper bound (exclusive) on the largest grouping key of an aggregation indexed directly
    /// by its key.
    pub collision_free_vector_table_max_size: usize,
    pub use_star_join_optimization: bool,
    pub reorder_columns: bool,
    pub use_filter_joins: bool,
    pub filter_attach_strategy: FilterAttachStrategy,
    pub enable_partitioning: bool,
    pub reuse_aggregate_expressions: bool,
    pub fuse_aggregate_join: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_filter_join_range: 1_000_000_000,
            num_repartitions: 4,
            lip_filter_cardinality_threshold: 10_000_000,
            disjunctive_predicate_cardinality_threshold: 100,
            reduce_group_by_attributes_threshold: 3,
            reuse_aggregate_group_size_threshold: 1000,
            reuse_aggregate_ratio_threshold: 0.3,
            collision_free_vector_table_max_size: 1_000_000_000,
            use_star_join_optimization: true,
            reorder_columns: true,
            use_filter_joins: true,
            filter_attach_strategy: FilterAttachStrategy::LipFilters,
            enable_partitioning: true,
            reuse_aggregate_expressions: true,
            fuse_aggregate_join: true,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> OptResult<()> {
        ensure!(
            self.num_repartitions > 1,
            OptError::InvalidConfig(format!(
                "num_repartitions must be greater than 1, got {}",
                self.num_repartitions
            ))
        );
        ensure!(
            self.max_filter_join_range > 0,
            OptError::InvalidConfig(format!(
                "max_filter_join_range must be positive, got {}",
                self.max_filter_join_range
            ))
        );
        ensure!(
            (0.0..=1.0).contains(&self.reuse_aggregate_ratio_threshold),
            OptError::InvalidConfig(format!(
                "reuse_aggregate_ratio_threshold must be within [0, 1], got {}",
                self.reuse_aggregate_ratio_threshold
            ))
        );
        Ok(())
    }

    /// Sets the knob called `name` from its textual form, as given on a command line or in a
    /// session `SET` statement.
    pub fn set(&mut self, name: &str, value: &str) -> OptResult<()> {
        match name {
            "max_filter_join_range" => self.max_filter_join_range = parse(name, value)?,
            "num_repartitions" => self.num_repartitions = parse(name, value)?,
            "lip_filter_cardinality_threshold" => {
                self.lip_filter_cardinality_threshold = parse(name, value)?
            }
            "disjunctive_predicate_cardinality_threshold" => {
                self.disjunctive_predicate_cardinality_threshold = parse(name, value)?
            }
            "reduce_group_by_attributes_threshold" => {
                self.reduce_group_by_attributes_threshold = parse(name, value)?
            }
            "reuse_aggregate_group_size_threshold" => {
                self.reuse_aggregate_group_size_threshold = parse(name, value)?
            }
            "reuse_aggregate_ratio_threshold" => {
                self.reuse_aggregate_ratio_threshold = parse(name, value)?
            }
            "collision_free_vector_table_max_size" => {
                self.collision_free_vector_table_max_size = parse(name, value)?
            }
            "use_star_join_optimization" => self.use_star_join_optimization = parse(name, value)?,
            "reorder_columns" => self.reorder_columns = parse(name, value)?,
            "use_filter_joins" => self.use_filter_joins = parse(name, value)?,
            "filter_attach_strategy" => self.filter_attach_strategy = parse(name, value)?,
            "enable_partitioning" => self.enable_partitioning = parse(name, value)?,
            "reuse_aggregate_expressions" => self.reuse_aggregate_expressions = parse(name, value)?,
            "fuse_aggregate_join" => self.fuse_aggregate_join = parse(name, value)?,
            _ => {
                return Err(anyhow!(OptError::InvalidConfig(format!(
                    "unknown optimizer knob {}",
                    name
                ))))
            }
        }
        Ok(())
    }
}

fn parse<T>(name: &str, value: &str) -> OptResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| {
        anyhow!(OptError::InvalidConfig(format!(
            "bad value {:?} for {}: {}",
            value, name, e
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(OptimizerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_single_repartition_rejected() {
        let config = OptimizerConfig {
            num_repartitions: 1,
            ..OptimizerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OptError>(),
            Some(OptError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_set_knobs_from_text() {
        let mut config = OptimizerConfig::default();
        config.set("filter_attach_strategy", "bloom_filters").unwrap();
        config.set("num_repartitions", " 16 ").unwrap();
        config.set("fuse_aggregate_join", "false").unwrap();
        config.set("reuse_aggregate_ratio_threshold", "0.5").unwrap();

        assert_eq!(FilterAttachStrategy::BloomFilters, config.filter_attach_strategy);
        assert_eq!(16, config.num_repartitions);
        assert!(!config.fuse_aggregate_join);
        assert_eq!(0.5, config.reuse_aggregate_ratio_threshold);
        assert_eq!("lip_filters", FilterAttachStrategy::LipFilters.to_string());
    }

    #[test]
    fn test_bad_knobs_are_rejected() {
        let mut config = OptimizerConfig::default();
        for (name, value) in [
            ("filter_attach_strategy", "bloom"),
            ("num_repartitions", "-1"),
            ("no_such_knob", "1"),
        ] {
            let err = config.set(name, value).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<OptError>(),
                Some(OptError::InvalidConfig(_))
            ));
        }
        assert_eq!(OptimizerConfig::default(), config);

        config.reuse_aggregate_ratio_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
