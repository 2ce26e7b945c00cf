use std::rc::Rc;

use anyhow::ensure;
use log::{debug, trace};

use crate::config::{FilterAttachStrategy, OptimizerConfig};
use crate::cost::StarSchemaCostModel;
use crate::error::{OptError, OptResult};
use crate::expr::ExprIdGen;
use crate::explain::explain;
use crate::operator::PhysicalType;
use crate::plan::{Plan, PlanNodeRef};
use crate::rules::{
    AttachBloomFilters, AttachLipFilters, FuseAggregateJoin, InjectJoinFilters, Partition,
    PruneColumns, PushDownLowCostDisjunctivePredicate, ReduceGroupByAttributes, ReorderColumns,
    ReuseAggregateExpressions, Rule, RuleImpl, StarSchemaHashJoinOrderOptimization,
};
use crate::stat::StatisticsProvider;

/// State shared by every pass of one optimization run.
pub struct OptimizerContext {
    config: OptimizerConfig,
    stats: Rc<dyn StatisticsProvider>,
    expr_id_gen: ExprIdGen,
}

impl OptimizerContext {
    /// `expr_id_gen` must start after every expression id used by the plans to optimize.
    pub fn new(
        config: OptimizerConfig,
        stats: Rc<dyn StatisticsProvider>,
        expr_id_gen: ExprIdGen,
    ) -> Self {
        Self {
            config,
            stats,
            expr_id_gen,
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn stats(&self) -> &Rc<dyn StatisticsProvider> {
        &self.stats
    }

    pub fn expr_id_gen(&self) -> &ExprIdGen {
        &self.expr_id_gen
    }

    /// A fresh memoized cost model for the plan rooted at `top_level_plan`.
    pub fn cost_model(&self, top_level_plan: &PlanNodeRef) -> StarSchemaCostModel {
        StarSchemaCostModel::for_plan(self.stats.clone(), top_level_plan).memoized()
    }
}

/// Runs the physical rewrite passes over a plan.
pub struct PhysicalOptimizer {
    context: Rc<OptimizerContext>,
}

impl PhysicalOptimizer {
    pub fn new(context: OptimizerContext) -> Self {
        Self {
            context: Rc::new(context),
        }
    }

    pub fn context(&self) -> &OptimizerContext {
        &self.context
    }

    /// The passes run by [`optimize`](Self::optimize), in order.
    pub fn rules(&self) -> Vec<RuleImpl> {
        let config = self.context.config();
        let context = &self.context;

        let mut rules: Vec<RuleImpl> = vec![
            PushDownLowCostDisjunctivePredicate::new(context.clone()).into(),
            ReduceGroupByAttributes::new(context.clone()).into(),
        ];
        if config.reuse_aggregate_expressions {
            rules.push(ReuseAggregateExpressions::new(context.clone()).into());
        }
        if config.use_star_join_optimization {
            rules.push(StarSchemaHashJoinOrderOptimization::new(context.clone()).into());
        }
        if config.reorder_columns {
            rules.push(ReorderColumns::new().into());
        }
        if config.fuse_aggregate_join {
            rules.push(FuseAggregateJoin::new(context.clone()).into());
        }
        rules.push(PruneColumns::new().into());
        if config.enable_partitioning {
            rules.push(Partition::new(context.clone()).into());
        }
        if config.use_filter_joins {
            rules.push(InjectJoinFilters::new(context.clone()).into());
        }
        match config.filter_attach_strategy {
            FilterAttachStrategy::Disabled => {}
            FilterAttachStrategy::LipFilters => {
                rules.push(AttachLipFilters::new(context.clone()).into())
            }
            FilterAttachStrategy::BloomFilters => {
                rules.push(AttachBloomFilters::new(context.clone()).into())
            }
        }
        rules
    }

    pub fn optimize(&self, plan: Plan) -> OptResult<Plan> {
        self.context.config().validate()?;
        let root = plan.root();
        ensure!(
            root.physical_type() == PhysicalType::TopLevelPlan,
            OptError::InvalidPlan(format!(
                "expected a TopLevelPlan root, got {}",
                root.name()
            ))
        );

        let mut root = root;
        for rule in self.rules() {
            let new_root = rule.apply(&root)?;
            debug!(
                "Applied {}, plan changed: {}",
                rule.name(),
                !Rc::ptr_eq(&new_root, &root)
            );
            root = new_root;
        }

        if log::log_enabled!(log::Level::Trace) {
            let cost_model = self.context.cost_model(&root);
            trace!("Optimized plan:\n{}", explain(&root, &cost_model));
        }
        Ok(Plan::new(root))
    }
}
