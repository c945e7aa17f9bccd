use serde::Deserialize;

use crate::error::ScatterResult;
use crate::plan::{Plan, PlanNodeId, PlanNodeIdGen};

/// Switches of the search driver and operator contracts.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// When disabled, singleton requirements on distributed inputs can't be met.
    pub enable_gather: bool,
    /// Offer an order preserving gather when a sorted singleton output is required.
    pub enable_gather_merge: bool,
    /// Let a hash join with a broadcast inner pass a hashed requirement to its outer child.
    pub enable_redistribute_broadcast_hash_join: bool,
    /// Cap on single key redistribute requests of a hash join.
    pub max_hash_join_key_requests: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enable_gather: true,
            enable_gather_merge: true,
            enable_redistribute_broadcast_hash_join: false,
            max_hash_join_key_requests: 6,
        }
    }
}

/// Context for optimization. Includes configuration and plan node id generation.
#[derive(Clone, Debug, Default)]
pub struct OptimizerContext {
    pub config: OptimizerConfig,
    plan_node_gen: PlanNodeIdGen,
}

impl OptimizerContext {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            plan_node_gen: PlanNodeIdGen::default(),
        }
    }

    pub fn next_plan_node_id(&mut self) -> PlanNodeId {
        self.plan_node_gen.gen_next()
    }
}

/// Optimizer interface.
///
/// All information required by optimizer, such as input plan and required properties, are passed
/// in constructor.
pub trait Optimizer {
    fn context(&self) -> &OptimizerContext;

    /// Entry point to drive optimization process.
    fn find_best_plan(self) -> ScatterResult<Plan>;
}
