//! A top down search driving the property contracts of physical operators.
//!
//! For every node and required property set the driver tries each distribution request of the
//! operator: children are optimized in the operator's child order, each under the requirement
//! computed from the siblings optimized before it. Properties of the node are then derived, the
//! operator decides whether the gap to the requirement may be enforced, and enforcer chains are
//! appended. Results are memoized by node and requirement, and alternatives are ranked by
//! [`PlanRank`].
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use itertools::Itertools;
use log::{debug, info};

use crate::error::{ScatterError, ScatterResult};
use crate::operator::{
    derive_physical_props, required_child_properties, DerivePropContext, EnforcePropContext,
    PhysicalOperatorTrait, PlanContext, RequiredPropContext,
};
use crate::optimizer::{Optimizer, OptimizerContext};
use crate::plan::{Plan, PlanNodeBuilder, PlanNodeId, PlanNodeRef};
use crate::properties::enforcer::enforcer_chains;
use crate::properties::{
    DistributionRequirement, EnforcementDecision, EnforcementDecisions, PhysicalPropertySet,
    RequiredPropertySet, SpecInterner,
};

mod rank;
pub use rank::*;

/// Best alternative found for a node under one requirement.
#[derive(Clone, Debug)]
struct Candidate {
    node: PlanNodeRef,
    rank: PlanRank,
}

impl Candidate {
    fn physical_props(&self) -> ScatterResult<&PhysicalPropertySet> {
        self.node
            .physical_props()
            .ok_or_else(|| anyhow!("Plan node {} has no physical properties", self.node.id()))
    }
}

pub struct SearchDriver {
    context: OptimizerContext,
    required: RequiredPropertySet,
    plan: Plan,
    memo: HashMap<(PlanNodeId, RequiredPropertySet), Option<Candidate>>,
    interner: SpecInterner,
}

impl SearchDriver {
    pub fn new(required: RequiredPropertySet, plan: Plan, context: OptimizerContext) -> Self {
        Self {
            context,
            required,
            plan,
            memo: HashMap::new(),
            interner: SpecInterner::default(),
        }
    }

    fn intern_required(&mut self, required: RequiredPropertySet) -> RequiredPropertySet {
        let spec = self.interner.intern(required.distribution().spec().clone());
        RequiredPropertySet::new(DistributionRequirement::with_matching(
            spec,
            required.distribution().matching(),
        ))
        .with_order(required.order().clone())
        .with_rewindability(required.rewindability())
    }

    fn intern_derived(&mut self, derived: PhysicalPropertySet) -> PhysicalPropertySet {
        let spec = self.interner.intern(derived.distribution().clone());
        PhysicalPropertySet::new(spec)
            .with_order(derived.order().clone())
            .with_rewindability(derived.rewindability())
    }

    fn optimize(
        &mut self,
        node: &PlanNodeRef,
        required: &RequiredPropertySet,
    ) -> ScatterResult<Option<Candidate>> {
        let memo_key = (node.id(), required.clone());
        if let Some(result) = self.memo.get(&memo_key) {
            return Ok(result.clone());
        }

        let config = self.context.config.clone();
        let operator = node.operator();
        let arity = node.inputs().len();
        let request_count = operator.distribution_request_count(&PlanContext {
            node,
            config: &config,
        })?;
        let child_order = operator.child_exec_order().child_indexes(arity);

        let mut tried: Vec<Vec<RequiredPropertySet>> = vec![];
        let mut best: Option<Candidate> = None;

        'requests: for request_index in 0..request_count {
            let mut siblings: Vec<Option<PhysicalPropertySet>> = vec![None; arity];
            let mut children: Vec<Option<PlanNodeRef>> = vec![None; arity];
            let mut child_requirements = Vec::with_capacity(arity);
            let mut rank = PlanRank::default();

            for &child_index in &child_order {
                let child_required = required_child_properties(
                    operator,
                    &RequiredPropContext {
                        plan: PlanContext {
                            node,
                            config: &config,
                        },
                        required,
                        child_index,
                        request_index,
                        siblings: &siblings,
                    },
                )?;
                let child_required = self.intern_required(child_required);
                debug!(
                    "{} request {} requires {} from child {}",
                    operator.as_ref(),
                    request_index,
                    child_required,
                    child_index
                );

                let child = self.optimize(&node.inputs()[child_index], &child_required)?;
                child_requirements.push(child_required);
                match child {
                    Some(child) => {
                        siblings[child_index] = Some(child.physical_props()?.clone());
                        rank += child.rank;
                        children[child_index] = Some(child.node);
                    }
                    None => {
                        info!(
                            "{} request {} dropped, child {} can't deliver {}",
                            operator.as_ref(),
                            request_index,
                            child_index,
                            child_requirements.last().map_or(String::new(), |r| r.to_string())
                        );
                        continue 'requests;
                    }
                }
            }

            if tried.iter().any(|earlier| {
                earlier.len() == child_requirements.len()
                    && earlier
                        .iter()
                        .zip(&child_requirements)
                        .all(|(a, b)| a.matches(b))
            }) {
                debug!(
                    "{} request {} repeats an earlier request",
                    operator.as_ref(),
                    request_index
                );
                continue;
            }
            tried.push(child_requirements);

            let child_props = siblings
                .into_iter()
                .collect::<Option<Vec<PhysicalPropertySet>>>()
                .ok_or_else(|| anyhow!("Children of plan node {} not optimized", node.id()))?;
            let derived = derive_physical_props(
                operator,
                &DerivePropContext {
                    plan: PlanContext {
                        node,
                        config: &config,
                    },
                    children: &child_props,
                },
            )?;
            let derived = self.intern_derived(derived);
            debug!("{} request {} derived {}", operator.as_ref(), request_index, derived);

            let enforce_context = EnforcePropContext {
                children: &child_props,
                derived: &derived,
            };
            let decisions = EnforcementDecisions {
                distribution: operator
                    .distribution_enforcement(&enforce_context, required.distribution()),
                order: operator.order_enforcement(&enforce_context, required.order()),
                rewindability: operator
                    .rewindability_enforcement(&enforce_context, required.rewindability()),
            };
            if decisions.is_prohibited() {
                info!(
                    "{} request {} dropped, enforcing {} is prohibited over {}",
                    operator.as_ref(),
                    request_index,
                    required,
                    derived
                );
                continue;
            }
            if decisions.distribution == EnforcementDecision::Required
                && !required.distribution().spec().is_requirable()
            {
                info!(
                    "{} request {} dropped, {} can't be enforced over {}",
                    operator.as_ref(),
                    request_index,
                    required.distribution(),
                    derived
                );
                continue;
            }

            let inputs = children
                .into_iter()
                .collect::<Option<Vec<PlanNodeRef>>>()
                .ok_or_else(|| anyhow!("Children of plan node {} not optimized", node.id()))?;
            let chains = enforcer_chains(required, &derived, &decisions, &config)?;
            if chains.is_empty() {
                info!(
                    "{} request {} dropped, no enforcer delivers {}",
                    operator.as_ref(),
                    request_index,
                    required
                );
                continue;
            }

            let id = self.context.next_plan_node_id();
            let optimized: PlanNodeRef = Arc::new(
                PlanNodeBuilder::new(id, operator)
                    .add_inputs(inputs)
                    .with_logical_prop(node.logical_prop().cloned())
                    .with_physical_props(Some(derived))
                    .build(),
            );

            for chain in chains {
                let mut top = optimized.clone();
                let mut chain_rank = rank;
                for enforcer in &chain {
                    let id = self.context.next_plan_node_id();
                    top = Arc::new(
                        PlanNodeBuilder::new(id, enforcer.operator())
                            .add_inputs(vec![top])
                            .with_logical_prop(node.logical_prop().cloned())
                            .with_physical_props(Some(enforcer.output_prop().clone()))
                            .build(),
                    );
                    chain_rank += PlanRank::new(usize::from(enforcer.operator().is_motion()), 1);
                }
                if !chain.is_empty() {
                    info!(
                        "Enforced {} on {} with [{}]",
                        required,
                        operator.as_ref(),
                        chain.iter().map(|e| e.operator().as_ref()).join(", ")
                    );
                }

                let candidate = Candidate {
                    node: top,
                    rank: chain_rank,
                };
                if !required.is_satisfied_by(candidate.physical_props()?) {
                    info!(
                        "{} request {} dropped, enforced output doesn't meet {}",
                        operator.as_ref(),
                        request_index,
                        required
                    );
                    continue;
                }
                if best.as_ref().map_or(true, |b| candidate.rank < b.rank) {
                    best = Some(candidate);
                }
            }
        }

        self.memo.insert(memo_key, best.clone());
        Ok(best)
    }
}

impl Optimizer for SearchDriver {
    fn context(&self) -> &OptimizerContext {
        &self.context
    }

    fn find_best_plan(mut self) -> ScatterResult<Plan> {
        let root = self.plan.root();
        let required = self.intern_required(self.required.clone());
        match self.optimize(&root, &required)? {
            Some(best) => Ok(Plan::new(best.node)),
            None => Err(ScatterError::NoViablePlan(required.to_string()).into()),
        }
    }
}
