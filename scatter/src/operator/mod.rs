//! Physical operators and their property contracts.
//!
//! Every operator answers three questions for the search driver:
//!
//! * how many alternative optimization requests it offers, and what each request requires from
//!   every child ([`PhysicalOperatorTrait::required_distribution`] and friends),
//! * what it delivers given the properties its children delivered
//!   ([`PhysicalOperatorTrait::derive_distribution`] and friends),
//! * whether a property missing on its output may be enforced on top of it
//!   ([`PhysicalOperatorTrait::distribution_enforcement`] and friends).
//!
//! Operators form a closed set in [`PhysicalOperator`], dispatched with `enum_dispatch`.
use std::fmt::{Debug, Display, Formatter};

use anyhow::anyhow;
use enum_as_inner::EnumAsInner;
use enum_dispatch::enum_dispatch;
use itertools::Itertools;
use strum_macros::AsRefStr;

use crate::error::{InvariantViolation, ScatterResult};
use crate::optimizer::OptimizerConfig;
use crate::plan::{PlanNode, PlanNodeRef};
use crate::properties::{
    DistributionRequirement, DistributionSpecRef, EnforcementDecision, LogicalProperty,
    OrderSpec, PhysicalProp, PhysicalPropertySet, RequiredPropertySet, Rewindability,
};

mod join;
pub use join::*;
mod table_scan;
pub use table_scan::*;
mod index_scan;
pub use index_scan::*;
mod hash_join;
pub use hash_join::*;
mod nested_loop_join;
pub use nested_loop_join::*;
mod aggregate;
pub use aggregate::*;
mod projection;
pub use projection::*;
mod split;
pub use split::*;
mod motion;
pub use motion::*;
mod sort;
pub use sort::*;
mod spool;
pub use spool::*;

/// Physical relational operator.
#[derive(Clone, Debug, PartialEq, EnumAsInner, AsRefStr)]
#[enum_dispatch]
pub enum PhysicalOperator {
    PhysicalTableScan(TableScan),
    PhysicalIndexScan(IndexScan),
    PhysicalHashJoin(HashJoin),
    PhysicalNestedLoopJoin(NestedLoopJoin),
    PhysicalAggregate(Aggregate),
    PhysicalProjection(Projection),
    PhysicalSplit(Split),
    PhysicalGather(Gather),
    PhysicalGatherMerge(GatherMerge),
    PhysicalBroadcast(Broadcast),
    PhysicalRedistribute(Redistribute),
    PhysicalSort(Sort),
    PhysicalSpool(Spool),
}

impl PhysicalOperator {
    /// Whether this operator moves rows between segments.
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            PhysicalOperator::PhysicalGather(_)
                | PhysicalOperator::PhysicalGatherMerge(_)
                | PhysicalOperator::PhysicalBroadcast(_)
                | PhysicalOperator::PhysicalRedistribute(_)
        )
    }
}

impl Display for PhysicalOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())?;
        self.display(f)
    }
}

#[enum_dispatch(PhysicalOperator)]
pub trait OperatorTrait {
    /// Derives logical property from inputs, which already carry theirs.
    fn derive_logical_prop(&self, inputs: &[PlanNodeRef]) -> ScatterResult<LogicalProperty>;
}

#[enum_dispatch(PhysicalOperator)]
pub trait DisplayFields {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result;
}

/// Order in which children are optimized.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChildExecOrder {
    LeftToRight,
    RightToLeft,
}

impl ChildExecOrder {
    pub fn child_indexes(self, arity: usize) -> Vec<usize> {
        match self {
            ChildExecOrder::LeftToRight => (0..arity).collect(),
            ChildExecOrder::RightToLeft => (0..arity).rev().collect(),
        }
    }
}

/// A plan node under optimization.
pub struct PlanContext<'a> {
    pub node: &'a PlanNode,
    pub config: &'a OptimizerConfig,
}

impl<'a> PlanContext<'a> {
    pub fn input_logical_prop(&self, child_index: usize) -> ScatterResult<&'a LogicalProperty> {
        let input = self.node.inputs().get(child_index).ok_or_else(|| {
            InvariantViolation::ChildIndexOutOfRange {
                operator: self.node.operator().as_ref().to_string(),
                child_index,
                arity: self.node.inputs().len(),
            }
        })?;
        logical_prop_of(input)
    }

    pub fn logical_prop(&self) -> ScatterResult<&'a LogicalProperty> {
        logical_prop_of(self.node)
    }
}

fn logical_prop_of(node: &PlanNode) -> ScatterResult<&LogicalProperty> {
    node.logical_prop()
        .ok_or_else(|| anyhow!("Logical property of plan node {} not derived", node.id()))
}

/// Inputs for computing what one child must deliver under one optimization request.
pub struct RequiredPropContext<'a> {
    pub plan: PlanContext<'a>,
    /// What the parent requires from this node.
    pub required: &'a RequiredPropertySet,
    pub child_index: usize,
    pub request_index: usize,
    /// Properties delivered by children optimized earlier in this request, by child index.
    pub siblings: &'a [Option<PhysicalPropertySet>],
}

impl<'a> RequiredPropContext<'a> {
    pub fn sibling(&self, child_index: usize) -> ScatterResult<&'a PhysicalPropertySet> {
        self.siblings
            .get(child_index)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| InvariantViolation::MissingSiblingDistribution(child_index).into())
    }

    pub fn required_distribution(&self) -> &'a DistributionSpecRef {
        self.required.distribution().spec()
    }

    pub(crate) fn request_out_of_range(&self, request_count: usize) -> anyhow::Error {
        InvariantViolation::RequestIndexOutOfRange {
            operator: self.plan.node.operator().as_ref().to_string(),
            request_index: self.request_index,
            request_count,
        }
        .into()
    }
}

/// Properties delivered by the children of a node.
pub struct DerivePropContext<'a> {
    pub plan: PlanContext<'a>,
    pub children: &'a [PhysicalPropertySet],
}

impl<'a> DerivePropContext<'a> {
    pub fn child(&self, child_index: usize) -> ScatterResult<&'a PhysicalPropertySet> {
        self.children.get(child_index).ok_or_else(|| {
            InvariantViolation::ChildIndexOutOfRange {
                operator: self.plan.node.operator().as_ref().to_string(),
                child_index,
                arity: self.children.len(),
            }
            .into()
        })
    }
}

/// What a node delivers, next to what its children delivered.
pub struct EnforcePropContext<'a> {
    pub children: &'a [PhysicalPropertySet],
    pub derived: &'a PhysicalPropertySet,
}

#[enum_dispatch(PhysicalOperator)]
pub trait PhysicalOperatorTrait: Debug + PartialEq {
    /// Number of alternative optimization requests sent to children.
    fn distribution_request_count(&self, _context: &PlanContext) -> ScatterResult<usize> {
        Ok(1)
    }

    fn child_exec_order(&self) -> ChildExecOrder {
        ChildExecOrder::LeftToRight
    }

    fn required_distribution(
        &self,
        context: &RequiredPropContext,
    ) -> ScatterResult<DistributionRequirement>;

    fn required_order(&self, _context: &RequiredPropContext) -> ScatterResult<OrderSpec> {
        Ok(OrderSpec::default())
    }

    fn required_rewindability(
        &self,
        _context: &RequiredPropContext,
    ) -> ScatterResult<Rewindability> {
        Ok(Rewindability::NotRewindable)
    }

    fn derive_distribution(&self, context: &DerivePropContext)
        -> ScatterResult<DistributionSpecRef>;

    fn derive_order(&self, _context: &DerivePropContext) -> ScatterResult<OrderSpec> {
        Ok(OrderSpec::default())
    }

    fn derive_rewindability(&self, _context: &DerivePropContext) -> ScatterResult<Rewindability> {
        Ok(Rewindability::NotRewindable)
    }

    fn distribution_enforcement(
        &self,
        context: &EnforcePropContext,
        required: &DistributionRequirement,
    ) -> EnforcementDecision {
        EnforcementDecision::from_satisfied(
            required.is_fulfilled_by(context.derived.distribution()),
        )
    }

    fn order_enforcement(
        &self,
        context: &EnforcePropContext,
        required: &OrderSpec,
    ) -> EnforcementDecision {
        EnforcementDecision::from_satisfied(context.derived.order().satisfies(required))
    }

    fn rewindability_enforcement(
        &self,
        context: &EnforcePropContext,
        required: Rewindability,
    ) -> EnforcementDecision {
        EnforcementDecision::from_satisfied(context.derived.rewindability().satisfies(&required))
    }
}

/// Computes the properties one child must deliver under one request, rejecting indexes the
/// operator doesn't declare.
pub fn required_child_properties(
    operator: &PhysicalOperator,
    context: &RequiredPropContext,
) -> ScatterResult<RequiredPropertySet> {
    let request_count = operator.distribution_request_count(&context.plan)?;
    if context.request_index >= request_count {
        return Err(context.request_out_of_range(request_count));
    }

    let arity = context.plan.node.inputs().len();
    if context.child_index >= arity {
        return Err(InvariantViolation::ChildIndexOutOfRange {
            operator: operator.as_ref().to_string(),
            child_index: context.child_index,
            arity,
        }
        .into());
    }

    Ok(
        RequiredPropertySet::new(operator.required_distribution(context)?)
            .with_order(operator.required_order(context)?)
            .with_rewindability(operator.required_rewindability(context)?),
    )
}

/// Derives all physical properties of a node from what its children delivered.
pub fn derive_physical_props(
    operator: &PhysicalOperator,
    context: &DerivePropContext,
) -> ScatterResult<PhysicalPropertySet> {
    Ok(PhysicalPropertySet::new(operator.derive_distribution(context)?)
        .with_order(operator.derive_order(context)?)
        .with_rewindability(operator.derive_rewindability(context)?))
}

/// Formats a value with `Display` inside `debug_struct` fields.
pub(crate) struct Displayed<T>(pub T);

impl<T: Display> Debug for Displayed<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub(crate) fn display_list<T: Display>(items: &[T]) -> Displayed<String> {
    Displayed(format!("[{}]", items.iter().join(", ")))
}
