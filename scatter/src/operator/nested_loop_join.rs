use std::fmt::Formatter;

use datafusion_expr::Expr;

use crate::error::ScatterResult;
use crate::operator::join::{
    derive_join_distribution, derive_join_logical_prop, derive_join_rewindability, satisfy_after,
};
use crate::operator::{
    DerivePropContext, DisplayFields, Displayed, JoinType, OperatorTrait, PhysicalOperatorTrait,
    PlanContext, RequiredPropContext,
};
use crate::plan::PlanNodeRef;
use crate::properties::{
    DistributionMatching, DistributionRequirement, DistributionSpec, DistributionSpecRef,
    LogicalProperty, Rewindability, SingletonLocation,
};

const OUTER: usize = 0;
const INNER: usize = 1;
const REQUEST_COUNT: usize = 2;

/// Nested loop join. The inner child is rescanned for every outer row, so it must be rewindable.
///
/// Request 0 keeps the outer child where it is and brings the inner child to it, request 1 joins
/// on master.
#[derive(Clone, Debug, PartialEq)]
pub struct NestedLoopJoin {
    join_type: JoinType,
    condition: Expr,
}

impl NestedLoopJoin {
    pub fn new(join_type: JoinType, condition: Expr) -> Self {
        Self {
            join_type,
            condition,
        }
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn condition(&self) -> &Expr {
        &self.condition
    }

    fn required_outer(&self, context: &RequiredPropContext) -> ScatterResult<DistributionSpecRef> {
        let required = context.required_distribution();
        if required.as_singleton().is_some() {
            return Ok(required.clone());
        }

        if context.plan.logical_prop()?.has_outer_references() {
            return Ok(pass_through_or_replicated(required));
        }

        Ok(DistributionSpec::any())
    }

    fn required_inner(&self, context: &RequiredPropContext) -> ScatterResult<DistributionRequirement> {
        let outer = context.sibling(OUTER)?.distribution();
        let matching = if satisfy_after(outer) {
            DistributionMatching::Satisfy
        } else {
            DistributionMatching::Exact
        };

        let required = context.required_distribution();
        if required.as_singleton().is_none() && context.plan.logical_prop()?.has_outer_references() {
            return Ok(DistributionRequirement::with_matching(
                pass_through_or_replicated(required),
                matching,
            ));
        }

        let spec = match outer.as_ref() {
            DistributionSpec::Universal => DistributionSpec::singleton(SingletonLocation::Master),
            DistributionSpec::Singleton(location) => DistributionSpec::singleton(*location),
            _ => DistributionSpec::replicated(),
        };
        Ok(DistributionRequirement::with_matching(spec, matching))
    }
}

/// Correlated execution runs the subtree for every outer row, so it must see all rows.
fn pass_through_or_replicated(required: &DistributionSpecRef) -> DistributionSpecRef {
    match required.as_ref() {
        DistributionSpec::Singleton(_) | DistributionSpec::Replicated => required.clone(),
        _ => DistributionSpec::replicated(),
    }
}

impl PhysicalOperatorTrait for NestedLoopJoin {
    fn distribution_request_count(&self, _context: &PlanContext) -> ScatterResult<usize> {
        Ok(REQUEST_COUNT)
    }

    fn required_distribution(
        &self,
        context: &RequiredPropContext,
    ) -> ScatterResult<DistributionRequirement> {
        match (context.request_index, context.child_index) {
            (0, OUTER) => Ok(DistributionRequirement::new(self.required_outer(context)?)),
            (0, _) => self.required_inner(context),
            (1, _) => Ok(DistributionRequirement::new(DistributionSpec::singleton(
                SingletonLocation::Master,
            ))),
            _ => Err(context.request_out_of_range(REQUEST_COUNT)),
        }
    }

    fn required_rewindability(&self, context: &RequiredPropContext) -> ScatterResult<Rewindability> {
        if context.child_index == INNER {
            Ok(Rewindability::Rewindable)
        } else {
            Ok(context.required.rewindability())
        }
    }

    fn derive_distribution(&self, context: &DerivePropContext) -> ScatterResult<DistributionSpecRef> {
        Ok(derive_join_distribution(
            self.join_type,
            context.child(OUTER)?,
            context.child(INNER)?,
        ))
    }

    fn derive_rewindability(&self, context: &DerivePropContext) -> ScatterResult<Rewindability> {
        Ok(derive_join_rewindability(context.child(OUTER)?, context.child(INNER)?))
    }
}

impl OperatorTrait for NestedLoopJoin {
    fn derive_logical_prop(&self, inputs: &[PlanNodeRef]) -> ScatterResult<LogicalProperty> {
        derive_join_logical_prop(
            "PhysicalNestedLoopJoin",
            self.join_type,
            inputs,
            std::iter::once(&self.condition),
        )
    }
}

impl DisplayFields for NestedLoopJoin {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("")
            .field("join_type", &self.join_type)
            .field("condition", &Displayed(&self.condition))
            .finish()
    }
}
