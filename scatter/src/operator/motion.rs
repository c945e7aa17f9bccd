//! Motions move rows between segments. They are only added by the search driver, as enforcers of
//! a distribution requirement.
use std::fmt::Formatter;

use crate::error::ScatterResult;
use crate::operator::{
    DerivePropContext, DisplayFields, Displayed, EnforcePropContext, OperatorTrait,
    PhysicalOperatorTrait, RequiredPropContext,
};
use crate::plan::PlanNodeRef;
use crate::properties::{
    DistributionRequirement, DistributionSpec, DistributionSpecRef, EnforcementDecision,
    HashedSpec, LogicalProperty, OrderSpec, SingletonLocation,
};

fn input_logical_prop(inputs: &[PlanNodeRef]) -> ScatterResult<LogicalProperty> {
    inputs
        .first()
        .and_then(|input| input.logical_prop())
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Motion needs an input with derived logical property"))
}

/// A motion on top of a motion is never useful: the lower one would be wasted.
fn motion_enforcement(
    context: &EnforcePropContext,
    required: &DistributionRequirement,
) -> EnforcementDecision {
    if required.is_fulfilled_by(context.derived.distribution()) {
        EnforcementDecision::Unnecessary
    } else {
        EnforcementDecision::Prohibited
    }
}

/// Collects all rows on one node.
#[derive(Clone, Debug, PartialEq)]
pub struct Gather {
    location: SingletonLocation,
}

impl Gather {
    pub fn new(location: SingletonLocation) -> Self {
        Self { location }
    }

    pub fn location(&self) -> SingletonLocation {
        self.location
    }
}

impl PhysicalOperatorTrait for Gather {
    fn required_distribution(
        &self,
        _context: &RequiredPropContext,
    ) -> ScatterResult<DistributionRequirement> {
        Ok(DistributionRequirement::any())
    }

    fn derive_distribution(&self, _context: &DerivePropContext) -> ScatterResult<DistributionSpecRef> {
        Ok(DistributionSpec::singleton(self.location))
    }

    fn distribution_enforcement(
        &self,
        context: &EnforcePropContext,
        required: &DistributionRequirement,
    ) -> EnforcementDecision {
        motion_enforcement(context, required)
    }
}

impl OperatorTrait for Gather {
    fn derive_logical_prop(&self, inputs: &[PlanNodeRef]) -> ScatterResult<LogicalProperty> {
        input_logical_prop(inputs)
    }
}

impl DisplayFields for Gather {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("").field("location", &self.location).finish()
    }
}

/// Gathers sorted streams to master, keeping their order.
#[derive(Clone, Debug, PartialEq)]
pub struct GatherMerge {
    order: OrderSpec,
}

impl GatherMerge {
    pub fn new(order: OrderSpec) -> Self {
        Self { order }
    }

    pub fn order(&self) -> &OrderSpec {
        &self.order
    }
}

impl PhysicalOperatorTrait for GatherMerge {
    fn required_distribution(
        &self,
        _context: &RequiredPropContext,
    ) -> ScatterResult<DistributionRequirement> {
        Ok(DistributionRequirement::any())
    }

    fn required_order(&self, _context: &RequiredPropContext) -> ScatterResult<OrderSpec> {
        Ok(self.order.clone())
    }

    fn derive_distribution(&self, _context: &DerivePropContext) -> ScatterResult<DistributionSpecRef> {
        Ok(DistributionSpec::singleton(SingletonLocation::Master))
    }

    fn derive_order(&self, _context: &DerivePropContext) -> ScatterResult<OrderSpec> {
        Ok(self.order.clone())
    }

    fn distribution_enforcement(
        &self,
        context: &EnforcePropContext,
        required: &DistributionRequirement,
    ) -> EnforcementDecision {
        motion_enforcement(context, required)
    }
}

impl OperatorTrait for GatherMerge {
    fn derive_logical_prop(&self, inputs: &[PlanNodeRef]) -> ScatterResult<LogicalProperty> {
        input_logical_prop(inputs)
    }
}

impl DisplayFields for GatherMerge {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("")
            .field("order", &Displayed(&self.order))
            .finish()
    }
}

/// Sends every row to every segment.
#[derive(Clone, Debug, PartialEq)]
pub struct Broadcast;

impl PhysicalOperatorTrait for Broadcast {
    fn required_distribution(
        &self,
        _context: &RequiredPropContext,
    ) -> ScatterResult<DistributionRequirement> {
        Ok(DistributionRequirement::any())
    }

    fn derive_distribution(&self, _context: &DerivePropContext) -> ScatterResult<DistributionSpecRef> {
        Ok(DistributionSpec::replicated())
    }

    fn distribution_enforcement(
        &self,
        context: &EnforcePropContext,
        required: &DistributionRequirement,
    ) -> EnforcementDecision {
        motion_enforcement(context, required)
    }
}

impl OperatorTrait for Broadcast {
    fn derive_logical_prop(&self, inputs: &[PlanNodeRef]) -> ScatterResult<LogicalProperty> {
        input_logical_prop(inputs)
    }
}

impl DisplayFields for Broadcast {
    fn display(&self, _f: &mut Formatter<'_>) -> std::fmt::Result {
        Ok(())
    }
}

/// Sends each row to the segment selected by hashing its key expressions.
#[derive(Clone, Debug, PartialEq)]
pub struct Redistribute {
    spec: HashedSpec,
}

impl Redistribute {
    pub fn new(spec: HashedSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &HashedSpec {
        &self.spec
    }
}

impl PhysicalOperatorTrait for Redistribute {
    fn required_distribution(
        &self,
        _context: &RequiredPropContext,
    ) -> ScatterResult<DistributionRequirement> {
        Ok(DistributionRequirement::any())
    }

    fn derive_distribution(&self, _context: &DerivePropContext) -> ScatterResult<DistributionSpecRef> {
        Ok(DistributionSpec::hashed(self.spec.clone()))
    }

    fn distribution_enforcement(
        &self,
        context: &EnforcePropContext,
        required: &DistributionRequirement,
    ) -> EnforcementDecision {
        motion_enforcement(context, required)
    }
}

impl OperatorTrait for Redistribute {
    fn derive_logical_prop(&self, inputs: &[PlanNodeRef]) -> ScatterResult<LogicalProperty> {
        input_logical_prop(inputs)
    }
}

impl DisplayFields for Redistribute {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("")
            .field("spec", &Displayed(&self.spec))
            .finish()
    }
}
