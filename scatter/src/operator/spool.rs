use std::fmt::Formatter;

use crate::error::ScatterResult;
use crate::operator::{
    DerivePropContext, DisplayFields, OperatorTrait, PhysicalOperatorTrait, RequiredPropContext,
};
use crate::plan::PlanNodeRef;
use crate::properties::{
    DistributionRequirement, DistributionSpecRef, LogicalProperty, OrderSpec, Rewindability,
};

/// Materializes its input so that it can be rescanned.
#[derive(Clone, Debug, PartialEq)]
pub struct Spool;

impl PhysicalOperatorTrait for Spool {
    fn required_distribution(
        &self,
        context: &RequiredPropContext,
    ) -> ScatterResult<DistributionRequirement> {
        Ok(context.required.distribution().clone())
    }

    fn required_order(&self, context: &RequiredPropContext) -> ScatterResult<OrderSpec> {
        Ok(context.required.order().clone())
    }

    fn derive_distribution(&self, context: &DerivePropContext) -> ScatterResult<DistributionSpecRef> {
        Ok(context.child(0)?.distribution().clone())
    }

    fn derive_order(&self, context: &DerivePropContext) -> ScatterResult<OrderSpec> {
        Ok(context.child(0)?.order().clone())
    }

    fn derive_rewindability(&self, _context: &DerivePropContext) -> ScatterResult<Rewindability> {
        Ok(Rewindability::Rewindable)
    }
}

impl OperatorTrait for Spool {
    fn derive_logical_prop(&self, inputs: &[PlanNodeRef]) -> ScatterResult<LogicalProperty> {
        inputs
            .first()
            .and_then(|input| input.logical_prop())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Spool needs an input with derived logical property"))
    }
}

impl DisplayFields for Spool {
    fn display(&self, _f: &mut Formatter<'_>) -> std::fmt::Result {
        Ok(())
    }
}
