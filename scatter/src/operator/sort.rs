use std::fmt::Formatter;

use crate::error::ScatterResult;
use crate::operator::{
    DerivePropContext, DisplayFields, Displayed, OperatorTrait, PhysicalOperatorTrait,
    RequiredPropContext,
};
use crate::plan::PlanNodeRef;
use crate::properties::{
    DistributionRequirement, DistributionSpecRef, LogicalProperty, OrderSpec, Rewindability,
};

/// Sorts rows within each segment. Added by the search driver to enforce an order.
#[derive(Clone, Debug, PartialEq)]
pub struct Sort {
    order: OrderSpec,
}

impl Sort {
    pub fn new(order: OrderSpec) -> Self {
        Self { order }
    }

    pub fn order(&self) -> &OrderSpec {
        &self.order
    }
}

impl PhysicalOperatorTrait for Sort {
    fn required_distribution(
        &self,
        context: &RequiredPropContext,
    ) -> ScatterResult<DistributionRequirement> {
        Ok(context.required.distribution().clone())
    }

    fn derive_distribution(&self, context: &DerivePropContext) -> ScatterResult<DistributionSpecRef> {
        Ok(context.child(0)?.distribution().clone())
    }

    fn derive_order(&self, _context: &DerivePropContext) -> ScatterResult<OrderSpec> {
        Ok(self.order.clone())
    }

    /// Sort materializes its input.
    fn derive_rewindability(&self, _context: &DerivePropContext) -> ScatterResult<Rewindability> {
        Ok(Rewindability::Rewindable)
    }
}

impl OperatorTrait for Sort {
    fn derive_logical_prop(&self, inputs: &[PlanNodeRef]) -> ScatterResult<LogicalProperty> {
        inputs
            .first()
            .and_then(|input| input.logical_prop())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Sort needs an input with derived logical property"))
    }
}

impl DisplayFields for Sort {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("")
            .field("order", &Displayed(&self.order))
            .finish()
    }
}
