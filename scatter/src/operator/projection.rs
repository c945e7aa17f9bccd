use std::collections::HashSet;
use std::fmt::Formatter;

use datafusion_common::{Column, DFField, DFSchema};
use datafusion_expr::{Expr, ExprSchemable};

use crate::error::{DFResult, ScatterResult};
use crate::operator::{
    display_list, DerivePropContext, DisplayFields, OperatorTrait, PhysicalOperatorTrait,
    RequiredPropContext,
};
use crate::plan::PlanNodeRef;
use crate::properties::rewrite::restrict_to_output;
use crate::properties::{
    DistributionRequirement, DistributionSpec, DistributionSpecRef, LogicalProperty,
    Rewindability,
};
use crate::utils::{has_volatile_function, outer_reference_columns};

const CHILD: usize = 0;

/// Computes scalar expressions over its input rows.
#[derive(Clone, Debug, PartialEq)]
pub struct Projection {
    expr: Vec<Expr>,
}

impl Projection {
    pub fn new<I: IntoIterator<Item = Expr>>(exprs: I) -> Self {
        Self {
            expr: exprs.into_iter().collect(),
        }
    }

    pub fn expr(&self) -> &[Expr] {
        &self.expr
    }

    /// Input columns passed to the output unchanged.
    fn forwarded_columns(&self) -> HashSet<Column> {
        self.expr
            .iter()
            .filter_map(|e| match e {
                Expr::Column(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }
}

impl PhysicalOperatorTrait for Projection {
    /// A requirement on forwarded columns can be met below the projection. Keys computed by the
    /// projection need an enforcer on top of it.
    fn required_distribution(
        &self,
        context: &RequiredPropContext,
    ) -> ScatterResult<DistributionRequirement> {
        let required = context.required.distribution();
        match required.spec().as_ref() {
            DistributionSpec::Hashed(hashed)
                if !hashed.columns().is_subset(&self.forwarded_columns()) =>
            {
                Ok(DistributionRequirement::any())
            }
            _ => Ok(required.clone()),
        }
    }

    fn required_rewindability(&self, context: &RequiredPropContext) -> ScatterResult<Rewindability> {
        Ok(context.required.rewindability())
    }

    fn derive_distribution(&self, context: &DerivePropContext) -> ScatterResult<DistributionSpecRef> {
        Ok(restrict_to_output(
            context.child(CHILD)?.distribution(),
            &self.forwarded_columns(),
        ))
    }

    fn derive_rewindability(&self, context: &DerivePropContext) -> ScatterResult<Rewindability> {
        Ok(context.child(CHILD)?.rewindability())
    }
}

impl OperatorTrait for Projection {
    fn derive_logical_prop(&self, inputs: &[PlanNodeRef]) -> ScatterResult<LogicalProperty> {
        let input_logical_prop = inputs
            .get(CHILD)
            .and_then(|i| i.logical_prop())
            .ok_or_else(|| anyhow::anyhow!("Projection needs an input with derived logical property"))?;
        let input_schema = input_logical_prop.schema();
        let schema = DFSchema::new_with_metadata(
            self.expr
                .iter()
                .map(|e| e.to_field(input_schema))
                .collect::<DFResult<Vec<DFField>>>()?,
            input_schema.metadata().clone(),
        )?;

        let visible = input_logical_prop.output_columns();
        let outer_references = input_logical_prop.outer_references().iter().cloned().chain(
            self.expr
                .iter()
                .flat_map(outer_reference_columns)
                .filter(|c| !visible.contains(c)),
        );
        Ok(LogicalProperty::new(schema)
            .with_outer_references(outer_references)
            .with_volatile_function(
                input_logical_prop.has_volatile_function()
                    || self.expr.iter().any(has_volatile_function),
            ))
    }
}

impl DisplayFields for Projection {
    fn display(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_struct("")
            .field("expr", &display_list(&self.expr))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{required_child_properties, PlanContext, TableDistribution};
    use crate::optimizer::OptimizerConfig;
    use crate::plan::{PhysicalPlanBuilder, Plan};
    use crate::properties::{PhysicalPropertySet, RequiredPropertySet};
    use crate::test_utils::{hash_on, hashed, test_table};
    use datafusion_expr::{col, lit, random};

    fn projection_plan(exprs: Vec<Expr>) -> Plan {
        PhysicalPlanBuilder::scan(test_table("t1", hash_on(&["t1.a"])))
            .projection(exprs)
            .build()
            .unwrap()
    }

    #[test]
    fn test_volatile_projection() {
        let plan = projection_plan(vec![col("t1.a"), random().alias("r")]);
        let prop = plan.root().logical_prop().unwrap().clone();
        assert!(prop.has_volatile_function());
        assert_eq!(2, prop.schema().fields().len());

        let plan = projection_plan(vec![col("t1.a"), (col("t1.b") + lit(1)).alias("b1")]);
        assert!(!plan.root().logical_prop().unwrap().has_volatile_function());
    }

    #[test]
    fn test_requirement_on_computed_keys() {
        let plan = projection_plan(vec![col("t1.a"), (col("t1.b") + lit(1)).alias("b1")]);
        let root = plan.root();
        let config = OptimizerConfig::default();
        let required = |spec: DistributionSpecRef| {
            let incoming = RequiredPropertySet::new(DistributionRequirement::new(spec));
            required_child_properties(
                root.operator(),
                &RequiredPropContext {
                    plan: PlanContext {
                        node: &root,
                        config: &config,
                    },
                    required: &incoming,
                    child_index: 0,
                    request_index: 0,
                    siblings: &[None],
                },
            )
            .unwrap()
        };

        assert_eq!(&hashed(&["t1.a"]), required(hashed(&["t1.a"])).distribution().spec());
        assert_eq!(&DistributionSpec::any(), required(hashed(&["b1"])).distribution().spec());
        assert_eq!(
            &DistributionSpec::replicated(),
            required(DistributionSpec::replicated()).distribution().spec()
        );
    }

    #[test]
    fn test_derive_hides_dropped_keys() {
        let plan = projection_plan(vec![col("t1.b")]);
        let root = plan.root();
        let config = OptimizerConfig::default();
        let derived = root
            .operator()
            .derive_distribution(&DerivePropContext {
                plan: PlanContext {
                    node: &root,
                    config: &config,
                },
                children: &[PhysicalPropertySet::new(hashed(&["t1.a"]))],
            })
            .unwrap();
        assert_eq!(DistributionSpec::random(), derived);
    }
}
