use std::fmt::Formatter;
use std::sync::Arc;

use datafusion_expr::Expr;
use log::debug;

use crate::error::ScatterResult;
use crate::operator::{
    DerivePropContext, DisplayFields, Displayed, OperatorTrait, PhysicalOperatorTrait,
    RequiredPropContext, TableDescriptor,
};
use crate::plan::PlanNodeRef;
use crate::properties::{
    DistributionRequirement, DistributionSpec, DistributionSpecRef, HashedSpec, LogicalProperty,
    Rewindability,
};
use crate::utils::{as_equality, local_columns, outer_reference_columns, split_conjunction};

/// Index lookup, usually on the inner side of a correlated join with the predicate referencing
/// outer columns.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexScan {
    table: Arc<TableDescriptor>,
    index_name: String,
    predicate: Expr,
}

impl IndexScan {
    pub fn new<S: Into<String>>(table: Arc<TableDescriptor>, index_name: S, predicate: Expr) -> Self {
        Self {
            table,
            index_name: index_name.into(),
            predicate,
        }
    }

    pub fn table(&self) -> &TableDescriptor {
        &self.table
    }

    pub fn predicate(&self) -> &Expr {
        &self.predicate
    }

    /// Finds an outer expression equal to `key` in the index predicate.
    fn outer_equal_expr(&self, key: &Expr) -> Option<Expr> {
        split_conjunction(&self.predicate)
            .into_iter()
            .filter_map(as_equality)
            .find_map(|(left, right)| {
                let is_outer = |e: &Expr| {
                    !outer_reference_columns(e).is_empty() && local_columns(e).is_empty()
                };
                if left == key && is_outer(right) {
                    Some(right.clone())
                } else if right == key && is_outer(left) {
                    Some(left.clone())
                } else {
                    None
                }
            })
    }

    /// Expresses the table hash key on outer expressions. Every key needs an equality
    /// predicate, otherwise there is no equivalent spec.
    fn equivalent_spec(&self, hashed: &HashedSpec) -> Option<HashedSpec> {
        let exprs = hashed
            .exprs()
            .iter()
            .map(|key| self.outer_equal_expr(key))
            .collect::<Option<Vec<Expr>>>()?;
        hashed.with_exprs(exprs).ok()
    }
}

impl PhysicalOperatorTrait for IndexScan {
    fn required_distribution(
        &self,
        _context: &RequiredPropContext,
    ) -> ScatterResult<DistributionRequirement> {
        Ok(DistributionRequirement::any())
    }

    fn derive_distribution(&self, _context: &DerivePropContext) -> ScatterResult<DistributionSpecRef> {
        let spec = self.table.distribution_spec()?;
        let hashed = match spec.as_ref() {
            DistributionSpec::Hashed(hashed) => hashed,
            _ => return Ok(spec),
        };

        if outer_reference_columns(&self.predicate).is_empty() {
            return Ok(spec);
        }

        match self.equivalent_spec(hashed) {
            Some(equivalent) => Ok(DistributionSpec::hashed(
                hashed.clone().with_equivalent(equivalent),
            )),
            None => {
                debug!(
                    "Index scan {} on {} has no equivalent distribution for {}",
                    self.index_name, self.table.name(), hashed
                );
                Ok(spec)
            }
        }
    }

    fn derive_rewindability(&self, _context: &DerivePropContext) -> ScatterResult<Rewindability> {
        Ok(Rewindability::Rewindable)
    }
}

impl OperatorTrait for IndexScan {
    fn derive_logical_prop(&self, _inputs: &[PlanNodeRef]) -> ScatterResult<LogicalProperty> {
        Ok(LogicalProperty::new(self.table.schema().clone())
            .with_outer_references(outer_reference_columns(&self.predicate)))
    }
}

impl DisplayFields for IndexScan {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("")
            .field("table_name", &self.table.name())
            .field("index_name", &self.index_name)
            .field("predicate", &Displayed(&self.predicate))
            .finish()
    }
}
