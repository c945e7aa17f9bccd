use std::collections::HashSet;

use strum_macros::{AsRefStr, EnumString};

use crate::error::{InvariantViolation, ScatterResult};
use crate::plan::PlanNodeRef;
use crate::properties::{
    DistributionSpec, DistributionSpecRef, LogicalProperty, PhysicalPropertySet, Rewindability,
};
use datafusion_common::Column;
use datafusion_expr::Expr;

use crate::utils::outer_reference_columns;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, AsRefStr, EnumString)]
pub enum JoinType {
    Inner,
    LeftOuter,
    LeftSemi,
    LeftAnti,
}

impl JoinType {
    /// Semi and anti joins only output outer columns.
    pub fn projects_inner_columns(self) -> bool {
        matches!(self, JoinType::Inner | JoinType::LeftOuter)
    }
}

fn input_logical_prop<'a>(
    operator: &str,
    inputs: &'a [PlanNodeRef],
    child_index: usize,
) -> ScatterResult<&'a LogicalProperty> {
    let input = inputs
        .get(child_index)
        .ok_or_else(|| InvariantViolation::ChildIndexOutOfRange {
            operator: operator.to_string(),
            child_index,
            arity: inputs.len(),
        })?;
    input
        .logical_prop()
        .ok_or_else(|| anyhow::anyhow!("Logical property of plan node {} not derived", input.id()))
}

/// Logical property shared by join operators. Outer references of one side resolved by columns
/// of the other side are no longer outer references of the join.
pub(crate) fn derive_join_logical_prop<'a, I: IntoIterator<Item = &'a Expr>>(
    operator: &str,
    join_type: JoinType,
    inputs: &[PlanNodeRef],
    exprs: I,
) -> ScatterResult<LogicalProperty> {
    let outer = input_logical_prop(operator, inputs, 0)?;
    let inner = input_logical_prop(operator, inputs, 1)?;

    let schema = if join_type.projects_inner_columns() {
        outer.schema().join(inner.schema())?
    } else {
        outer.schema().clone()
    };

    let visible: HashSet<Column> = outer
        .output_columns()
        .union(&inner.output_columns())
        .cloned()
        .collect();
    let outer_references: Vec<Column> = outer
        .outer_references()
        .iter()
        .chain(inner.outer_references())
        .cloned()
        .chain(exprs.into_iter().flat_map(outer_reference_columns))
        .filter(|c| !visible.contains(c))
        .collect();

    Ok(LogicalProperty::new(schema)
        .with_outer_references(outer_references)
        .with_volatile_function(outer.has_volatile_function() || inner.has_volatile_function()))
}

/// Outer child's distribution, unless outer is replicated or universal, then inner's. Inner
/// hashed keys are not visible above semi and anti joins.
pub(crate) fn derive_join_distribution(
    join_type: JoinType,
    outer: &PhysicalPropertySet,
    inner: &PhysicalPropertySet,
) -> DistributionSpecRef {
    match outer.distribution().as_ref() {
        DistributionSpec::Replicated | DistributionSpec::Universal => {
            if !join_type.projects_inner_columns() && inner.distribution().as_hashed().is_some() {
                DistributionSpec::random()
            } else {
                inner.distribution().clone()
            }
        }
        _ => outer.distribution().clone(),
    }
}

pub(crate) fn derive_join_rewindability(
    outer: &PhysicalPropertySet,
    inner: &PhysicalPropertySet,
) -> Rewindability {
    if outer.rewindability() == Rewindability::Rewindable
        && inner.rewindability() == Rewindability::Rewindable
    {
        Rewindability::Rewindable
    } else {
        Rewindability::NotRewindable
    }
}

/// Whether the previously optimized child's distribution lets the next child be compared by
/// satisfaction instead of exact matching.
pub(crate) fn satisfy_after(first: &DistributionSpec) -> bool {
    matches!(
        first,
        DistributionSpec::Replicated | DistributionSpec::Universal
    )
}
