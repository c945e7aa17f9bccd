//! Rewrites of hashed distributions under column substitutions.

use std::collections::{HashMap, HashSet};

use arrow_schema::DataType;
use datafusion_common::{Column, DFSchema};
use datafusion_expr::expr_rewriter::replace_col;
use datafusion_expr::Expr;

use crate::error::ScatterResult;
use crate::properties::{DistributionSpec, DistributionSpecRef, HashedSpec, SingletonLocation};
use crate::utils::referenced_columns;

/// Whether values of this type can be used as a hash distribution key.
pub fn is_hashable(data_type: &DataType) -> bool {
    !matches!(
        data_type,
        DataType::Null
            | DataType::List(_)
            | DataType::LargeList(_)
            | DataType::FixedSizeList(_, _)
            | DataType::Struct(_)
            | DataType::Union(_, _)
            | DataType::Map(_, _)
    )
}

/// Drops every key expression referencing a column of `columns`. Returns `None` when no key is
/// left.
pub fn exclude_columns(spec: &HashedSpec, columns: &HashSet<Column>) -> Option<HashedSpec> {
    let kept: Vec<Expr> = spec
        .exprs()
        .iter()
        .filter(|e| referenced_columns(e).is_disjoint(columns))
        .cloned()
        .collect();

    if kept.len() == spec.exprs().len() {
        let equivalent = spec
            .equivalent()
            .and_then(|e| exclude_columns(e, columns));
        return Some(match equivalent {
            Some(e) => spec.clone().with_equivalent(e),
            None => spec.clone().without_equivalent(),
        });
    }

    let mut excluded = spec.with_exprs(kept).ok()?;
    if let Some(e) = spec.equivalent().and_then(|e| exclude_columns(e, columns)) {
        excluded = excluded.with_equivalent(e);
    }
    Some(excluded)
}

fn remap_hashed(spec: &HashedSpec, mapping: &HashMap<&Column, &Column>) -> ScatterResult<HashedSpec> {
    let exprs = spec
        .exprs()
        .iter()
        .map(|e| replace_col(e.clone(), mapping))
        .collect::<Result<Vec<Expr>, _>>()?;

    let mut remapped = spec.with_exprs(exprs)?;
    if let Some(equivalent) = spec.equivalent() {
        remapped = remapped.with_equivalent(remap_hashed(equivalent, mapping)?);
    }
    Ok(remapped)
}

/// Rewrites key expressions of a hashed spec through `mapping`. Other specs carry no expressions
/// and are returned as is.
pub fn remap_columns(
    spec: &DistributionSpecRef,
    mapping: &HashMap<Column, Column>,
) -> ScatterResult<DistributionSpecRef> {
    match spec.as_ref() {
        DistributionSpec::Hashed(hashed) => {
            let mapping: HashMap<&Column, &Column> = mapping.iter().collect();
            Ok(DistributionSpec::hashed(remap_hashed(hashed, &mapping)?))
        }
        _ => Ok(spec.clone()),
    }
}

/// Builds the largest hashed spec from the hashable columns of `columns`, keeping their order.
pub fn maximal_hashed_subset(
    columns: &[Column],
    schema: &DFSchema,
    nulls_colocated: bool,
) -> ScatterResult<Option<HashedSpec>> {
    let mut exprs = Vec::with_capacity(columns.len());
    for column in columns {
        if is_hashable(schema.field_from_column(column)?.data_type()) {
            exprs.push(Expr::Column(column.clone()));
        }
    }

    if exprs.is_empty() {
        Ok(None)
    } else {
        Ok(Some(HashedSpec::try_new(exprs, nulls_colocated)?))
    }
}

/// Maximal hashed spec on `columns` with nulls colocated, or `Singleton(Master)` when no column
/// is hashable.
pub fn maximal_hashed_or_master(
    columns: &[Column],
    schema: &DFSchema,
) -> ScatterResult<DistributionSpecRef> {
    Ok(match maximal_hashed_subset(columns, schema, true)? {
        Some(spec) => DistributionSpec::hashed(spec),
        None => DistributionSpec::singleton(SingletonLocation::Master),
    })
}

/// Distribution of an operator output keeping only `output` columns of its input. A hashed spec
/// whose keys are hidden falls back to its equivalent spec, then to `Random`.
pub fn restrict_to_output(
    spec: &DistributionSpecRef,
    output: &HashSet<Column>,
) -> DistributionSpecRef {
    let hashed = match spec.as_ref() {
        DistributionSpec::Hashed(hashed) => hashed,
        _ => return spec.clone(),
    };

    if hashed.columns().is_subset(output) {
        return spec.clone();
    }
    match hashed.equivalent() {
        Some(equivalent) if equivalent.columns().is_subset(output) => {
            DistributionSpec::hashed(equivalent.clone())
        }
        _ => DistributionSpec::random(),
    }
}
