use std::collections::{HashMap, HashSet};
use std::fmt::Formatter;

use anyhow::bail;
use arrow_schema::DataType;
use datafusion_common::{Column, DFField, DFSchema};

use crate::error::ScatterResult;
use crate::operator::{
    display_list, DerivePropContext, DisplayFields, EnforcePropContext, OperatorTrait,
    PhysicalOperatorTrait, RequiredPropContext,
};
use crate::plan::PlanNodeRef;
use crate::properties::{
    DistributionRequirement, DistributionSpec, DistributionSpecRef, EnforcementDecision,
    LogicalProperty, Rewindability,
};

const CHILD: usize = 0;

/// Turns each input row of an UPDATE into a delete row with the old values and an insert row
/// with the new values, tagged by the action column.
#[derive(Clone, Debug, PartialEq)]
pub struct Split {
    delete_columns: Vec<Column>,
    insert_columns: Vec<Column>,
    action_column: String,
}

impl Split {
    pub fn try_new<S: Into<String>>(
        delete_columns: Vec<Column>,
        insert_columns: Vec<Column>,
        action_column: S,
    ) -> ScatterResult<Self> {
        if delete_columns.len() != insert_columns.len() {
            bail!(
                "Split needs as many insert columns as delete columns, got {} and {}",
                insert_columns.len(),
                delete_columns.len()
            );
        }

        Ok(Self {
            delete_columns,
            insert_columns,
            action_column: action_column.into(),
        })
    }

    /// Old and new columns of every pair whose value changes.
    fn modified_columns(&self) -> HashSet<&Column> {
        self.delete_columns
            .iter()
            .zip(&self.insert_columns)
            .filter(|(old, new)| old != new)
            .flat_map(|(old, new)| [old, new])
            .collect()
    }
}

impl PhysicalOperatorTrait for Split {
    fn required_distribution(
        &self,
        _context: &RequiredPropContext,
    ) -> ScatterResult<DistributionRequirement> {
        Ok(DistributionRequirement::any())
    }

    fn required_rewindability(&self, context: &RequiredPropContext) -> ScatterResult<Rewindability> {
        Ok(context.required.rewindability())
    }

    /// Rows with a modified distribution key may now belong to another segment.
    fn derive_distribution(&self, context: &DerivePropContext) -> ScatterResult<DistributionSpecRef> {
        let child = context.child(CHILD)?.distribution();
        let hashed = match child.as_ref() {
            DistributionSpec::Hashed(hashed) => hashed,
            _ => return Ok(child.clone()),
        };

        let modified = self.modified_columns();
        let touches = |columns: HashSet<Column>| columns.iter().any(|c| modified.contains(c));
        let key_modified = touches(hashed.columns())
            || hashed.equivalent().map_or(false, |e| touches(e.columns()));

        Ok(if key_modified {
            DistributionSpec::random()
        } else {
            child.clone()
        })
    }

    fn derive_rewindability(&self, context: &DerivePropContext) -> ScatterResult<Rewindability> {
        Ok(context.child(CHILD)?.rewindability())
    }

    /// Always materialized before reaching a rewinding consumer.
    fn rewindability_enforcement(
        &self,
        _context: &EnforcePropContext,
        _required: Rewindability,
    ) -> EnforcementDecision {
        EnforcementDecision::Required
    }
}

impl OperatorTrait for Split {
    fn derive_logical_prop(&self, inputs: &[PlanNodeRef]) -> ScatterResult<LogicalProperty> {
        let input = inputs
            .get(CHILD)
            .and_then(|i| i.logical_prop())
            .ok_or_else(|| anyhow::anyhow!("Split needs an input with derived logical property"))?;

        let action = DFSchema::new_with_metadata(
            vec![DFField::new_unqualified(&self.action_column, DataType::Int32, false)],
            HashMap::new(),
        )?;
        Ok(LogicalProperty::new(input.schema().join(&action)?)
            .with_outer_references(input.outer_references().iter().cloned())
            .with_volatile_function(input.has_volatile_function()))
    }
}

impl DisplayFields for Split {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("")
            .field("delete_columns", &display_list(&self.delete_columns))
            .field("insert_columns", &display_list(&self.insert_columns))
            .field("action", &self.action_column)
            .finish()
    }
}
