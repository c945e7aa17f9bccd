use std::collections::HashMap;
use std::fmt::Formatter;
use std::sync::Arc;

use arrow_schema::Field;
use datafusion_common::{Column, DFField, DFSchema};
use strum_macros::AsRefStr;

use crate::error::{InvariantViolation, ScatterResult};
use crate::operator::{
    DerivePropContext, DisplayFields, OperatorTrait, PhysicalOperatorTrait, RequiredPropContext,
};
use crate::plan::PlanNodeRef;
use crate::properties::{
    DistributionRequirement, DistributionSpec, DistributionSpecRef, HashedSpec, LogicalProperty,
    Rewindability, SingletonLocation,
};
use crate::utils::column_exprs;

/// How rows of a stored table are placed on segments.
#[derive(Clone, Debug, Eq, PartialEq, AsRefStr)]
pub enum TableDistribution {
    /// Stored on master only, e.g. a catalog table.
    MasterOnly,
    Random,
    Hash(Vec<Column>),
    Replicated,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableDescriptor {
    name: String,
    schema: Arc<DFSchema>,
    distribution: TableDistribution,
}

impl TableDescriptor {
    pub fn try_new<S: Into<String>>(
        name: S,
        fields: Vec<Field>,
        distribution: TableDistribution,
    ) -> ScatterResult<Self> {
        let name = name.into();
        let table_fields = fields
            .into_iter()
            .map(|f| DFField::from_qualified(&name, Arc::new(f)))
            .collect();
        let schema = DFSchema::new_with_metadata(table_fields, HashMap::new())?;

        if let TableDistribution::Hash(columns) = &distribution {
            if columns.is_empty() {
                return Err(InvariantViolation::EmptyHashedKeys.into());
            }
            for column in columns {
                schema.field_from_column(column)?;
            }
        }

        Ok(Self {
            name,
            schema: Arc::new(schema),
            distribution,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &DFSchema {
        &self.schema
    }

    pub fn distribution(&self) -> &TableDistribution {
        &self.distribution
    }

    /// Distribution delivered by scanning this table.
    pub fn distribution_spec(&self) -> ScatterResult<DistributionSpecRef> {
        Ok(match &self.distribution {
            TableDistribution::MasterOnly => DistributionSpec::singleton(SingletonLocation::Master),
            TableDistribution::Random => DistributionSpec::random(),
            TableDistribution::Hash(columns) => {
                DistributionSpec::hashed(HashedSpec::try_new(column_exprs(columns), true)?)
            }
            TableDistribution::Replicated => DistributionSpec::replicated(),
        })
    }
}

/// Full scan of a table. A dynamic scan reads the partitions of a partitioned table selected at
/// runtime, and is distributed the same way.
#[derive(Clone, Debug, PartialEq)]
pub struct TableScan {
    table: Arc<TableDescriptor>,
    dynamic: bool,
}

impl TableScan {
    pub fn new(table: Arc<TableDescriptor>) -> Self {
        Self {
            table,
            dynamic: false,
        }
    }

    pub fn dynamic(table: Arc<TableDescriptor>) -> Self {
        Self {
            table,
            dynamic: true,
        }
    }

    pub fn table(&self) -> &TableDescriptor {
        &self.table
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }
}

impl PhysicalOperatorTrait for TableScan {
    fn required_distribution(
        &self,
        _context: &RequiredPropContext,
    ) -> ScatterResult<DistributionRequirement> {
        Ok(DistributionRequirement::any())
    }

    fn derive_distribution(&self, _context: &DerivePropContext) -> ScatterResult<DistributionSpecRef> {
        self.table.distribution_spec()
    }

    fn derive_rewindability(&self, _context: &DerivePropContext) -> ScatterResult<Rewindability> {
        Ok(Rewindability::Rewindable)
    }
}

impl OperatorTrait for TableScan {
    fn derive_logical_prop(&self, _inputs: &[PlanNodeRef]) -> ScatterResult<LogicalProperty> {
        Ok(LogicalProperty::new(self.table.schema().clone()))
    }
}

impl DisplayFields for TableScan {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("");
        s.field("table_name", &self.table.name);
        if self.dynamic {
            s.field("dynamic", &self.dynamic);
        }
        s.finish()
    }
}
