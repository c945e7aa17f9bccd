use std::collections::HashSet;
use std::sync::Arc;

use datafusion_common::{Column, DFSchema};

/// Properties shared by logically equivalent plans.
#[derive(Clone, PartialEq, Debug)]
pub struct LogicalProperty {
    schema: Arc<DFSchema>,
    /// Columns of enclosing query blocks used in the subtree.
    outer_references: HashSet<Column>,
    has_volatile_function: bool,
}

impl LogicalProperty {
    pub fn new(schema: DFSchema) -> Self {
        Self {
            schema: Arc::new(schema),
            outer_references: HashSet::new(),
            has_volatile_function: false,
        }
    }

    pub fn with_outer_references<I: IntoIterator<Item = Column>>(mut self, columns: I) -> Self {
        self.outer_references.extend(columns);
        self
    }

    pub fn with_volatile_function(mut self, has_volatile_function: bool) -> Self {
        self.has_volatile_function |= has_volatile_function;
        self
    }

    pub fn schema(&self) -> &DFSchema {
        &self.schema
    }

    pub fn output_columns(&self) -> HashSet<Column> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.qualified_column())
            .collect()
    }

    pub fn outer_references(&self) -> &HashSet<Column> {
        &self.outer_references
    }

    pub fn has_outer_references(&self) -> bool {
        !self.outer_references.is_empty()
    }

    pub fn has_volatile_function(&self) -> bool {
        self.has_volatile_function
    }
}
