use arrow_schema::{DataType, Field, Schema};
use datafusion_common::{Column, DFField, DFSchema};
use datafusion_expr::{col, Expr};
use std::collections::HashMap;
use std::sync::Arc;

use crate::operator::{TableDescriptor, TableDistribution};
use crate::properties::{DistributionSpec, DistributionSpecRef, HashedSpec};

/// Columns `a`, `b` and `c` of every test table.
const ABC_SCHEMA_JSON: &str = r#"{
    "fields": [
        {
            "name": "a",
            "nullable": true,
            "data_type": "Int32",
            "dict_id": 0,
            "dict_is_ordered": false,
            "metadata": {}
        },
        {
            "name": "b",
            "nullable": true,
            "data_type": "Int32",
            "dict_id": 0,
            "dict_is_ordered": false,
            "metadata": {}
        },
        {
            "name": "c",
            "nullable": false,
            "data_type": "Utf8",
            "dict_id": 0,
            "dict_is_ordered": false,
            "metadata": {}
        }
    ],
    "metadata": {}
}"#;

pub fn fields_from_schema(json: &str) -> Vec<Field> {
    let schema: Schema = serde_json::from_str(json).unwrap();
    schema.fields().iter().map(|f| f.as_ref().clone()).collect()
}

pub fn table_schema(name: &str, fields: Vec<Field>) -> DFSchema {
    let fields = fields
        .into_iter()
        .map(|f| DFField::from_qualified(name, Arc::new(f)))
        .collect();
    DFSchema::new_with_metadata(fields, HashMap::new()).unwrap()
}

pub fn test_table(name: &str, distribution: TableDistribution) -> Arc<TableDescriptor> {
    Arc::new(
        TableDescriptor::try_new(name, fields_from_schema(ABC_SCHEMA_JSON), distribution)
            .unwrap(),
    )
}

pub fn hash_on(columns: &[&str]) -> TableDistribution {
    TableDistribution::Hash(
        columns
            .iter()
            .map(|c| Column::from_qualified_name(*c))
            .collect(),
    )
}

pub fn outer_ref(name: &str) -> Expr {
    Expr::OuterReferenceColumn(DataType::Int32, Column::from_qualified_name(name))
}

pub fn hashed_spec(columns: &[&str]) -> HashedSpec {
    HashedSpec::try_new(columns.iter().map(|c| col(*c)).collect(), true).unwrap()
}

pub fn hashed(columns: &[&str]) -> DistributionSpecRef {
    DistributionSpec::hashed(hashed_spec(columns))
}
