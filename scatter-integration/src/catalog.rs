use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use arrow_schema::Field;
use datafusion_common::Column;
use scatter::error::ScatterResult;
use scatter::operator::{TableDescriptor, TableDistribution};

use crate::scenario::{DistributionDef, TableDef};

/// Tables of a scenario suite, by name.
#[derive(Debug, Default)]
pub struct Catalog {
    tables: HashMap<String, Arc<TableDescriptor>>,
}

impl Catalog {
    pub fn try_new(defs: &[TableDef]) -> ScatterResult<Self> {
        let tables = defs
            .iter()
            .map(|def| Ok((def.name.clone(), Arc::new(to_table_descriptor(def)?))))
            .collect::<ScatterResult<HashMap<_, _>>>()?;
        Ok(Self { tables })
    }

    pub fn table(&self, name: &str) -> ScatterResult<Arc<TableDescriptor>> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("Table not found: {}", name))
    }
}

fn to_table_descriptor(def: &TableDef) -> ScatterResult<TableDescriptor> {
    let fields = def
        .columns
        .iter()
        .map(|c| Field::new(&c.name, c.data_type.clone(), c.nullable))
        .collect();

    let distribution = match &def.distribution {
        DistributionDef::MasterOnly => TableDistribution::MasterOnly,
        DistributionDef::Random => TableDistribution::Random,
        DistributionDef::Hash(keys) => TableDistribution::Hash(
            keys.iter()
                .map(|k| Column::from_qualified_name(format!("{}.{}", def.name, k)))
                .collect(),
        ),
        DistributionDef::Replicated => TableDistribution::Replicated,
    };

    TableDescriptor::try_new(&def.name, fields, distribution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ColumnDef;
    use arrow_schema::DataType;

    fn table_def(distribution: DistributionDef) -> TableDef {
        TableDef {
            name: "orders".to_string(),
            columns: vec![ColumnDef {
                name: "customer_id".to_string(),
                data_type: DataType::Int32,
                nullable: false,
            }],
            distribution,
        }
    }

    #[test]
    fn test_hash_keys_are_qualified() {
        let catalog =
            Catalog::try_new(&[table_def(DistributionDef::Hash(vec!["customer_id".into()]))])
                .unwrap();
        let table = catalog.table("orders").unwrap();
        assert_eq!(
            &TableDistribution::Hash(vec![Column::from_qualified_name("orders.customer_id")]),
            table.distribution()
        );
    }

    #[test]
    fn test_unknown_hash_key() {
        assert!(Catalog::try_new(&[table_def(DistributionDef::Hash(vec!["id".into()]))]).is_err());
    }

    #[test]
    fn test_table_not_found() {
        let catalog = Catalog::try_new(&[table_def(DistributionDef::Random)]).unwrap();
        let err = catalog.table("customer").unwrap_err();
        assert_eq!("Table not found: customer", err.to_string());
    }
}
