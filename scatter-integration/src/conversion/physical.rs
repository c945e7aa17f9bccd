use std::str::FromStr;

use anyhow::{anyhow, bail};
use datafusion_common::DFField;
use log::debug;
use scatter::error::ScatterResult;
use scatter::operator::{Aggregate, AggregateStage, HashJoin, JoinType, NestedLoopJoin, Split};
use scatter::plan::{PhysicalPlanBuilder, Plan};
use scatter::properties::HashedSpec;

use crate::catalog::Catalog;
use crate::conversion::{to_column_exprs, to_columns, to_expr, to_order_spec};
use crate::scenario::{OperatorDef, PlanDef};

/// Convert a scenario plan to a scatter plan, resolving tables in `catalog`.
pub fn to_physical_plan(def: &PlanDef, catalog: &Catalog) -> ScatterResult<Plan> {
    let plan = to_builder(def, catalog)?.build()?;
    debug!("Converted plan with root {}", plan.root().operator());
    Ok(plan)
}

fn expect_inputs(def: &PlanDef, arity: usize) -> ScatterResult<()> {
    if def.inputs.len() != arity {
        bail!(
            "Operator {:?} expects {} inputs, got {}",
            def.operator,
            arity,
            def.inputs.len()
        );
    }
    Ok(())
}

fn join_type(name: &str) -> ScatterResult<JoinType> {
    JoinType::from_str(name).map_err(|_| anyhow!("Unknown join type: {}", name))
}

fn to_builder(def: &PlanDef, catalog: &Catalog) -> ScatterResult<PhysicalPlanBuilder> {
    let arity = match &def.operator {
        OperatorDef::Scan { .. } | OperatorDef::IndexScan { .. } => 0,
        OperatorDef::HashJoin { .. } | OperatorDef::NestedLoopJoin { .. } => 2,
        _ => 1,
    };
    expect_inputs(def, arity)?;

    let mut inputs = def
        .inputs
        .iter()
        .map(|input| to_builder(input, catalog))
        .collect::<ScatterResult<Vec<PhysicalPlanBuilder>>>()?
        .into_iter();
    let mut next_input = || {
        inputs
            .next()
            .ok_or_else(|| anyhow!("Missing input of {:?}", def.operator))
    };

    let builder = match &def.operator {
        OperatorDef::Scan { table, dynamic } => {
            let table = catalog.table(table)?;
            if *dynamic {
                PhysicalPlanBuilder::dynamic_scan(table)
            } else {
                PhysicalPlanBuilder::scan(table)
            }
        }
        OperatorDef::IndexScan {
            table,
            index,
            predicate,
        } => PhysicalPlanBuilder::index_scan(catalog.table(table)?, index, to_expr(predicate)),
        OperatorDef::HashJoin {
            join_type: name,
            outer_keys,
            inner_keys,
        } => {
            let join = HashJoin::try_new(
                join_type(name)?,
                to_column_exprs(outer_keys),
                to_column_exprs(inner_keys),
            )?;
            let outer = next_input()?;
            outer.hash_join(join, next_input()?)
        }
        OperatorDef::NestedLoopJoin {
            join_type: name,
            condition,
        } => {
            let join = NestedLoopJoin::new(join_type(name)?, to_expr(condition));
            let outer = next_input()?;
            outer.nested_loop_join(join, next_input()?)
        }
        OperatorDef::Aggregate {
            stage,
            group_by,
            minimal_group_by,
            distinct,
            aggr,
        } => {
            let aggr_fields = aggr
                .iter()
                .map(|c| DFField::new_unqualified(&c.name, c.data_type.clone(), c.nullable))
                .collect();
            let aggregate = Aggregate::try_new(
                AggregateStage::from_tag(stage)?,
                to_columns(group_by),
                to_columns(distinct),
                aggr_fields,
            )?
            .with_minimal_group_columns(to_columns(minimal_group_by));
            next_input()?.aggregate(aggregate)
        }
        OperatorDef::Projection { exprs } => {
            next_input()?.projection(exprs.iter().map(to_expr).collect())
        }
        OperatorDef::Split {
            delete,
            insert,
            action,
        } => next_input()?.split(Split::try_new(to_columns(delete), to_columns(insert), action)?),
        OperatorDef::Sort { order } => next_input()?.sort(to_order_spec(order)),
        OperatorDef::Spool => next_input()?.spool(),
        OperatorDef::Gather { location } => next_input()?.gather(*location),
        OperatorDef::GatherMerge { order } => next_input()?.gather_merge(to_order_spec(order)),
        OperatorDef::Broadcast => next_input()?.broadcast(),
        OperatorDef::Redistribute { keys } => {
            next_input()?.redistribute(HashedSpec::try_new(to_column_exprs(keys), true)?)
        }
    };
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{from_yaml_str, ScenarioSuite};
    use scatter::plan::explain_to_string;

    const SUITE: &str = r#"
tables:
  - name: t1
    columns:
      - name: a
        data_type: Int32
      - name: b
        data_type: Int32
    distribution:
      hash: [a]
cases:
  - name: aggregate over scan
    plan:
      op: aggregate
      stage: local
      group_by: [t1.b]
      aggr:
        - name: partial_cnt
          data_type: Int64
      inputs:
        - op: scan
          table: t1
  - name: join without inner
    plan:
      op: hash_join
      join_type: Inner
      outer_keys: [t1.a]
      inner_keys: [t1.b]
      inputs:
        - op: scan
          table: t1
  - name: unknown stage
    plan:
      op: aggregate
      stage: final
      group_by: []
      aggr: []
      inputs:
        - op: scan
          table: t1
"#;

    fn suite() -> (ScenarioSuite, Catalog) {
        let suite: ScenarioSuite = from_yaml_str(SUITE).unwrap();
        let catalog = Catalog::try_new(&suite.tables).unwrap();
        (suite, catalog)
    }

    #[test]
    fn test_convert_plan() {
        let (suite, catalog) = suite();
        let plan = to_physical_plan(&suite.cases[0].plan, &catalog).unwrap();

        let expected = "\
PhysicalAggregate { stage: Local, group_by: [t1.b], aggr: \"partial_cnt\" }
└─ PhysicalTableScan { table_name: \"t1\" }
";
        assert_eq!(expected, explain_to_string(&plan).unwrap());
    }

    #[test]
    fn test_input_count_checked() {
        let (suite, catalog) = suite();
        assert!(to_physical_plan(&suite.cases[1].plan, &catalog).is_err());
    }

    #[test]
    fn test_unknown_stage() {
        let (suite, catalog) = suite();
        let err = to_physical_plan(&suite.cases[2].plan, &catalog).unwrap_err();
        assert_eq!("unknown aggregate stage tag: \"final\"", err.to_string());
    }
}
