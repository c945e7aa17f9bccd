use std::collections::{HashMap, HashSet};
use std::fmt::Formatter;
use std::str::FromStr;

use datafusion_common::{Column, DFField, DFSchema};
use itertools::Itertools;
use strum_macros::{AsRefStr, EnumString};

use crate::error::{InvariantViolation, ScatterResult};
use crate::operator::{
    display_list, DerivePropContext, DisplayFields, EnforcePropContext, OperatorTrait,
    PhysicalOperatorTrait, PlanContext, RequiredPropContext,
};
use crate::plan::PlanNodeRef;
use crate::properties::rewrite::{maximal_hashed_or_master, restrict_to_output};
use crate::properties::{
    DistributionMatching, DistributionRequirement, DistributionSpec, DistributionSpecRef,
    EnforcementDecision, LogicalProperty, SingletonLocation,
};

const CHILD: usize = 0;

/// Stage of a multi-stage aggregation.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum AggregateStage {
    /// Computes final results, or the only stage.
    Global,
    /// Computes partial results next to the data.
    Local,
    /// Combines partial results of a distinct aggregate.
    Intermediate,
}

impl AggregateStage {
    pub fn from_tag(tag: &str) -> ScatterResult<Self> {
        AggregateStage::from_str(tag)
            .map_err(|_| InvariantViolation::UnknownAggregateStage(tag.to_string()).into())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Aggregate {
    stage: AggregateStage,
    group_columns: Vec<Column>,
    /// Grouping columns left after removing the ones functionally dependent on others.
    minimal_group_columns: Vec<Column>,
    /// Arguments of distinct aggregate functions.
    distinct_columns: Vec<Column>,
    aggr_fields: Vec<DFField>,
}

impl Aggregate {
    pub fn try_new(
        stage: AggregateStage,
        group_columns: Vec<Column>,
        distinct_columns: Vec<Column>,
        aggr_fields: Vec<DFField>,
    ) -> ScatterResult<Self> {
        if stage == AggregateStage::Intermediate
            && !distinct_columns.is_empty()
            && !group_columns.ends_with(&distinct_columns)
        {
            return Err(InvariantViolation::MalformedIntermediateAggregate {
                group: group_columns.iter().map(|c| c.flat_name()).collect(),
                distinct: distinct_columns.iter().map(|c| c.flat_name()).collect(),
            }
            .into());
        }

        Ok(Self {
            stage,
            group_columns,
            minimal_group_columns: vec![],
            distinct_columns,
            aggr_fields,
        })
    }

    pub fn with_minimal_group_columns(mut self, columns: Vec<Column>) -> Self {
        self.minimal_group_columns = columns;
        self
    }

    pub fn stage(&self) -> AggregateStage {
        self.stage
    }

    pub fn group_columns(&self) -> &[Column] {
        &self.group_columns
    }

    pub fn distinct_columns(&self) -> &[Column] {
        &self.distinct_columns
    }

    fn hash_key_columns(&self) -> &[Column] {
        if self.minimal_group_columns.is_empty() {
            &self.group_columns
        } else {
            &self.minimal_group_columns
        }
    }

    fn child_has_volatile_function(&self, context: &PlanContext) -> ScatterResult<bool> {
        Ok(context.input_logical_prop(CHILD)?.has_volatile_function())
    }

    fn maximal_hashed(
        &self,
        context: &RequiredPropContext,
        columns: &[Column],
    ) -> ScatterResult<DistributionRequirement> {
        let schema = context.plan.input_logical_prop(CHILD)?.schema();
        Ok(DistributionRequirement::with_matching(
            maximal_hashed_or_master(columns, schema)?,
            DistributionMatching::Subset,
        ))
    }

    fn required_global(&self, context: &RequiredPropContext) -> ScatterResult<DistributionRequirement> {
        if self.group_columns.is_empty() {
            let required = context.required_distribution();
            return Ok(if required.as_singleton().is_some() {
                DistributionRequirement::new(required.clone())
            } else {
                DistributionRequirement::new(DistributionSpec::singleton(SingletonLocation::Master))
            });
        }

        if context.request_index == 0 && self.child_has_volatile_function(&context.plan)? {
            return Ok(DistributionRequirement::new(DistributionSpec::singleton(
                SingletonLocation::Master,
            )));
        }

        self.maximal_hashed(context, self.hash_key_columns())
    }

    fn required_local(&self, context: &RequiredPropContext) -> ScatterResult<DistributionRequirement> {
        if !self.distinct_columns.is_empty() {
            return self.maximal_hashed(context, &self.distinct_columns);
        }

        Ok(match context.request_index {
            0 => DistributionRequirement::any(),
            _ => DistributionRequirement::new(DistributionSpec::random()),
        })
    }

    fn required_intermediate(
        &self,
        context: &RequiredPropContext,
    ) -> ScatterResult<DistributionRequirement> {
        match context.request_index {
            0 => self.maximal_hashed(context, &self.group_columns),
            _ => {
                let kept = self.group_columns.len() - self.distinct_columns.len();
                self.maximal_hashed(context, &self.group_columns[..kept])
            }
        }
    }
}

impl PhysicalOperatorTrait for Aggregate {
    fn distribution_request_count(&self, context: &PlanContext) -> ScatterResult<usize> {
        Ok(match self.stage {
            AggregateStage::Global => {
                if !self.group_columns.is_empty() && self.child_has_volatile_function(context)? {
                    2
                } else {
                    1
                }
            }
            AggregateStage::Local => {
                if self.distinct_columns.is_empty() {
                    2
                } else {
                    1
                }
            }
            AggregateStage::Intermediate => {
                if self.distinct_columns.len() == self.group_columns.len() {
                    1
                } else {
                    2
                }
            }
        })
    }

    fn required_distribution(
        &self,
        context: &RequiredPropContext,
    ) -> ScatterResult<DistributionRequirement> {
        match self.stage {
            AggregateStage::Global => self.required_global(context),
            AggregateStage::Local => self.required_local(context),
            AggregateStage::Intermediate => self.required_intermediate(context),
        }
    }

    fn derive_distribution(&self, context: &DerivePropContext) -> ScatterResult<DistributionSpecRef> {
        let output: HashSet<Column> = self.group_columns.iter().cloned().collect();
        Ok(restrict_to_output(context.child(CHILD)?.distribution(), &output))
    }

    fn distribution_enforcement(
        &self,
        context: &EnforcePropContext,
        required: &DistributionRequirement,
    ) -> EnforcementDecision {
        if required.is_fulfilled_by(context.derived.distribution()) {
            return EnforcementDecision::Unnecessary;
        }

        let on_one_node = context.children.get(CHILD).map_or(false, |child| {
            child.distribution().as_singleton().is_some() || child.distribution().is_universal()
        });
        if self.stage != AggregateStage::Global && on_one_node {
            EnforcementDecision::Prohibited
        } else {
            EnforcementDecision::Required
        }
    }
}

impl OperatorTrait for Aggregate {
    fn derive_logical_prop(&self, inputs: &[PlanNodeRef]) -> ScatterResult<LogicalProperty> {
        let input = inputs
            .get(CHILD)
            .and_then(|i| i.logical_prop())
            .ok_or_else(|| anyhow::anyhow!("Aggregate needs an input with derived logical property"))?;

        let mut fields = self
            .group_columns
            .iter()
            .map(|c| input.schema().field_from_column(c).cloned())
            .collect::<Result<Vec<DFField>, _>>()?;
        fields.extend(self.aggr_fields.iter().cloned());

        let outer_references: HashSet<Column> = input.outer_references().clone();
        Ok(
            LogicalProperty::new(DFSchema::new_with_metadata(fields, HashMap::new())?)
                .with_outer_references(outer_references)
                .with_volatile_function(input.has_volatile_function()),
        )
    }
}

impl DisplayFields for Aggregate {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("");
        s.field("stage", &self.stage)
            .field("group_by", &display_list(&self.group_columns));
        if !self.distinct_columns.is_empty() {
            s.field("distinct", &display_list(&self.distinct_columns));
        }
        s.field(
            "aggr",
            &self.aggr_fields.iter().map(|f| f.name()).join(", "),
        );
        s.finish()
    }
}
