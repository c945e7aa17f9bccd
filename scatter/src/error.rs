use thiserror::Error;

use crate::properties::DistributionType;

pub type ScatterResult<T> = anyhow::Result<T>;
pub type DFResult<T> = datafusion_common::Result<T>;

/// Broken contract between the search driver and an operator.
///
/// These never describe a user-correctable condition: a well formed plan can't produce them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("request index {request_index} out of range, {operator} declares {request_count} requests")]
    RequestIndexOutOfRange {
        operator: String,
        request_index: usize,
        request_count: usize,
    },
    #[error("child index {child_index} out of range, {operator} has {arity} inputs")]
    ChildIndexOutOfRange {
        operator: String,
        child_index: usize,
        arity: usize,
    },
    #[error("unknown aggregate stage tag: {0:?}")]
    UnknownAggregateStage(String),
    #[error("distribution {0} can't be enforced")]
    NotRequirable(DistributionType),
    #[error("distribution of sibling child {0} is not derived yet")]
    MissingSiblingDistribution(usize),
    #[error("hashed distribution needs at least one key expression")]
    EmptyHashedKeys,
    #[error("delivered hashed distribution {0} can't be matched through join keys")]
    HashedMatchingFailed(String),
    #[error("distinct columns {distinct:?} are not a trailing subsequence of grouping columns {group:?}")]
    MalformedIntermediateAggregate { group: Vec<String>, distinct: Vec<String> },
    #[error("{operator} has no distribution requirement for {found} distribution of child {child_index}")]
    UnexpectedChildDistribution {
        operator: String,
        child_index: usize,
        found: DistributionType,
    },
}

#[derive(Error, Debug)]
pub enum ScatterError {
    #[error("no viable plan satisfies required properties {0}")]
    NoViablePlan(String),
}
