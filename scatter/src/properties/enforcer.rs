//! Operators added on top of a plan node so that its output meets a requirement.
//!
//! A distribution gap is closed by one motion, chosen by the required distribution. An order gap
//! is closed by a sort, and a rewindability gap by a spool. Several candidate chains may be
//! returned, the search driver ranks them.
use log::debug;
use smallvec::{smallvec, SmallVec};

use crate::error::{InvariantViolation, ScatterResult};
use crate::operator::{Broadcast, Gather, GatherMerge, PhysicalOperator, Redistribute, Sort, Spool};
use crate::optimizer::OptimizerConfig;
use crate::properties::{
    DistributionSpec, EnforcementDecision, EnforcementDecisions, PhysicalProp,
    PhysicalPropertySet, RequiredPropertySet, Rewindability, SingletonLocation,
};

/// An enforcer operator and the properties it delivers.
#[derive(Clone, Debug, PartialEq)]
pub struct Enforcer {
    operator: PhysicalOperator,
    output_prop: PhysicalPropertySet,
}

impl Enforcer {
    pub fn new<O: Into<PhysicalOperator>>(operator: O, output_prop: PhysicalPropertySet) -> Self {
        Self {
            operator: operator.into(),
            output_prop,
        }
    }

    pub fn operator(&self) -> &PhysicalOperator {
        &self.operator
    }

    pub fn output_prop(&self) -> &PhysicalPropertySet {
        &self.output_prop
    }
}

/// Enforcers applied bottom up.
pub type EnforcerChain = SmallVec<[Enforcer; 3]>;

fn chain_output<'a>(chain: &'a EnforcerChain, input: &'a PhysicalPropertySet) -> &'a PhysicalPropertySet {
    chain.last().map_or(input, |e| e.output_prop())
}

/// Candidate motions making `input` meet the required distribution. An empty list means the
/// requirement can't be met, and a single empty chain means no motion is needed.
pub fn distribution_enforcers(
    required: &RequiredPropertySet,
    input: &PhysicalPropertySet,
    config: &OptimizerConfig,
) -> ScatterResult<Vec<EnforcerChain>> {
    let requirement = required.distribution();
    if requirement.is_fulfilled_by(input.distribution()) {
        return Ok(vec![EnforcerChain::new()]);
    }

    let spec = requirement.spec();
    let chains = match spec.as_ref() {
        DistributionSpec::Singleton(location) => {
            if !config.enable_gather {
                debug!("Gather disabled, {} can't be enforced", spec);
                return Ok(vec![]);
            }

            let gather = Enforcer::new(
                Gather::new(*location),
                PhysicalPropertySet::new(spec.clone()),
            );
            let mut chains = vec![smallvec![gather]];

            let order = required.order();
            if *location == SingletonLocation::Master
                && !order.is_empty()
                && config.enable_gather_merge
            {
                let mut merge = EnforcerChain::new();
                if !input.order().satisfies(order) {
                    merge.push(Enforcer::new(
                        Sort::new(order.clone()),
                        PhysicalPropertySet::new(input.distribution().clone())
                            .with_order(order.clone())
                            .with_rewindability(Rewindability::Rewindable),
                    ));
                }
                merge.push(Enforcer::new(
                    GatherMerge::new(order.clone()),
                    PhysicalPropertySet::new(spec.clone()).with_order(order.clone()),
                ));
                chains.push(merge);
            }
            chains
        }
        DistributionSpec::Hashed(hashed) => {
            let hashed = hashed.clone().without_equivalent();
            vec![smallvec![Enforcer::new(
                Redistribute::new(hashed.clone()),
                PhysicalPropertySet::new(DistributionSpec::hashed(hashed)),
            )]]
        }
        DistributionSpec::Replicated => vec![smallvec![Enforcer::new(
            Broadcast,
            PhysicalPropertySet::new(DistributionSpec::replicated()),
        )]],
        other => return Err(InvariantViolation::NotRequirable(other.distribution_type()).into()),
    };
    Ok(chains)
}

/// Builds every enforcer chain closing the gap between `derived` and `required`, following the
/// enforcement decisions of the node that delivered `derived`.
pub fn enforcer_chains(
    required: &RequiredPropertySet,
    derived: &PhysicalPropertySet,
    decisions: &EnforcementDecisions,
    config: &OptimizerConfig,
) -> ScatterResult<Vec<EnforcerChain>> {
    let mut chains = match decisions.distribution {
        EnforcementDecision::Unnecessary => vec![EnforcerChain::new()],
        _ => distribution_enforcers(required, derived, config)?,
    };

    for chain in &mut chains {
        let current = chain_output(chain, derived).clone();
        if !current.order().satisfies(required.order()) {
            chain.push(Enforcer::new(
                Sort::new(required.order().clone()),
                PhysicalPropertySet::new(current.distribution().clone())
                    .with_order(required.order().clone())
                    .with_rewindability(Rewindability::Rewindable),
            ));
        }

        let current = chain_output(chain, derived).clone();
        if required.rewindability() == Rewindability::Rewindable
            && (decisions.rewindability == EnforcementDecision::Required
                || !current.rewindability().satisfies(&Rewindability::Rewindable))
        {
            chain.push(Enforcer::new(
                Spool,
                current.with_rewindability(Rewindability::Rewindable),
            ));
        }
    }

    Ok(chains)
}
