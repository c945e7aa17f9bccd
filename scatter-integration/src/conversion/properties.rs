use scatter::error::ScatterResult;
use scatter::properties::{
    DistributionRequirement, DistributionSpec, DistributionSpecRef, HashedSpec,
    RequiredPropertySet, Rewindability,
};

use crate::conversion::{to_column_exprs, to_order_spec};
use crate::scenario::{RequiredDef, RequiredDistributionDef};

fn to_distribution_spec(def: &RequiredDistributionDef) -> ScatterResult<DistributionSpecRef> {
    Ok(match def {
        RequiredDistributionDef::Any => DistributionSpec::any(),
        RequiredDistributionDef::Singleton(location) => DistributionSpec::singleton(*location),
        RequiredDistributionDef::Replicated => DistributionSpec::replicated(),
        RequiredDistributionDef::Hashed {
            keys,
            nulls_colocated,
            duplicate_sensitive,
        } => {
            let spec = HashedSpec::try_new(to_column_exprs(keys), *nulls_colocated)?;
            DistributionSpec::hashed(if *duplicate_sensitive {
                spec.with_duplicate_sensitive()
            } else {
                spec
            })
        }
    })
}

/// Properties required at the root of a scenario plan.
pub fn to_required_props(def: &RequiredDef) -> ScatterResult<RequiredPropertySet> {
    let rewindability = if def.rewindable {
        Rewindability::Rewindable
    } else {
        Rewindability::NotRewindable
    };

    Ok(RequiredPropertySet::new(DistributionRequirement::new(
        to_distribution_spec(&def.distribution)?,
    ))
    .with_order(to_order_spec(&def.order))
    .with_rewindability(rewindability))
}
