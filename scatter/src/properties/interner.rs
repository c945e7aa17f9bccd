use std::collections::HashSet;

use crate::properties::DistributionSpecRef;

/// Canonicalizes structurally equal distribution specs to one shared instance, so that most
/// [`matches`](crate::properties::DistributionSpec::matches) calls end at pointer equality.
#[derive(Debug, Default)]
pub struct SpecInterner {
    specs: HashSet<DistributionSpecRef>,
}

impl SpecInterner {
    pub fn intern(&mut self, spec: DistributionSpecRef) -> DistributionSpecRef {
        if let Some(existing) = self.specs.get(&spec) {
            return existing.clone();
        }
        self.specs.insert(spec.clone());
        spec
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
