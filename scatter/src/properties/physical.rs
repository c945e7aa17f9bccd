use std::fmt::{Display, Formatter};

use strum_macros::AsRefStr;

use crate::properties::{
    DistributionMatching, DistributionSpec, DistributionSpecRef, OrderSpec, PhysicalProp,
    Rewindability,
};

/// Physical properties delivered by a plan node.
#[derive(Hash, Debug, Clone, Eq, PartialEq)]
pub struct PhysicalPropertySet {
    distribution: DistributionSpecRef,
    order: OrderSpec,
    rewindability: Rewindability,
}

impl PhysicalPropertySet {
    pub fn new(distribution: DistributionSpecRef) -> Self {
        Self {
            distribution,
            order: OrderSpec::default(),
            rewindability: Rewindability::NotRewindable,
        }
    }

    pub fn with_order(mut self, order: OrderSpec) -> Self {
        self.order = order;
        self
    }

    pub fn with_rewindability(mut self, rewindability: Rewindability) -> Self {
        self.rewindability = rewindability;
        self
    }

    pub fn distribution(&self) -> &DistributionSpecRef {
        &self.distribution
    }

    pub fn order(&self) -> &OrderSpec {
        &self.order
    }

    pub fn rewindability(&self) -> Rewindability {
        self.rewindability
    }
}

impl Display for PhysicalPropertySet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.distribution)?;
        if !self.order.is_empty() {
            write!(f, " order {}", self.order)?;
        }
        if self.rewindability == Rewindability::Rewindable {
            write!(f, " rewindable")?;
        }
        Ok(())
    }
}

/// A required distribution and how the delivered one is compared with it.
#[derive(Hash, Debug, Clone, Eq, PartialEq)]
pub struct DistributionRequirement {
    spec: DistributionSpecRef,
    matching: DistributionMatching,
}

impl DistributionRequirement {
    pub fn new(spec: DistributionSpecRef) -> Self {
        Self::with_matching(spec, DistributionMatching::Satisfy)
    }

    pub fn with_matching(spec: DistributionSpecRef, matching: DistributionMatching) -> Self {
        Self { spec, matching }
    }

    pub fn any() -> Self {
        Self::new(DistributionSpec::any())
    }

    pub fn spec(&self) -> &DistributionSpecRef {
        &self.spec
    }

    pub fn matching(&self) -> DistributionMatching {
        self.matching
    }

    pub fn is_fulfilled_by(&self, derived: &DistributionSpec) -> bool {
        derived.fulfils(&self.spec, self.matching)
    }

    /// Same spec under the same matching mode.
    pub fn matches(&self, other: &DistributionRequirement) -> bool {
        self.matching == other.matching && self.spec.matches(&other.spec)
    }
}

impl Display for DistributionRequirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.spec)?;
        if self.matching != DistributionMatching::Satisfy {
            write!(f, " ({})", self.matching.as_ref())?;
        }
        Ok(())
    }
}

/// Physical properties a parent requires from a child.
#[derive(Hash, Debug, Clone, Eq, PartialEq)]
pub struct RequiredPropertySet {
    distribution: DistributionRequirement,
    order: OrderSpec,
    rewindability: Rewindability,
}

impl Default for RequiredPropertySet {
    fn default() -> Self {
        Self::new(DistributionRequirement::any())
    }
}

impl RequiredPropertySet {
    pub fn new(distribution: DistributionRequirement) -> Self {
        Self {
            distribution,
            order: OrderSpec::default(),
            rewindability: Rewindability::NotRewindable,
        }
    }

    pub fn with_order(mut self, order: OrderSpec) -> Self {
        self.order = order;
        self
    }

    pub fn with_rewindability(mut self, rewindability: Rewindability) -> Self {
        self.rewindability = rewindability;
        self
    }

    pub fn distribution(&self) -> &DistributionRequirement {
        &self.distribution
    }

    pub fn order(&self) -> &OrderSpec {
        &self.order
    }

    pub fn rewindability(&self) -> Rewindability {
        self.rewindability
    }

    pub fn is_satisfied_by(&self, derived: &PhysicalPropertySet) -> bool {
        self.distribution.is_fulfilled_by(derived.distribution())
            && derived.order().satisfies(&self.order)
            && derived.rewindability().satisfies(&self.rewindability)
    }

    /// Used to skip optimization requests identical to earlier ones.
    pub fn matches(&self, other: &RequiredPropertySet) -> bool {
        self.distribution.matches(&other.distribution)
            && self.order == other.order
            && self.rewindability == other.rewindability
    }
}

impl Display for RequiredPropertySet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.distribution)?;
        if !self.order.is_empty() {
            write!(f, " order {}", self.order)?;
        }
        if self.rewindability == Rewindability::Rewindable {
            write!(f, " rewindable")?;
        }
        Ok(())
    }
}

/// Whether an operator lets a property be enforced on its output.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, AsRefStr)]
pub enum EnforcementDecision {
    /// The operator already delivers the property.
    Unnecessary,
    /// An enforcer must be added on top of the operator.
    Required,
    /// The plan alternative is not viable.
    Prohibited,
}

impl EnforcementDecision {
    pub fn from_satisfied(satisfied: bool) -> Self {
        if satisfied {
            EnforcementDecision::Unnecessary
        } else {
            EnforcementDecision::Required
        }
    }
}

/// Decisions for every enforceable property of one plan node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EnforcementDecisions {
    pub distribution: EnforcementDecision,
    pub order: EnforcementDecision,
    pub rewindability: EnforcementDecision,
}

impl EnforcementDecisions {
    pub fn is_prohibited(&self) -> bool {
        [self.distribution, self.order, self.rewindability]
            .contains(&EnforcementDecision::Prohibited)
    }
}
