use derive_more::{Add, AddAssign, Sum};

/// Ranks alternatives of the same subtree: fewer motions first, then fewer enforcers.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Add, AddAssign, Sum)]
pub struct PlanRank {
    motions: usize,
    enforcers: usize,
}

impl PlanRank {
    pub fn new(motions: usize, enforcers: usize) -> Self {
        Self { motions, enforcers }
    }

    pub fn motions(&self) -> usize {
        self.motions
    }

    pub fn enforcers(&self) -> usize {
        self.enforcers
    }
}
