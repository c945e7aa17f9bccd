use strum_macros::AsRefStr;

use crate::properties::PhysicalProp;

/// Whether the output can be scanned again without re-executing the subtree.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Default, AsRefStr)]
pub enum Rewindability {
    Rewindable,
    #[default]
    NotRewindable,
}

impl PhysicalProp for Rewindability {
    fn satisfies(&self, other: &Self) -> bool {
        *self == Rewindability::Rewindable || *other == Rewindability::NotRewindable
    }
}
