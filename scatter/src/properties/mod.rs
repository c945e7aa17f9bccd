//! Properties of plan nodes.
//!
//! There are two kinds of properties: [`LogicalProperty`] and [`PhysicalPropertySet`]. Logical
//! properties are shared by logically equivalent plans, such as schema and outer references.
//! Physical properties describe how the output is delivered: distribution across segments,
//! sort order and rewindability. Requirements on them are [`RequiredPropertySet`]s, and
//! [`enforcer`] builds the operators closing the gap between what a child delivers and what its
//! parent requires.

use std::fmt::Debug;
use std::hash::Hash;

mod distribution;
pub use distribution::*;
mod order;
pub use order::*;
mod rewindability;
pub use rewindability::*;
mod logical;
pub use logical::*;
mod physical;
pub use physical::*;
pub mod enforcer;
mod interner;
pub use interner::*;
pub mod rewrite;

pub trait PhysicalProp: Debug + Hash {
    /// Tests whether self satisfies `other`.
    fn satisfies(&self, other: &Self) -> bool;
}
