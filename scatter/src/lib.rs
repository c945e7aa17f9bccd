//! ## Background
//!
//! A massively parallel processing (MPP) database spreads the rows of a table across many data
//! holding nodes, called segments, and executes one plan on all of them at once. Whether an
//! operator computes a correct result then depends on where its input rows live: a hash join
//! needs matching keys on the same segment, a final aggregate without grouping needs all rows on
//! one node. The optimizer tracks this as the *distribution* physical property, and inserts
//! motion operators (gather, broadcast, redistribute) where a child doesn't deliver what its
//! parent requires.
//!
//! This crate implements the distribution property algebra used by a cascades style optimizer
//! [1, 2], following the design of Orca [3]: distribution specs and their satisfaction rules,
//! per operator contracts (how many alternative optimization requests an operator offers, what
//! each request requires from every child, what the operator delivers), and enforcer
//! synthesis. A small top down search driver exercises the contracts end to end.
//!
//! ## Design
//!
//! * [`properties`] Distribution, order and rewindability properties, and their enforcers.
//! * [`operator`] Physical operators and their property contracts.
//! * [`plan`] Plan trees, builder and explain.
//! * [`search`] Memoized top down search over operator requests.
//! * [`optimizer`] Optimizer configuration and context.
//!
//! ## Reference
//!
//! 1. Graefe, G., 1995. The cascades framework for query optimization. IEEE Data Eng. Bull., 18(3),
//! pp.19-29.
//! 2. Columnbia Project, https://github.com/yongwen/columbia
//! 3. Soliman, M.A., Antova, L., Raghavan, V., El-Helw, A., Gu, Z., Shen, E., Caragea, G.C.,
//! Garcia-Alvarado, C., Rahman, F., Petropoulos, M. and Waas, F., 2014, June.  Orca: a modular
//! query optimizer architecture for big data. In Proceedings of the 2014 ACM SIGMOD
//! international  conference on Management of data (pp. 337-348).

#[macro_use]
extern crate lazy_static;

pub mod error;
pub mod operator;
pub mod optimizer;
pub mod plan;
pub mod properties;
pub mod search;
pub mod utils;

#[cfg(test)]
mod test_utils;
