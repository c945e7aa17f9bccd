//! Loads optimization scenarios written in YAML into scatter plans.
//!
//! A scenario describes distributed tables, a physical plan without motions and the properties
//! required at its root. See [`scenario`] for the file format.
pub mod catalog;
pub mod conversion;
pub mod scenario;
