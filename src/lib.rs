//! Embedded stratified-Datalog evaluation engine.
//!
//! The pipeline has three stages:
//!
//! 1. [`compiler`] lowers a stratified Datalog program ([`datalog`]) into an
//!    imperative intermediate representation ([`ram`]): nested scan loops,
//!    projections and control statements, one block per stratum, following
//!    the semi-naive evaluation strategy.
//! 2. [`boxing`] compresses heterogeneous runtime values ([`value`]) into
//!    dense 64-bit integers. A union-find pass ([`unify`]) proves which
//!    "slots" of the compiled program share a representation, so every slot
//!    class gets one boxing table.
//! 3. [`eval`] executes the RAM program against the backing tuple store
//!    ([`store`]) until every stratum reaches its fixpoint.
//!
//! [`engine::Solver`] ties the stages together and decodes the final model.

pub mod boxing;
pub mod compiler;
pub mod datalog;
pub mod engine;
pub mod eval;
pub mod lattice;
pub mod metrics;
pub mod ram;
pub mod store;
pub mod symbol;
pub mod trace;
pub mod unify;
pub mod value;

#[cfg(test)]
pub(crate) mod test_utils;
