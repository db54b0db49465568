//! In-memory Bayesian network model: graph, CPDs and the consistency check.

pub mod cpd;
pub mod export;
pub mod network;

pub use cpd::TabularCpd;
pub use export::{CpdDocument, ModelDocument};
pub use network::BayesianNetwork;
