//! Conversion of bnlearn `bn.fit` objects into [`crate::model::BayesianNetwork`]s.
//!
//! The stages run in order: [`load_records`] decodes the file, [`build_structure`]
//! and [`build_cpds`] turn records into a graph and tables, and [`assemble`]
//! attaches one to the other and checks the result.

pub mod fetch;
pub mod loader;
pub mod record;
pub mod structure;
pub mod tables;

pub use fetch::{download, model_url};
pub use loader::{Loader, assemble, fetch_model, load_model};
pub use record::{ProbabilityArray, Record, Records, load_records};
pub use structure::build_structure;
pub use tables::{CpdMap, build_cpd, build_cpds, reshape_probabilities};
