//! Convert fitted bnlearn networks saved as R `.rds` files into discrete
//! Bayesian networks with tabular CPDs.
//!
//! ```no_run
//! let (model, cpds) = bnlearn2rs::load_model("asia.rds")?;
//! for (parent, child) in model.edges() {
//!     println!("{parent} -> {child}");
//! }
//! println!("{}", cpds["dysp"]);
//! # Ok::<(), bnlearn2rs::BnError>(())
//! ```

#[macro_use]
pub mod common;
pub mod bnlearn;
pub mod error;
pub mod model;
pub mod rds;

pub use bnlearn::{CpdMap, Loader, assemble, fetch_model, load_model};
pub use common::LoaderConfig;
pub use error::{BnError, ConsistencyError, RdsError, ShapeError};
pub use model::{BayesianNetwork, ModelDocument, TabularCpd};
