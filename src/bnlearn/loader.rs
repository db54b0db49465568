use std::path::Path;

use log::{info, trace};

use super::fetch::download;
use super::record::{Record, load_records};
use super::structure::build_structure;
use super::tables::{CpdMap, build_cpds};
use crate::common::config::LoaderConfig;
use crate::error::{BnError, ConsistencyError};
use crate::model::BayesianNetwork;

/// Attach the CPDs to the graph and run the model check
pub fn assemble(
    mut network: BayesianNetwork,
    cpds: &CpdMap,
    tolerance: f64,
) -> Result<BayesianNetwork, ConsistencyError> {
    network.add_cpds(cpds.values().cloned())?;
    network.check_model(tolerance)?;
    Ok(network)
}

/// Converts bnlearn RDS models using one [`LoaderConfig`]
#[derive(Debug, Clone, Default)]
pub struct Loader {
    config: LoaderConfig,
}

impl Loader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Read a local `.rds` file into a checked network and its CPDs
    pub fn load_model(&self, path: impl AsRef<Path>) -> Result<(BayesianNetwork, CpdMap), BnError> {
        let path = path.as_ref();
        info!("loading {}", path.display());

        let records = load_records(path)?
            .iter()
            .collect::<Result<Vec<Record>, _>>()?;
        trace!("decoded {} records", records.len());

        let network = build_structure(&records);
        let cpds = build_cpds(&records)?;
        let model = assemble(network, &cpds, self.config.tolerance)?;

        info!(
            "{}: {} nodes, {} edges",
            path.display(),
            model.node_count(),
            model.edge_count()
        );
        Ok((model, cpds))
    }

    /// Download `name` from the repository and load it
    pub fn fetch_model(&self, name: &str) -> Result<(BayesianNetwork, CpdMap), BnError> {
        let file = download(&self.config, name)?;
        self.load_model(file.path())
    }
}

/// [`Loader::load_model`] with configuration from the environment
pub fn load_model(path: impl AsRef<Path>) -> Result<(BayesianNetwork, CpdMap), BnError> {
    Loader::new(LoaderConfig::from_env()).load_model(path)
}

/// [`Loader::fetch_model`] with configuration from the environment
pub fn fetch_model(name: &str) -> Result<(BayesianNetwork, CpdMap), BnError> {
    Loader::new(LoaderConfig::from_env()).fetch_model(name)
}
