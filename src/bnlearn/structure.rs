use log::debug;

use super::record::Record;
use crate::model::BayesianNetwork;

/// Build the graph: one node per record in file order, then an edge from the
/// record's node to each of its declared children.
///
/// Repeated edges collapse into one. Children that never get a record of their
/// own stay undeclared and are rejected later by the model check, as are
/// cycles.
pub fn build_structure(records: &[Record]) -> BayesianNetwork {
    let mut network = BayesianNetwork::new();
    for record in records {
        if !network.add_node(&record.node) {
            debug!("node '{}' declared by more than one record", record.node);
        }
        for child in &record.children {
            network.add_edge(&record.node, child);
        }
    }
    debug!(
        "structure has {} nodes and {} edges",
        network.node_count(),
        network.edge_count()
    );
    network
}
