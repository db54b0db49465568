use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{cpd::TabularCpd, network::BayesianNetwork};

/// Serializable snapshot of a CPD
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpdDocument {
    pub variable: String,
    pub variable_card: usize,
    pub evidence: Vec<String>,
    pub evidence_card: Vec<usize>,
    /// One inner vector per state of `variable`
    pub values: Vec<Vec<f64>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub state_names: BTreeMap<String, Vec<String>>,
}

impl From<&TabularCpd> for CpdDocument {
    fn from(cpd: &TabularCpd) -> Self {
        Self {
            variable: cpd.variable().to_string(),
            variable_card: cpd.variable_card(),
            evidence: cpd.evidence().to_vec(),
            evidence_card: cpd.evidence_card().to_vec(),
            values: cpd.values().rows().into_iter().map(|row| row.to_vec()).collect(),
            state_names: cpd.all_state_names().clone(),
        }
    }
}

/// Serializable snapshot of a whole network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDocument {
    pub nodes: Vec<String>,
    pub edges: Vec<(String, String)>,
    pub cpds: Vec<CpdDocument>,
}

impl BayesianNetwork {
    pub fn to_document(&self) -> ModelDocument {
        ModelDocument {
            nodes: self.nodes().map(str::to_string).collect(),
            edges: self
                .edges()
                .into_iter()
                .map(|(parent, child)| (parent.to_string(), child.to_string()))
                .collect(),
            cpds: self.cpds().map(|cpd| CpdDocument::from(cpd.as_ref())).collect(),
        }
    }

    /// Pretty-printed JSON form of [`BayesianNetwork::to_document`]
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.to_document())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::sync::Arc;

    #[test]
    fn test_document_round_trips_through_json() {
        let mut network = BayesianNetwork::new();
        network.add_node("smoke");
        network.add_node("lung");
        network.add_edge("smoke", "lung");
        let smoke = TabularCpd::new("smoke", 2, array![[0.5], [0.5]], vec![], vec![])
            .unwrap()
            .with_state_names(BTreeMap::from([(
                "smoke".to_string(),
                vec!["yes".to_string(), "no".to_string()],
            )]))
            .unwrap();
        let lung = TabularCpd::new(
            "lung",
            2,
            array![[0.1, 0.01], [0.9, 0.99]],
            vec!["smoke".to_string()],
            vec![2],
        )
        .unwrap();
        network.add_cpds([Arc::new(smoke), Arc::new(lung)]).unwrap();

        let json = network.to_json().unwrap();
        let document: ModelDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(document, network.to_document());
        assert_eq!(document.edges, vec![("smoke".to_string(), "lung".to_string())]);
        assert_eq!(document.cpds[1].values, vec![vec![0.1, 0.01], vec![0.9, 0.99]]);
        assert!(document.cpds[1].state_names.is_empty());
        assert!(!json.contains("\"state_names\": {}"));
    }
}
