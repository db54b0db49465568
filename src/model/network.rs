use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use log::{debug, trace, warn};

use super::cpd::TabularCpd;
use crate::error::ConsistencyError;

/// Discrete Bayesian network: a directed graph over named variables plus one
/// CPD per variable.
///
/// Building the graph never fails. Nodes reached only through `add_edge` are
/// remembered as undeclared, and [`BayesianNetwork::check_model`] is where
/// cycles, undeclared nodes and CPD mismatches are reported.
#[derive(Debug, Default, Clone)]
pub struct BayesianNetwork {
    /// storage, indexed by node id
    nodes: Vec<String>,
    index: HashMap<String, usize>,
    /// ids of declared nodes, in declaration order
    declared: Vec<usize>,
    is_declared: Vec<bool>,
    /// undeclared node -> the node whose edge introduced it
    undeclared: BTreeMap<String, String>,
    edges: Vec<(usize, usize)>,
    edge_set: HashSet<(usize, usize)>,
    parents: Vec<Vec<usize>>,
    children: Vec<Vec<usize>>,
    cpds: HashMap<String, Arc<TabularCpd>>,
}

impl BayesianNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a node. Returns false if it was already declared.
    pub fn add_node(&mut self, node: &str) -> bool {
        let id = match self.index.get(node) {
            Some(&id) if self.is_declared[id] => return false,
            Some(&id) => {
                self.undeclared.remove(node);
                id
            }
            None => self.insert_node(node),
        };
        self.is_declared[id] = true;
        self.declared.push(id);
        true
    }

    fn insert_node(&mut self, node: &str) -> usize {
        let id = self.nodes.len();
        self.nodes.push(node.to_string());
        self.index.insert(node.to_string(), id);
        self.is_declared.push(false);
        self.parents.push(Vec::new());
        self.children.push(Vec::new());
        id
    }

    /// Declared nodes in declaration order, then undeclared ones in the order
    /// edges introduced them
    fn ordered_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.declared.iter().copied().chain(
            (0..self.nodes.len()).filter(move |&id| !self.is_declared[id]),
        )
    }

    fn endpoint(&mut self, node: &str, referenced_by: &str) -> usize {
        match self.index.get(node) {
            Some(&id) => id,
            None => {
                trace!("'{}' introduced by an edge from '{}'", node, referenced_by);
                self.undeclared
                    .insert(node.to_string(), referenced_by.to_string());
                self.insert_node(node)
            }
        }
    }

    /// Add a directed edge. Returns false if the edge was already present.
    pub fn add_edge(&mut self, parent: &str, child: &str) -> bool {
        let from = self.endpoint(parent, child);
        let to = self.endpoint(child, parent);
        if !self.edge_set.insert((from, to)) {
            return false;
        }
        self.edges.push((from, to));
        self.parents[to].push(from);
        self.children[from].push(to);
        true
    }

    /// Declared nodes in the order they were declared, followed by any node
    /// only reached through an edge
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.ordered_ids().map(|id| self.nodes[id].as_str())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains_node(&self, node: &str) -> bool {
        self.index.contains_key(node)
    }

    /// All edges as (parent, child), in insertion order
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.edges
            .iter()
            .map(|&(from, to)| (self.nodes[from].as_str(), self.nodes[to].as_str()))
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn has_edge(&self, parent: &str, child: &str) -> bool {
        match (self.index.get(parent), self.index.get(child)) {
            (Some(&from), Some(&to)) => self.edge_set.contains(&(from, to)),
            _ => false,
        }
    }

    pub fn parents(&self, node: &str) -> Vec<&str> {
        self.neighbours(node, &self.parents)
    }

    pub fn children(&self, node: &str) -> Vec<&str> {
        self.neighbours(node, &self.children)
    }

    fn neighbours<'a>(&'a self, node: &str, adjacency: &'a [Vec<usize>]) -> Vec<&'a str> {
        self.index
            .get(node)
            .map(|&id| {
                adjacency[id]
                    .iter()
                    .map(|&n| self.nodes[n].as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Attach CPDs, replacing any CPD already attached to the same variable
    pub fn add_cpds<I>(&mut self, cpds: I) -> Result<(), ConsistencyError>
    where
        I: IntoIterator<Item = Arc<TabularCpd>>,
    {
        for cpd in cpds {
            let variable = cpd.variable().to_string();
            if !self.index.contains_key(&variable) {
                return Err(ConsistencyError::UnknownNode {
                    node: variable,
                    referenced_by: "CPD".to_string(),
                });
            }
            if self.cpds.insert(variable.clone(), cpd).is_some() {
                warn!("replacing CPD already attached to '{}'", variable);
            }
        }
        Ok(())
    }

    pub fn get_cpds(&self, node: &str) -> Option<&Arc<TabularCpd>> {
        self.cpds.get(node)
    }

    /// Attached CPDs in node order
    pub fn cpds(&self) -> impl Iterator<Item = &Arc<TabularCpd>> {
        self.nodes().filter_map(|node| self.cpds.get(node))
    }

    /// Nodes ordered so that every parent precedes its children. Among nodes
    /// that are ready at the same time, the one listed first by `nodes()` wins.
    pub fn topological_order(&self) -> Result<Vec<&str>, ConsistencyError> {
        let mut rank = vec![0; self.nodes.len()];
        for (position, id) in self.ordered_ids().enumerate() {
            rank[id] = position;
        }

        let mut in_degree: Vec<usize> = self.parents.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<(usize, usize)> = (0..self.nodes.len())
            .filter(|&id| in_degree[id] == 0)
            .map(|id| (rank[id], id))
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some((_, id)) = ready.pop_first() {
            order.push(self.nodes[id].as_str());
            for &child in &self.children[id] {
                in_degree[child] -= 1;
                if in_degree[child] == 0 {
                    ready.insert((rank[child], child));
                }
            }
        }

        if order.len() < self.nodes.len() {
            return Err(ConsistencyError::Cycle {
                nodes: self.find_cycle(&in_degree),
            });
        }
        Ok(order)
    }

    /// Every node left with a positive in-degree after the topological pass
    /// has a parent that is also left over, so walking parents from any of
    /// them must revisit a node.
    fn find_cycle(&self, in_degree: &[usize]) -> Vec<String> {
        let Some(start) = self.ordered_ids().find(|&id| in_degree[id] > 0) else {
            return Vec::new();
        };

        let mut path = vec![start];
        let mut seen = HashMap::from([(start, 0usize)]);
        let mut current = start;
        loop {
            let Some(&parent) = self.parents[current]
                .iter()
                .find(|&&p| in_degree[p] > 0)
            else {
                break;
            };
            if let Some(&position) = seen.get(&parent) {
                // path runs child -> parent; report it parent -> child
                let mut cycle: Vec<String> = path[position..]
                    .iter()
                    .rev()
                    .map(|&id| self.nodes[id].clone())
                    .collect();
                cycle.push(self.nodes[path[path.len() - 1]].clone());
                return cycle;
            }
            seen.insert(parent, path.len());
            path.push(parent);
            current = parent;
        }

        path.iter().map(|&id| self.nodes[id].clone()).collect()
    }

    /// Verify the model:
    /// - every node was declared (no dangling edge endpoints),
    /// - the graph is acyclic,
    /// - every node has a CPD whose evidence equals its graph parents,
    /// - evidence cardinalities agree with the parents' own CPDs,
    /// - every CPD column sums to 1 within `tolerance`.
    pub fn check_model(&self, tolerance: f64) -> Result<(), ConsistencyError> {
        if let Some((node, referenced_by)) = self.undeclared.iter().next() {
            return Err(ConsistencyError::UnknownNode {
                node: node.clone(),
                referenced_by: referenced_by.clone(),
            });
        }

        self.topological_order()?;

        for id in self.ordered_ids() {
            let node = &self.nodes[id];
            let cpd = self
                .cpds
                .get(node)
                .ok_or_else(|| ConsistencyError::MissingCpd { node: node.clone() })?;

            for evidence in cpd.evidence() {
                if !self.index.contains_key(evidence) {
                    return Err(ConsistencyError::UnknownNode {
                        node: evidence.clone(),
                        referenced_by: node.clone(),
                    });
                }
            }

            let graph_parents: BTreeSet<&str> = self.parents(node).into_iter().collect();
            let cpd_evidence: BTreeSet<&str> = cpd.evidence().iter().map(String::as_str).collect();
            if graph_parents != cpd_evidence || cpd_evidence.len() != cpd.evidence().len() {
                return Err(ConsistencyError::ParentMismatch {
                    node: node.clone(),
                    graph_parents: graph_parents.into_iter().map(str::to_string).collect(),
                    cpd_evidence: cpd.evidence().to_vec(),
                });
            }

            for (parent, &found) in cpd.evidence().iter().zip(cpd.evidence_card()) {
                let Some(parent_cpd) = self.cpds.get(parent) else {
                    return Err(ConsistencyError::MissingCpd {
                        node: parent.clone(),
                    });
                };
                if parent_cpd.variable_card() != found {
                    return Err(ConsistencyError::CardinalityMismatch {
                        node: node.clone(),
                        parent: parent.clone(),
                        expected: parent_cpd.variable_card(),
                        found,
                    });
                }
            }

            if let Some((column, sum)) = cpd.first_unnormalized_column(tolerance) {
                return Err(ConsistencyError::NotNormalized {
                    node: node.clone(),
                    column,
                    sum,
                });
            }
        }

        debug!(
            "model check passed: {} nodes, {} edges",
            self.nodes.len(),
            self.edges.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn root(name: &str) -> Arc<TabularCpd> {
        Arc::new(TabularCpd::new(name, 2, array![[0.4], [0.6]], vec![], vec![]).unwrap())
    }

    fn child(name: &str, parent: &str, card: usize) -> Arc<TabularCpd> {
        let values = ndarray::Array2::from_elem((2, card), 0.5);
        Arc::new(
            TabularCpd::new(name, 2, values, vec![parent.to_string()], vec![card]).unwrap(),
        )
    }

    fn chain() -> BayesianNetwork {
        let mut network = BayesianNetwork::new();
        network.add_node("a");
        network.add_node("b");
        network.add_edge("a", "b");
        network
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let mut network = chain();
        assert!(!network.add_edge("a", "b"));
        assert_eq!(network.edge_count(), 1);
        assert_eq!(network.parents("b"), vec!["a"]);
        assert_eq!(network.children("a"), vec!["b"]);
        assert!(network.has_edge("a", "b"));
        assert!(!network.has_edge("b", "a"));
    }

    #[test]
    fn test_valid_model_passes() {
        let mut network = chain();
        network.add_cpds([root("a"), child("b", "a", 2)]).unwrap();
        network.check_model(1e-6).unwrap();
        assert_eq!(network.topological_order().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_forward_reference_is_declared_later() {
        let mut network = BayesianNetwork::new();
        network.add_node("a");
        network.add_edge("a", "b");
        assert!(network.add_node("b"));
        network.add_cpds([root("a"), child("b", "a", 2)]).unwrap();
        network.check_model(1e-6).unwrap();
        assert_eq!(network.node_count(), 2);
    }

    #[test]
    fn test_nodes_keep_declaration_order() {
        let mut network = BayesianNetwork::new();
        network.add_node("a");
        network.add_edge("a", "c");
        network.add_edge("a", "ghost");
        network.add_node("b");
        network.add_node("c");
        assert!(!network.add_node("c"));

        assert_eq!(network.nodes().collect::<Vec<_>>(), vec!["a", "b", "c", "ghost"]);
        assert_eq!(network.topological_order().unwrap(), vec!["a", "b", "c", "ghost"]);

        network
            .add_cpds([root("c"), root("b"), root("a")])
            .unwrap();
        let order: Vec<&str> = network.cpds().map(|cpd| cpd.variable()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_undeclared_endpoint_fails() {
        let mut network = BayesianNetwork::new();
        network.add_node("a");
        network.add_edge("a", "ghost");
        assert_eq!(
            network.check_model(1e-6).unwrap_err(),
            ConsistencyError::UnknownNode {
                node: "ghost".to_string(),
                referenced_by: "a".to_string(),
            }
        );
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut network = BayesianNetwork::new();
        for node in ["a", "b", "c"] {
            network.add_node(node);
        }
        network.add_edge("a", "b");
        network.add_edge("b", "c");
        network.add_edge("c", "a");

        match network.check_model(1e-6).unwrap_err() {
            ConsistencyError::Cycle { nodes } => {
                assert_eq!(nodes.len(), 4);
                assert_eq!(nodes.first(), nodes.last());
                for pair in nodes.windows(2) {
                    assert!(network.has_edge(&pair[0], &pair[1]));
                }
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_cpd() {
        let mut network = chain();
        network.add_cpds([root("a")]).unwrap();
        assert_eq!(
            network.check_model(1e-6).unwrap_err(),
            ConsistencyError::MissingCpd {
                node: "b".to_string()
            }
        );
    }

    #[test]
    fn test_parent_mismatch() {
        let mut network = BayesianNetwork::new();
        network.add_node("a");
        network.add_node("b");
        network.add_cpds([root("a"), child("b", "a", 2)]).unwrap();
        assert!(matches!(
            network.check_model(1e-6).unwrap_err(),
            ConsistencyError::ParentMismatch { node, .. } if node == "b"
        ));
    }

    #[test]
    fn test_cardinality_mismatch() {
        let mut network = chain();
        network.add_cpds([root("a"), child("b", "a", 3)]).unwrap();
        assert_eq!(
            network.check_model(1e-6).unwrap_err(),
            ConsistencyError::CardinalityMismatch {
                node: "b".to_string(),
                parent: "a".to_string(),
                expected: 2,
                found: 3,
            }
        );
    }

    #[test]
    fn test_unnormalized_column() {
        let mut network = BayesianNetwork::new();
        network.add_node("a");
        let skewed = TabularCpd::new("a", 2, array![[0.4], [0.5]], vec![], vec![]).unwrap();
        network.add_cpds([Arc::new(skewed)]).unwrap();
        assert!(matches!(
            network.check_model(1e-6).unwrap_err(),
            ConsistencyError::NotNormalized { column: 0, .. }
        ));
        network.check_model(0.2).unwrap();
    }

    #[test]
    fn test_cpd_for_unknown_variable_rejected() {
        let mut network = chain();
        assert!(matches!(
            network.add_cpds([root("zzz")]).unwrap_err(),
            ConsistencyError::UnknownNode { node, .. } if node == "zzz"
        ));
    }
}
