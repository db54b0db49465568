use std::collections::{BTreeMap, btree_map::Entry};
use std::sync::Arc;

use log::trace;
use ndarray::{Array2, ArrayD};

use super::record::Record;
use crate::error::{BnError, ConsistencyError, ShapeError};
use crate::model::TabularCpd;

/// CPDs keyed by the variable they belong to
pub type CpdMap = BTreeMap<String, Arc<TabularCpd>>;

/// Flatten an n-d probability array into a `variable_card x prod(evidence_card)`
/// table, reading elements in logical row-major order so that column `j` is the
/// `j`-th evidence combination with the last evidence axis changing fastest.
pub fn reshape_probabilities(
    values: &ArrayD<f64>,
    variable_card: usize,
    evidence_card: &[usize],
) -> Result<Array2<f64>, ShapeError> {
    if variable_card == 0 {
        return Err(ShapeError::NonPositiveCardinality {
            axis: 0,
            cardinality: 0,
        });
    }
    if let Some(axis) = evidence_card.iter().position(|&card| card == 0) {
        return Err(ShapeError::NonPositiveCardinality {
            axis: axis + 1,
            cardinality: 0,
        });
    }

    let columns: usize = evidence_card.iter().product();
    let elements = values.len();
    if variable_card.checked_mul(columns) != Some(elements) {
        return Err(ShapeError::IndivisibleShape {
            elements,
            variable_card,
            columns,
        });
    }

    let flat: Vec<f64> = values.iter().copied().collect();
    Array2::from_shape_vec((variable_card, columns), flat).map_err(|_| {
        ShapeError::IndivisibleShape {
            elements,
            variable_card,
            columns,
        }
    })
}

/// Turn one record's probability array into its CPD
pub fn build_cpd(record: &Record) -> Result<TabularCpd, ShapeError> {
    let probabilities = &record.probabilities;
    let (&variable_card, evidence_card) = probabilities
        .shape()
        .split_first()
        .ok_or(ShapeError::ZeroDimensions)?;

    if evidence_card.len() != record.parents.len() {
        return Err(ShapeError::ParentCountMismatch {
            parents: record.parents.len(),
            axes: evidence_card.len(),
        });
    }

    let scope: Vec<&String> = std::iter::once(&record.node)
        .chain(&record.parents)
        .collect();
    if let Some(axis_names) = probabilities.axis_names() {
        for (axis, (found, expected)) in axis_names.iter().zip(&scope).enumerate() {
            if !found.is_empty() && found != *expected {
                return Err(ShapeError::AxisNameMismatch {
                    axis,
                    expected: expected.to_string(),
                    found: found.clone(),
                });
            }
        }
    }

    let values = reshape_probabilities(probabilities.values(), variable_card, evidence_card)?;
    let cpd = TabularCpd::new(
        record.node.clone(),
        variable_card,
        values,
        record.parents.clone(),
        evidence_card.to_vec(),
    )?;

    match probabilities.state_names() {
        Some(states) => {
            let names = scope
                .iter()
                .map(|variable| variable.to_string())
                .zip(states.iter().cloned())
                .collect();
            cpd.with_state_names(names)
        }
        None => Ok(cpd),
    }
}

/// Build every record's CPD. A node name used by two records is rejected.
pub fn build_cpds(records: &[Record]) -> Result<CpdMap, BnError> {
    let mut cpds = CpdMap::new();
    for record in records {
        let cpd = build_cpd(record).map_err(|source| BnError::Shape {
            node: record.node.clone(),
            source,
        })?;
        trace!("built {}", cpd);
        match cpds.entry(record.node.clone()) {
            Entry::Occupied(_) => {
                return Err(ConsistencyError::DuplicateNode(record.node.clone()).into());
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(cpd));
            }
        }
    }
    Ok(cpds)
}
