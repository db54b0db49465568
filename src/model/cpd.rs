use std::collections::BTreeMap;
use std::fmt;

use ndarray::{Array1, Array2, ArrayD, Axis, IxDyn};

use crate::error::ShapeError;

/// Conditional probability table of one discrete variable.
///
/// `values` has one row per state of the variable and one column per joint
/// state of the evidence variables. Columns enumerate evidence states in
/// row-major order: the last evidence variable changes fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularCpd {
    variable: String,
    variable_card: usize,
    values: Array2<f64>,
    evidence: Vec<String>,
    evidence_card: Vec<usize>,
    state_names: BTreeMap<String, Vec<String>>,
}

impl TabularCpd {
    /// Create a CPD, checking that the table matches the declared cardinalities
    pub fn new(
        variable: impl Into<String>,
        variable_card: usize,
        values: Array2<f64>,
        evidence: Vec<String>,
        evidence_card: Vec<usize>,
    ) -> Result<Self, ShapeError> {
        if evidence.len() != evidence_card.len() {
            return Err(ShapeError::EvidenceLength {
                evidence: evidence.len(),
                cards: evidence_card.len(),
            });
        }
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

        let expected = (variable_card, evidence_card.iter().product());
        if values.dim() != expected {
            return Err(ShapeError::TableShape {
                expected,
                found: values.dim(),
            });
        }

        Ok(Self {
            variable: variable.into(),
            variable_card,
            values,
            evidence,
            evidence_card,
            state_names: BTreeMap::new(),
        })
    }

    /// Attach state names for any variable in the table's scope
    pub fn with_state_names(
        mut self,
        state_names: BTreeMap<String, Vec<String>>,
    ) -> Result<Self, ShapeError> {
        for (variable, names) in &state_names {
            let expected = self
                .cardinality_of(variable)
                .ok_or_else(|| ShapeError::UnknownStateVariable(variable.clone()))?;
            if names.len() != expected {
                return Err(ShapeError::StateNames {
                    variable: variable.clone(),
                    expected,
                    found: names.len(),
                });
            }
        }
        self.state_names = state_names;
        Ok(self)
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn variable_card(&self) -> usize {
        self.variable_card
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn evidence(&self) -> &[String] {
        &self.evidence
    }

    pub fn evidence_card(&self) -> &[usize] {
        &self.evidence_card
    }

    pub fn column_count(&self) -> usize {
        self.values.ncols()
    }

    /// State names of `variable`, if the source table carried them
    pub fn state_names(&self, variable: &str) -> Option<&[String]> {
        self.state_names.get(variable).map(Vec::as_slice)
    }

    pub fn all_state_names(&self) -> &BTreeMap<String, Vec<String>> {
        &self.state_names
    }

    /// Cardinality of the variable or one of its evidence variables
    pub fn cardinality_of(&self, variable: &str) -> Option<usize> {
        if variable == self.variable {
            return Some(self.variable_card);
        }
        self.evidence
            .iter()
            .position(|e| e == variable)
            .map(|i| self.evidence_card[i])
    }

    /// Column holding the distribution for one joint evidence assignment
    pub fn column_for(&self, evidence_states: &[usize]) -> Option<usize> {
        if evidence_states.len() != self.evidence_card.len() {
            return None;
        }
        evidence_states
            .iter()
            .zip(&self.evidence_card)
            .try_fold(0usize, |column, (&state, &card)| {
                (state < card).then_some(column * card + state)
            })
    }

    /// P(variable = state | evidence = evidence_states)
    pub fn probability(&self, state: usize, evidence_states: &[usize]) -> Option<f64> {
        let column = self.column_for(evidence_states)?;
        self.values.get((state, column)).copied()
    }

    pub fn column_sums(&self) -> Array1<f64> {
        self.values.sum_axis(Axis(0))
    }

    /// First column whose sum strays from 1 by more than `tolerance`
    pub fn first_unnormalized_column(&self, tolerance: f64) -> Option<(usize, f64)> {
        self.column_sums()
            .iter()
            .enumerate()
            .find(|(_, sum)| !((*sum - 1.0).abs() <= tolerance))
            .map(|(column, sum)| (column, *sum))
    }

    /// The table as an n-d array of shape `[variable_card, evidence_card...]`
    pub fn to_array(&self) -> Result<ArrayD<f64>, ShapeError> {
        let mut shape = Vec::with_capacity(self.evidence_card.len() + 1);
        shape.push(self.variable_card);
        shape.extend_from_slice(&self.evidence_card);
        let flat: Vec<f64> = self.values.iter().copied().collect();
        ArrayD::from_shape_vec(IxDyn(&shape), flat).map_err(|_| ShapeError::IndivisibleShape {
            elements: self.values.len(),
            variable_card: self.variable_card,
            columns: self.column_count(),
        })
    }
}

impl fmt::Display for TabularCpd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.evidence.is_empty() {
            write!(f, "P({}) [{} x 1]", self.variable, self.variable_card)
        } else {
            write!(
                f,
                "P({} | {}) [{} x {}]",
                self.variable,
                self.evidence.join(", "),
                self.variable_card,
                self.column_count()
            )
        }
    }
}
