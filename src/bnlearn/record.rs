use std::path::Path;

use log::{debug, trace};
use ndarray::{ArrayD, IxDyn, ShapeBuilder};

use crate::error::{BnError, RdsError, ShapeError};
use crate::rds::{RObject, RValue, read_rds_file};

/// Positions of the fields inside one bnlearn node object
const NODE_FIELD: usize = 0;
const PARENTS_FIELD: usize = 1;
const CHILDREN_FIELD: usize = 2;
const PROBABILITY_FIELD: usize = 3;

/// Node classes that carry regression coefficients instead of a table
const CONTINUOUS_CLASSES: [&str; 2] = ["bn.fit.gnode", "bn.fit.cgnode"];

/// A node's probability array with the labels R attached to its axes
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityArray {
    values: ArrayD<f64>,
    axis_names: Option<Vec<String>>,
    state_names: Option<Vec<Vec<String>>>,
}

impl ProbabilityArray {
    pub fn new(values: ArrayD<f64>) -> Self {
        Self {
            values,
            axis_names: None,
            state_names: None,
        }
    }

    /// Interpret an R buffer, which stores arrays with the first index
    /// changing fastest, as an array of shape `dims`.
    pub fn from_column_major(data: Vec<f64>, dims: &[usize]) -> Result<Self, ndarray::ShapeError> {
        let values = ArrayD::from_shape_vec(IxDyn(dims).f(), data)?;
        Ok(Self::new(values))
    }

    pub fn with_axis_names(mut self, names: Vec<String>) -> Self {
        self.axis_names = Some(names);
        self
    }

    pub fn with_state_names(mut self, names: Vec<Vec<String>>) -> Self {
        self.state_names = Some(names);
        self
    }

    pub fn values(&self) -> &ArrayD<f64> {
        &self.values
    }

    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    /// Variable labelling each axis, when the table's `dimnames` were named
    pub fn axis_names(&self) -> Option<&[String]> {
        self.axis_names.as_deref()
    }

    /// State labels for each axis, when every axis had them
    pub fn state_names(&self) -> Option<&[Vec<String>]> {
        self.state_names.as_deref()
    }
}

/// One network variable as stored by bnlearn
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub node: String,
    pub parents: Vec<String>,
    pub children: Vec<String>,
    pub probabilities: ProbabilityArray,
}

impl Record {
    /// Read the positional node layout: name, parents, children, probabilities.
    ///
    /// Layout violations are format errors naming `index`; a `dim` that does
    /// not describe a table is a shape error naming the node.
    pub fn from_object(index: usize, object: &RObject) -> Result<Record, BnError> {
        let layout = |reason: String| BnError::Format(RdsError::Layout { index, reason });

        if let Some(class) = CONTINUOUS_CLASSES.iter().find(|c| object.inherits(c)) {
            return Err(layout(format!(
                "continuous node of class {class} has no probability table"
            )));
        }

        let fields = object
            .as_list()
            .ok_or_else(|| layout(format!("expected a list, found {object}")))?;
        if fields.len() <= PROBABILITY_FIELD {
            return Err(layout(format!(
                "expected at least {} fields, found {}",
                PROBABILITY_FIELD + 1,
                fields.len()
            )));
        }

        let names =
            string_field(&fields[NODE_FIELD]).map_err(|r| layout(format!("node name {r}")))?;
        let node = match names.as_slice() {
            [name] => name.clone(),
            names => {
                return Err(layout(format!(
                    "node name must be a single string, found {} values",
                    names.len()
                )));
            }
        };
        let parents = string_field(&fields[PARENTS_FIELD])
            .map_err(|r| layout(format!("parents of '{node}' {r}")))?;
        let children = string_field(&fields[CHILDREN_FIELD])
            .map_err(|r| layout(format!("children of '{node}' {r}")))?;
        let probabilities = probability_array(&fields[PROBABILITY_FIELD]).map_err(|e| match e {
            ArrayError::Layout(r) => layout(format!("probabilities of '{node}' {r}")),
            ArrayError::Shape(source) => BnError::Shape {
                node: node.clone(),
                source,
            },
        })?;

        trace!(
            "record {}: {} parents={:?} children={:?} shape={:?}",
            index,
            node,
            parents,
            children,
            probabilities.shape()
        );

        Ok(Record {
            node,
            parents,
            children,
            probabilities,
        })
    }
}

fn string_field(object: &RObject) -> Result<Vec<String>, String> {
    match &object.value {
        RValue::Null => Ok(Vec::new()),
        RValue::String(_) | RValue::Char(_) => object
            .as_strings()
            .ok_or_else(|| "contain NA".to_string()),
        _ => Err(format!("must be a character vector, found {object}")),
    }
}

enum ArrayError {
    Layout(String),
    Shape(ShapeError),
}

fn probability_array(object: &RObject) -> Result<ProbabilityArray, ArrayError> {
    let data = object
        .as_f64_vec()
        .ok_or_else(|| ArrayError::Layout(format!("must be numeric, found {object}")))?;
    // only a missing dim means a plain vector
    let dims = object
        .dim()
        .map_err(ArrayError::Shape)?
        .unwrap_or_else(|| vec![data.len()]);
    let expected = dims
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| ArrayError::Shape(ShapeError::DimOverflow { dims: dims.clone() }))?;
    if expected != data.len() {
        return Err(ArrayError::Layout(format!(
            "have {} values but dim {:?} needs {}",
            data.len(),
            dims,
            expected
        )));
    }

    let mut array = ProbabilityArray::from_column_major(data, &dims)
        .map_err(|e| ArrayError::Layout(e.to_string()))?;

    if let Some(dimnames) = object.attribute("dimnames") {
        if let Some(axes) = dimnames.as_list() {
            if let Some(names) = dimnames.names() {
                array = array.with_axis_names(names);
            }
            let states: Option<Vec<Vec<String>>> = axes.iter().map(RObject::as_strings).collect();
            if let Some(states) = states.filter(|s| s.len() == dims.len()) {
                array = array.with_state_names(states);
            }
        }
    }

    Ok(array)
}

/// The network list of a decoded bnlearn model, converted to [`Record`]s on demand
#[derive(Debug, Clone)]
pub struct Records {
    root: RObject,
}

impl Records {
    pub fn from_object(root: RObject) -> Result<Self, RdsError> {
        if root.as_list().is_none() {
            return Err(RdsError::Malformed(format!(
                "expected a list of nodes at the top level, found {root}"
            )));
        }
        if !root.inherits("bn.fit") {
            debug!("top-level object has class {:?}, not bn.fit", root.class());
        }
        Ok(Self { root })
    }

    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Iterate over records in file order; each one is validated as it is reached
    pub fn iter(&self) -> RecordIter<'_> {
        RecordIter {
            elements: self.root.as_list().unwrap_or_default().iter().enumerate(),
        }
    }
}

pub struct RecordIter<'a> {
    elements: std::iter::Enumerate<std::slice::Iter<'a, RObject>>,
}

impl Iterator for RecordIter<'_> {
    type Item = Result<Record, BnError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, object) = self.elements.next()?;
        Some(Record::from_object(index, object))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.elements.size_hint()
    }
}

impl<'a> IntoIterator for &'a Records {
    type Item = Result<Record, BnError>;
    type IntoIter = RecordIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Decode an RDS file and expose its network list as records
pub fn load_records(path: impl AsRef<Path>) -> Result<Records, BnError> {
    let root = read_rds_file(path)?;
    let records = Records::from_object(root)?;
    debug!("network list holds {} records", records.len());
    Ok(records)
}
