//! Error types for bnlearn2rs.
//!
//! Every stage of the conversion reports through [`BnError`]. Decoder failures
//! and record-layout violations are [`RdsError`]s, malformed probability
//! arrays are [`ShapeError`]s and structural or statistical problems found by
//! the model check are [`ConsistencyError`]s.

use thiserror::Error;

/// Top-level error returned by `load_model` and `fetch_model`.
#[derive(Debug, Error)]
pub enum BnError {
    /// The model file could not be opened or read.
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The file was read but is not a decodable RDS object with the bnlearn layout.
    #[error("format error: {0}")]
    Format(#[from] RdsError),

    /// The repository host could not be reached or the transfer failed.
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The repository answered with a non-2xx status.
    #[error("network error fetching {url}: HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    /// A model name that cannot be turned into a repository URL.
    #[error("invalid model name: {0:?}")]
    InvalidModelName(String),

    /// A probability array could not be turned into a CPD.
    #[error("malformed probability table for '{node}': {source}")]
    Shape {
        node: String,
        #[source]
        source: ShapeError,
    },

    /// The assembled model failed its consistency check.
    #[error("model consistency error: {0}")]
    Consistency(#[from] ConsistencyError),
}

impl BnError {
    /// True for failures reaching or talking to the repository host.
    pub fn is_network(&self) -> bool {
        matches!(self, BnError::Network { .. } | BnError::HttpStatus { .. })
    }

    /// True for unreadable files and undecodable content.
    pub fn is_io(&self) -> bool {
        matches!(self, BnError::Io { .. } | BnError::Format(_))
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        BnError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Errors raised while decoding the R serialization stream.
#[derive(Debug, Error)]
pub enum RdsError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected end of stream")]
    UnexpectedEof,

    #[error("unsupported compression: {0}")]
    UnsupportedCompression(&'static str),

    #[error("unsupported serialization format: {0}")]
    UnsupportedFormat(String),

    #[error("unsupported serialization version {0}")]
    UnsupportedVersion(i32),

    #[error("unsupported R object type: {0}")]
    UnsupportedType(String),

    #[error("reference index {0} is not in the reference table")]
    InvalidReference(usize),

    #[error("invalid vector length {0}")]
    InvalidLength(i64),

    #[error("malformed stream: {0}")]
    Malformed(String),

    /// A record of the network list does not follow the bnlearn node layout.
    #[error("record {index}: {reason}")]
    Layout { index: usize, reason: String },
}

/// Errors raised while reshaping a probability array into a table.
#[derive(Debug, Error, PartialEq)]
pub enum ShapeError {
    #[error("probability array has no dimensions")]
    ZeroDimensions,

    #[error("axis {axis} has non-positive cardinality {cardinality}")]
    NonPositiveCardinality { axis: usize, cardinality: usize },

    /// A `dim` entry that is NA, negative, fractional or not a number at all
    #[error("dim entry {axis} is {value}, not a cardinality")]
    InvalidDim { axis: usize, value: String },

    #[error("dim {dims:?} holds more elements than can be addressed")]
    DimOverflow { dims: Vec<usize> },

    #[error("{parents} parents declared but the array has {axes} evidence axes")]
    ParentCountMismatch { parents: usize, axes: usize },

    #[error("axis {axis} is labelled '{found}' but '{expected}' was expected")]
    AxisNameMismatch {
        axis: usize,
        expected: String,
        found: String,
    },

    #[error("{elements} elements cannot be reshaped into {variable_card} x {columns}")]
    IndivisibleShape {
        elements: usize,
        variable_card: usize,
        columns: usize,
    },

    #[error("table is {found:?} but {expected:?} was expected")]
    TableShape {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("{evidence} evidence variables but {cards} evidence cardinalities")]
    EvidenceLength { evidence: usize, cards: usize },

    #[error("'{variable}' has {found} state names but cardinality {expected}")]
    StateNames {
        variable: String,
        expected: usize,
        found: usize,
    },

    #[error("state names given for '{0}', which is not in the table scope")]
    UnknownStateVariable(String),
}

/// A failed model check, naming the invariant that does not hold.
#[derive(Debug, Error, PartialEq)]
pub enum ConsistencyError {
    #[error("node '{node}' is referenced by '{referenced_by}' but never declared")]
    UnknownNode { node: String, referenced_by: String },

    #[error("node '{0}' is declared more than once")]
    DuplicateNode(String),

    #[error("graph contains a cycle: {}", .nodes.join(" -> "))]
    Cycle { nodes: Vec<String> },

    #[error("no CPD attached to node '{node}'")]
    MissingCpd { node: String },

    #[error("CPD of '{node}' conditions on {cpd_evidence:?} but the graph parents are {graph_parents:?}")]
    ParentMismatch {
        node: String,
        graph_parents: Vec<String>,
        cpd_evidence: Vec<String>,
    },

    #[error("CPD of '{node}' gives parent '{parent}' cardinality {found}, but its own CPD has {expected}")]
    CardinalityMismatch {
        node: String,
        parent: String,
        expected: usize,
        found: usize,
    },

    #[error("column {column} of the CPD of '{node}' sums to {sum}")]
    NotNormalized {
        node: String,
        column: usize,
        sum: f64,
    },
}
