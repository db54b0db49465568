use std::fmt;

use crate::error::ShapeError;

/// The flavour of a decoded pairlist-shaped object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairListKind {
    List,
    Language,
    Closure,
    Promise,
    Dots,
}

/// One cell of a pairlist: an optional tag and the value held in the CAR
#[derive(Debug, Clone, PartialEq)]
pub struct PairNode {
    pub tag: Option<String>,
    pub value: RObject,
}

/// Payload of a decoded R object
#[derive(Debug, Clone, PartialEq)]
pub enum RValue {
    Null,
    Symbol(String),
    /// A single CHARSXP; `None` is `NA_character_`
    Char(Option<String>),
    Logical(Vec<Option<bool>>),
    Integer(Vec<Option<i32>>),
    /// Doubles, with NA decoded as NaN
    Real(Vec<f64>),
    Complex(Vec<[f64; 2]>),
    String(Vec<Option<String>>),
    List(Vec<RObject>),
    Expression(Vec<RObject>),
    Raw(Vec<u8>),
    PairList {
        kind: PairListKind,
        nodes: Vec<PairNode>,
    },
    Builtin(String),
    /// Environments are not materialised, only acknowledged
    Environment,
    ExternalPointer,
    WeakReference,
    S4,
    /// Missing argument and unbound value markers
    Missing,
}

/// Decoded R object: a payload plus its attribute pairlist
#[derive(Debug, Clone, PartialEq)]
pub struct RObject {
    pub value: RValue,
    pub attributes: Vec<(String, RObject)>,
    pub is_object: bool,
}

impl From<RValue> for RObject {
    fn from(value: RValue) -> Self {
        RObject::new(value)
    }
}

impl RObject {
    /// Create an object without attributes
    pub fn new(value: RValue) -> Self {
        Self {
            value,
            attributes: Vec::new(),
            is_object: false,
        }
    }

    pub fn null() -> Self {
        Self::new(RValue::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.value, RValue::Null)
    }

    /// The name R's `typeof()` reports for this object
    pub fn type_name(&self) -> &'static str {
        match &self.value {
            RValue::Null => "NULL",
            RValue::Symbol(_) => "symbol",
            RValue::Char(_) => "char",
            RValue::Logical(_) => "logical",
            RValue::Integer(_) => "integer",
            RValue::Real(_) => "double",
            RValue::Complex(_) => "complex",
            RValue::String(_) => "character",
            RValue::List(_) => "list",
            RValue::Expression(_) => "expression",
            RValue::Raw(_) => "raw",
            RValue::PairList { kind, .. } => match kind {
                PairListKind::List => "pairlist",
                PairListKind::Language => "language",
                PairListKind::Closure => "closure",
                PairListKind::Promise => "promise",
                PairListKind::Dots => "...",
            },
            RValue::Builtin(_) => "builtin",
            RValue::Environment => "environment",
            RValue::ExternalPointer => "externalptr",
            RValue::WeakReference => "weakref",
            RValue::S4 => "S4",
            RValue::Missing => "missing",
        }
    }

    /// Number of elements for vector types, 0 for NULL and 1 for scalars-like objects
    pub fn len(&self) -> usize {
        match &self.value {
            RValue::Null => 0,
            RValue::Logical(v) => v.len(),
            RValue::Integer(v) => v.len(),
            RValue::Real(v) => v.len(),
            RValue::Complex(v) => v.len(),
            RValue::String(v) => v.len(),
            RValue::List(v) | RValue::Expression(v) => v.len(),
            RValue::Raw(v) => v.len(),
            RValue::PairList { nodes, .. } => nodes.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up an attribute by name
    pub fn attribute(&self, name: &str) -> Option<&RObject> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// The `names` attribute, with NA names rendered as empty strings
    pub fn names(&self) -> Option<Vec<String>> {
        match &self.attribute("names")?.value {
            RValue::String(names) => Some(
                names
                    .iter()
                    .map(|name| name.clone().unwrap_or_default())
                    .collect(),
            ),
            _ => None,
        }
    }

    /// The `class` attribute, empty when absent
    pub fn class(&self) -> Vec<String> {
        self.attribute("class")
            .and_then(|class| class.as_strings())
            .unwrap_or_default()
    }

    pub fn inherits(&self, class: &str) -> bool {
        self.class().iter().any(|c| c == class)
    }

    /// The `dim` attribute as cardinalities; `Ok(None)` when there is none
    pub fn dim(&self) -> Result<Option<Vec<usize>>, ShapeError> {
        let Some(dim) = self.attribute("dim") else {
            return Ok(None);
        };
        let invalid = |axis: usize, value: String| ShapeError::InvalidDim { axis, value };
        let dims = match &dim.value {
            RValue::Integer(values) => values
                .iter()
                .enumerate()
                .map(|(axis, v)| match v {
                    Some(d) => usize::try_from(*d).map_err(|_| invalid(axis, d.to_string())),
                    None => Err(invalid(axis, "NA".to_string())),
                })
                .collect::<Result<Vec<_>, _>>()?,
            RValue::Real(values) => values
                .iter()
                .enumerate()
                .map(|(axis, &v)| {
                    if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= usize::MAX as f64 {
                        Ok(v as usize)
                    } else if v.is_nan() {
                        Err(invalid(axis, "NA".to_string()))
                    } else {
                        Err(invalid(axis, v.to_string()))
                    }
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(invalid(0, format!("a {}", dim.type_name()))),
        };
        Ok(Some(dims))
    }

    /// Character vector contents, or `None` if this is not a character vector
    /// or any element is NA
    pub fn as_strings(&self) -> Option<Vec<String>> {
        match &self.value {
            RValue::String(values) => values.iter().cloned().collect(),
            RValue::Char(value) => value.clone().map(|s| vec![s]),
            _ => None,
        }
    }

    /// Numeric contents as doubles; integer and logical NA become NaN
    pub fn as_f64_vec(&self) -> Option<Vec<f64>> {
        match &self.value {
            RValue::Real(values) => Some(values.clone()),
            RValue::Integer(values) => Some(
                values
                    .iter()
                    .map(|v| v.map_or(f64::NAN, f64::from))
                    .collect(),
            ),
            RValue::Logical(values) => Some(
                values
                    .iter()
                    .map(|v| v.map_or(f64::NAN, |b| if b { 1.0 } else { 0.0 }))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Elements of a generic vector (`list`)
    pub fn as_list(&self) -> Option<&[RObject]> {
        match &self.value {
            RValue::List(elements) => Some(elements),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match &self.value {
            RValue::Symbol(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for RObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = self.class();
        if class.is_empty() {
            write!(f, "<{} of length {}>", self.type_name(), self.len())
        } else {
            write!(
                f,
                "<{} of length {}, class {}>",
                self.type_name(),
                self.len(),
                class.join("/")
            )
        }
    }
}
