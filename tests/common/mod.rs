#![allow(dead_code)]

//! Builds bnlearn-shaped RDS files in XDR format for the integration tests.

use flate2::{Compression, write::GzEncoder};
use std::collections::HashMap;
use std::io::Write;
use tempfile::NamedTempFile;

const NILVALUE: i32 = 254;
const REFSXP: i32 = 255;
const SYMSXP: i32 = 1;
const LISTSXP: i32 = 2;
const CHARSXP: i32 = 9;
const INTSXP: i32 = 13;
const REALSXP: i32 = 14;
const STRSXP: i32 = 16;
const VECSXP: i32 = 19;

const IS_OBJECT: i32 = 1 << 8;
const HAS_ATTR: i32 = 1 << 9;
const HAS_TAG: i32 = 1 << 10;
const UTF8_LEVELS: i32 = 8 << 12;

/// Just enough of R's object model to describe a fitted network
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Str(Vec<String>),
    Int(Vec<i32>),
    Real(Vec<f64>),
    List(Vec<Sexp>),
}

#[derive(Debug, Clone)]
pub struct Sexp {
    pub value: Value,
    pub attributes: Vec<(String, Sexp)>,
}

impl Sexp {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            attributes: Vec::new(),
        }
    }

    pub fn strings(values: &[&str]) -> Self {
        Self::new(Value::Str(values.iter().map(|s| s.to_string()).collect()))
    }

    pub fn attr(mut self, name: &str, value: Sexp) -> Self {
        self.attributes.push((name.to_string(), value));
        self
    }

    fn is_object(&self) -> bool {
        self.attributes.iter().any(|(name, _)| name == "class")
    }
}

pub struct Encoder {
    bytes: Vec<u8>,
    symbols: HashMap<String, i32>,
    next_ref: i32,
}

impl Encoder {
    pub fn new(version: i32) -> Self {
        let mut encoder = Encoder {
            bytes: b"X\n".to_vec(),
            symbols: HashMap::new(),
            next_ref: 1,
        };
        encoder.int(version).int(0x040300);
        if version == 3 {
            encoder.int(0x030500).int(5);
            encoder.bytes.extend_from_slice(b"UTF-8");
        } else {
            encoder.int(0x020300);
        }
        encoder
    }

    fn int(&mut self, value: i32) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    fn chars(&mut self, value: &str) {
        self.int(CHARSXP | UTF8_LEVELS).int(value.len() as i32);
        self.bytes.extend_from_slice(value.as_bytes());
    }

    fn symbol(&mut self, name: &str) {
        if let Some(&index) = self.symbols.get(name) {
            self.int((index << 8) | REFSXP);
            return;
        }
        self.int(SYMSXP);
        self.chars(name);
        self.symbols.insert(name.to_string(), self.next_ref);
        self.next_ref += 1;
    }

    pub fn write(&mut self, sexp: &Sexp) {
        let mut flags = match &sexp.value {
            Value::Null => {
                self.int(NILVALUE);
                return;
            }
            Value::Str(_) => STRSXP,
            Value::Int(_) => INTSXP,
            Value::Real(_) => REALSXP,
            Value::List(_) => VECSXP,
        };
        if sexp.is_object() {
            flags |= IS_OBJECT;
        }
        if !sexp.attributes.is_empty() {
            flags |= HAS_ATTR;
        }
        self.int(flags);

        match &sexp.value {
            Value::Null => {}
            Value::Str(values) => {
                self.int(values.len() as i32);
                for value in values {
                    self.chars(value);
                }
            }
            Value::Int(values) => {
                self.int(values.len() as i32);
                for &value in values {
                    self.int(value);
                }
            }
            Value::Real(values) => {
                self.int(values.len() as i32);
                for value in values {
                    self.bytes.extend_from_slice(&value.to_be_bytes());
                }
            }
            Value::List(items) => {
                self.int(items.len() as i32);
                for item in items {
                    self.write(item);
                }
            }
        }

        if !sexp.attributes.is_empty() {
            for (name, value) in &sexp.attributes {
                self.int(LISTSXP | HAS_TAG);
                self.symbol(name);
                self.write(value);
            }
            self.int(NILVALUE);
        }
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

pub fn encode(root: &Sexp, version: i32) -> Vec<u8> {
    let mut encoder = Encoder::new(version);
    encoder.write(root);
    encoder.finish()
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

pub fn rds_file(bytes: &[u8]) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".rds").tempfile().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

/// One discrete node; `probabilities` is in R's column-major order
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub name: &'static str,
    pub parents: Vec<&'static str>,
    pub children: Vec<&'static str>,
    pub states: Vec<&'static str>,
    pub probabilities: Vec<f64>,
}

impl NodeSpec {
    pub fn new(
        name: &'static str,
        parents: &[&'static str],
        children: &[&'static str],
        probabilities: &[f64],
    ) -> Self {
        Self {
            name,
            parents: parents.to_vec(),
            children: children.to_vec(),
            states: vec!["yes", "no"],
            probabilities: probabilities.to_vec(),
        }
    }
}

fn states_of<'a>(specs: &'a [NodeSpec], name: &str) -> &'a [&'static str] {
    specs
        .iter()
        .find(|s| s.name == name)
        .map(|s| s.states.as_slice())
        .unwrap_or(&["yes", "no"][..])
}

fn probability_table(spec: &NodeSpec, specs: &[NodeSpec]) -> Sexp {
    let scope: Vec<&str> = std::iter::once(spec.name)
        .chain(spec.parents.iter().copied())
        .collect();
    let levels: Vec<&[&str]> = scope.iter().map(|n| states_of(specs, n)).collect();
    let dims: Vec<i32> = levels.iter().map(|l| l.len() as i32).collect();

    let dimnames = Sexp::new(Value::List(
        levels.iter().map(|l| Sexp::strings(l)).collect(),
    ))
    .attr("names", Sexp::strings(&scope));

    Sexp::new(Value::Real(spec.probabilities.clone()))
        .attr("dim", Sexp::new(Value::Int(dims)))
        .attr("dimnames", dimnames)
        .attr("class", Sexp::strings(&["table"]))
}

pub fn node_object(spec: &NodeSpec, specs: &[NodeSpec]) -> Sexp {
    let parents = if spec.parents.is_empty() {
        Sexp::new(Value::Str(Vec::new()))
    } else {
        Sexp::strings(&spec.parents)
    };
    Sexp::new(Value::List(vec![
        Sexp::strings(&[spec.name]),
        parents,
        Sexp::strings(&spec.children),
        probability_table(spec, specs),
    ]))
    .attr("names", Sexp::strings(&["node", "parents", "children", "prob"]))
    .attr("class", Sexp::strings(&["bn.fit.dnode"]))
}

/// A `bn.fit` object built from node descriptions
pub fn bn_fit(specs: &[NodeSpec]) -> Sexp {
    let names: Vec<&str> = specs.iter().map(|s| s.name).collect();
    Sexp::new(Value::List(
        specs.iter().map(|s| node_object(s, specs)).collect(),
    ))
    .attr("names", Sexp::strings(&names))
    .attr("class", Sexp::strings(&["bn.fit", "bn.fit.dnet"]))
}

/// The asia network ("chest clinic") in bnlearn's node order
pub fn asia() -> Vec<NodeSpec> {
    vec![
        NodeSpec::new("asia", &[], &["tub"], &[0.01, 0.99]),
        NodeSpec::new("tub", &["asia"], &["either"], &[0.05, 0.95, 0.01, 0.99]),
        NodeSpec::new("smoke", &[], &["lung", "bronc"], &[0.5, 0.5]),
        NodeSpec::new("lung", &["smoke"], &["either"], &[0.1, 0.9, 0.01, 0.99]),
        NodeSpec::new("bronc", &["smoke"], &["dysp"], &[0.6, 0.4, 0.3, 0.7]),
        NodeSpec::new(
            "either",
            &["lung", "tub"],
            &["xray", "dysp"],
            &[1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0],
        ),
        NodeSpec::new("xray", &["either"], &[], &[0.98, 0.02, 0.05, 0.95]),
        NodeSpec::new(
            "dysp",
            &["bronc", "either"],
            &[],
            &[0.9, 0.1, 0.7, 0.3, 0.8, 0.2, 0.1, 0.9],
        ),
    ]
}

pub const ASIA_EDGES: [(&str, &str); 8] = [
    ("asia", "tub"),
    ("tub", "either"),
    ("either", "xray"),
    ("either", "dysp"),
    ("smoke", "lung"),
    ("smoke", "bronc"),
    ("lung", "either"),
    ("bronc", "dysp"),
];

/// Gzipped v3 file of the given nodes, as `saveRDS` writes by default
pub fn model_file(specs: &[NodeSpec]) -> NamedTempFile {
    rds_file(&gzip(&encode(&bn_fit(specs), 3)))
}
