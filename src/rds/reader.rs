use std::io::Read;

use flate2::read::GzDecoder;
use log::{debug, trace};

use super::sexp::{PairListKind, PairNode, RObject, RValue};
use crate::error::RdsError;

/// SEXPTYPE codes and the pseudo-types used only inside serialization streams
mod sxp {
    pub const NILSXP: u8 = 0;
    pub const SYMSXP: u8 = 1;
    pub const LISTSXP: u8 = 2;
    pub const CLOSXP: u8 = 3;
    pub const ENVSXP: u8 = 4;
    pub const PROMSXP: u8 = 5;
    pub const LANGSXP: u8 = 6;
    pub const SPECIALSXP: u8 = 7;
    pub const BUILTINSXP: u8 = 8;
    pub const CHARSXP: u8 = 9;
    pub const LGLSXP: u8 = 10;
    pub const INTSXP: u8 = 13;
    pub const REALSXP: u8 = 14;
    pub const CPLXSXP: u8 = 15;
    pub const STRSXP: u8 = 16;
    pub const DOTSXP: u8 = 17;
    pub const VECSXP: u8 = 19;
    pub const EXPRSXP: u8 = 20;
    pub const BCODESXP: u8 = 21;
    pub const EXTPTRSXP: u8 = 22;
    pub const WEAKREFSXP: u8 = 23;
    pub const RAWSXP: u8 = 24;
    pub const S4SXP: u8 = 25;

    pub const ALTREP_SXP: u8 = 238;
    pub const ATTRLISTSXP: u8 = 239;
    pub const ATTRLANGSXP: u8 = 240;
    pub const BASEENV_SXP: u8 = 241;
    pub const EMPTYENV_SXP: u8 = 242;
    pub const BCREPREF: u8 = 243;
    pub const BCREPDEF: u8 = 244;
    pub const GENERICREFSXP: u8 = 245;
    pub const CLASSREFSXP: u8 = 246;
    pub const PERSISTSXP: u8 = 247;
    pub const PACKAGESXP: u8 = 248;
    pub const NAMESPACESXP: u8 = 249;
    pub const BASENAMESPACE_SXP: u8 = 250;
    pub const MISSINGARG_SXP: u8 = 251;
    pub const UNBOUNDVALUE_SXP: u8 = 252;
    pub const GLOBALENV_SXP: u8 = 253;
    pub const NILVALUE_SXP: u8 = 254;
    pub const REFSXP: u8 = 255;
}

use sxp::*;

const NA_INTEGER: i32 = i32::MIN;
const LATIN1_MASK: i32 = 1 << 2;
/// Longest compact sequence that is expanded in memory
const MAX_SEQUENCE_LENGTH: usize = 1 << 24;
/// Deepest nesting of items accepted in one stream
const MAX_DEPTH: usize = 64;

/// Compression wrapper detected from the leading magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

pub fn detect_compression(bytes: &[u8]) -> Compression {
    if bytes.starts_with(&[0x1f, 0x8b]) {
        Compression::Gzip
    } else if bytes.starts_with(b"BZh") {
        Compression::Bzip2
    } else if bytes.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
        Compression::Xz
    } else {
        Compression::None
    }
}

/// Stream header written by `saveRDS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdsHeader {
    pub version: i32,
    pub writer_version: i32,
    pub min_reader_version: i32,
    pub native_encoding: Option<String>,
}

impl RdsHeader {
    /// R release that wrote the stream, e.g. "4.3.0"
    pub fn writer_release(&self) -> String {
        let v = self.writer_version;
        format!("{}.{}.{}", v / 65536, (v % 65536) / 256, v % 256)
    }
}

/// Decode an RDS payload, gzip-compressed or not, into its top-level object.
pub fn read_rds(bytes: &[u8]) -> Result<RObject, RdsError> {
    read_rds_with_header(bytes).map(|(_, object)| object)
}

/// Like [`read_rds`] but also returns the stream header.
pub fn read_rds_with_header(bytes: &[u8]) -> Result<(RdsHeader, RObject), RdsError> {
    match detect_compression(bytes) {
        Compression::Gzip => {
            let mut decoded = Vec::new();
            GzDecoder::new(bytes)
                .read_to_end(&mut decoded)
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::UnexpectedEof => RdsError::UnexpectedEof,
                    _ => RdsError::Io(e),
                })?;
            trace!("gunzipped {} bytes into {}", bytes.len(), decoded.len());
            decode(&decoded)
        }
        Compression::Bzip2 => Err(RdsError::UnsupportedCompression("bzip2")),
        Compression::Xz => Err(RdsError::UnsupportedCompression("xz")),
        Compression::None => decode(bytes),
    }
}

fn decode(bytes: &[u8]) -> Result<(RdsHeader, RObject), RdsError> {
    let mut reader = XdrReader::new(bytes);
    let header = reader.read_header()?;
    debug!(
        "RDS stream version {} written by R {}",
        header.version,
        header.writer_release()
    );
    let object = reader.read_item()?;
    if reader.remaining() > 0 {
        debug!("{} trailing bytes after the top-level object", reader.remaining());
    }
    Ok((header, object))
}

#[derive(Debug, Clone, Copy)]
struct Flags(i32);

impl Flags {
    fn sexp_type(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    fn levels(self) -> i32 {
        self.0 >> 12
    }

    fn is_object(self) -> bool {
        self.0 & (1 << 8) != 0
    }

    fn has_attributes(self) -> bool {
        self.0 & (1 << 9) != 0
    }

    fn has_tag(self) -> bool {
        self.0 & (1 << 10) != 0
    }

    fn packed_ref_index(self) -> i32 {
        self.0 >> 8
    }
}

/// Big-endian (XDR) cursor over a decompressed stream, holding the reference
/// table that symbols and environments are registered in.
struct XdrReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    refs: Vec<RObject>,
    depth: usize,
}

impl<'a> XdrReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            refs: Vec::new(),
            depth: 0,
        }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], RdsError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(RdsError::UnexpectedEof)?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_i32(&mut self) -> Result<i32, RdsError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(i32::from_be_bytes(buf))
    }

    fn read_f64(&mut self) -> Result<f64, RdsError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(f64::from_be_bytes(buf))
    }

    /// Vector length, switching to the two-word form for long vectors.
    /// `min_element_size` bounds the length by what the stream can still hold.
    fn read_length(&mut self, min_element_size: usize) -> Result<usize, RdsError> {
        let len = match self.read_i32()? {
            -1 => {
                let upper = i64::from(self.read_i32()?);
                let lower = i64::from(self.read_i32()? as u32);
                (upper << 32) + lower
            }
            n => i64::from(n),
        };
        let len = usize::try_from(len).map_err(|_| RdsError::InvalidLength(len))?;
        if len.saturating_mul(min_element_size) > self.remaining() {
            return Err(RdsError::UnexpectedEof);
        }
        Ok(len)
    }

    fn read_header(&mut self) -> Result<RdsHeader, RdsError> {
        let magic = self.take(2)?;
        match (magic[0], magic[1]) {
            (b'X', b'\n') => {}
            (b'A', b'\n') => return Err(RdsError::UnsupportedFormat("ASCII".to_string())),
            (b'B', b'\n') => {
                return Err(RdsError::UnsupportedFormat("native binary".to_string()));
            }
            (b'R', b'D') => {
                return Err(RdsError::UnsupportedFormat(
                    "workspace image (use saveRDS, not save)".to_string(),
                ));
            }
            (a, b) => {
                return Err(RdsError::UnsupportedFormat(format!(
                    "unknown magic bytes {a:#04x} {b:#04x}"
                )));
            }
        }

        let version = self.read_i32()?;
        if !(2..=3).contains(&version) {
            return Err(RdsError::UnsupportedVersion(version));
        }
        let writer_version = self.read_i32()?;
        let min_reader_version = self.read_i32()?;
        let native_encoding = if version == 3 {
            let len = self.read_length(1)?;
            Some(String::from_utf8_lossy(self.take(len)?).into_owned())
        } else {
            None
        };

        Ok(RdsHeader {
            version,
            writer_version,
            min_reader_version,
            native_encoding,
        })
    }

    fn read_item(&mut self) -> Result<RObject, RdsError> {
        let flags = Flags(self.read_i32()?);
        self.read_item_with(flags)
    }

    fn read_item_with(&mut self, flags: Flags) -> Result<RObject, RdsError> {
        if self.depth >= MAX_DEPTH {
            return Err(RdsError::Malformed(format!(
                "nesting deeper than {MAX_DEPTH} levels"
            )));
        }
        self.depth += 1;
        let item = self.read_item_inner(flags);
        self.depth -= 1;
        item
    }

    fn read_item_inner(&mut self, flags: Flags) -> Result<RObject, RdsError> {
        match flags.sexp_type() {
            NILVALUE_SXP => Ok(RObject::null()),
            EMPTYENV_SXP | BASEENV_SXP | GLOBALENV_SXP | BASENAMESPACE_SXP => {
                Ok(RValue::Environment.into())
            }
            UNBOUNDVALUE_SXP | MISSINGARG_SXP => Ok(RValue::Missing.into()),
            REFSXP => self.read_reference(flags),
            PERSISTSXP => {
                self.read_string_vec()?;
                Err(RdsError::UnsupportedType(
                    "persistent reference".to_string(),
                ))
            }
            SYMSXP => {
                let name = match self.read_item()?.value {
                    RValue::Char(name) => name.unwrap_or_else(|| "NA".to_string()),
                    _ => {
                        return Err(RdsError::Malformed(
                            "symbol name is not a CHARSXP".to_string(),
                        ));
                    }
                };
                let symbol = RObject::new(RValue::Symbol(name));
                self.refs.push(symbol.clone());
                Ok(symbol)
            }
            PACKAGESXP | NAMESPACESXP => {
                let spec = self.read_string_vec()?;
                trace!("namespace/package reference {:?}", spec);
                let env = RObject::new(RValue::Environment);
                self.refs.push(env.clone());
                Ok(env)
            }
            ENVSXP => {
                let _locked = self.read_i32()?;
                self.refs.push(RValue::Environment.into());
                // enclosure, frame, hash table, attributes
                for _ in 0..4 {
                    self.read_item()?;
                }
                Ok(RValue::Environment.into())
            }
            LISTSXP | LANGSXP | CLOSXP | PROMSXP | DOTSXP => self.read_pairlist(flags),
            ALTREP_SXP => self.read_altrep(flags),
            BCODESXP | BCREPDEF | BCREPREF | ATTRLISTSXP | ATTRLANGSXP => Err(
                RdsError::UnsupportedType("byte code".to_string()),
            ),
            CLASSREFSXP | GENERICREFSXP => Err(RdsError::UnsupportedType(
                "class reference".to_string(),
            )),
            _ => self.read_vector(flags),
        }
    }

    fn read_reference(&mut self, flags: Flags) -> Result<RObject, RdsError> {
        let index = match flags.packed_ref_index() {
            0 => self.read_i32()?,
            packed => packed,
        };
        let index = usize::try_from(index)
            .map_err(|_| RdsError::Malformed(format!("negative reference index {index}")))?;
        index
            .checked_sub(1)
            .and_then(|slot| self.refs.get(slot))
            .cloned()
            .ok_or(RdsError::InvalidReference(index))
    }

    fn read_string_vec(&mut self) -> Result<Vec<Option<String>>, RdsError> {
        if self.read_i32()? != 0 {
            return Err(RdsError::Malformed(
                "named persistent string vectors are not supported".to_string(),
            ));
        }
        let len = self.read_length(4)?;
        let mut strings = Vec::with_capacity(len);
        for _ in 0..len {
            strings.push(self.read_string_element()?);
        }
        Ok(strings)
    }

    fn read_string_element(&mut self) -> Result<Option<String>, RdsError> {
        match self.read_item()?.value {
            RValue::Char(value) => Ok(value),
            _ => Err(RdsError::Malformed(
                "character vector element is not a CHARSXP".to_string(),
            )),
        }
    }

    fn read_attributes(&mut self) -> Result<Vec<(String, RObject)>, RdsError> {
        Ok(attribute_pairs(self.read_item()?))
    }

    /// Pairlists are chains of cells; the chain is followed iteratively so that
    /// long argument lists do not recurse once per cell.
    fn read_pairlist(&mut self, flags: Flags) -> Result<RObject, RdsError> {
        let kind = match flags.sexp_type() {
            LISTSXP => PairListKind::List,
            LANGSXP => PairListKind::Language,
            CLOSXP => PairListKind::Closure,
            PROMSXP => PairListKind::Promise,
            _ => PairListKind::Dots,
        };
        let chained = matches!(
            kind,
            PairListKind::List | PairListKind::Language | PairListKind::Dots
        );

        let mut nodes = Vec::new();
        let mut attributes = Vec::new();
        let mut cell = flags;
        loop {
            if cell.has_attributes() {
                let cell_attributes = self.read_attributes()?;
                if nodes.is_empty() {
                    attributes = cell_attributes;
                }
            }
            let tag = if cell.has_tag() {
                self.read_item()?.as_symbol().map(str::to_string)
            } else {
                None
            };
            let value = self.read_item()?;
            nodes.push(PairNode { tag, value });

            let next = Flags(self.read_i32()?);
            match next.sexp_type() {
                NILVALUE_SXP => break,
                LISTSXP | DOTSXP if chained => cell = next,
                _ => {
                    let tail = self.read_item_with(next)?;
                    nodes.push(PairNode {
                        tag: None,
                        value: tail,
                    });
                    break;
                }
            }
        }

        Ok(RObject {
            value: RValue::PairList { kind, nodes },
            attributes,
            is_object: flags.is_object(),
        })
    }

    fn read_altrep(&mut self, flags: Flags) -> Result<RObject, RdsError> {
        let info = self.read_item()?;
        let state = self.read_item()?;
        let attributes = attribute_pairs(self.read_item()?);

        let class = match &info.value {
            RValue::PairList { nodes, .. } => nodes
                .first()
                .and_then(|node| node.value.as_symbol())
                .map(str::to_string),
            _ => None,
        }
        .ok_or_else(|| RdsError::Malformed("ALTREP class information is missing".to_string()))?;
        trace!("expanding ALTREP object of class {}", class);

        Ok(RObject {
            value: expand_altrep(&class, state)?,
            attributes,
            is_object: flags.is_object(),
        })
    }

    fn read_vector(&mut self, flags: Flags) -> Result<RObject, RdsError> {
        let value = match flags.sexp_type() {
            NILSXP => RValue::Null,
            CHARSXP => RValue::Char(self.read_char_contents(flags)?),
            LGLSXP => {
                let len = self.read_length(4)?;
                let mut values = Vec::with_capacity(len);
                for _ in 0..len {
                    values.push(match self.read_i32()? {
                        NA_INTEGER => None,
                        0 => Some(false),
                        _ => Some(true),
                    });
                }
                RValue::Logical(values)
            }
            INTSXP => {
                let len = self.read_length(4)?;
                let mut values = Vec::with_capacity(len);
                for _ in 0..len {
                    let v = self.read_i32()?;
                    values.push((v != NA_INTEGER).then_some(v));
                }
                RValue::Integer(values)
            }
            REALSXP => {
                let len = self.read_length(8)?;
                let mut values = Vec::with_capacity(len);
                for _ in 0..len {
                    values.push(self.read_f64()?);
                }
                RValue::Real(values)
            }
            CPLXSXP => {
                let len = self.read_length(16)?;
                let mut values = Vec::with_capacity(len);
                for _ in 0..len {
                    values.push([self.read_f64()?, self.read_f64()?]);
                }
                RValue::Complex(values)
            }
            STRSXP => {
                let len = self.read_length(4)?;
                let mut values = Vec::with_capacity(len);
                for _ in 0..len {
                    values.push(self.read_string_element()?);
                }
                RValue::String(values)
            }
            VECSXP | EXPRSXP => {
                let len = self.read_length(4)?;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.read_item()?);
                }
                if flags.sexp_type() == VECSXP {
                    RValue::List(items)
                } else {
                    RValue::Expression(items)
                }
            }
            RAWSXP => {
                let len = self.read_length(1)?;
                RValue::Raw(self.take(len)?.to_vec())
            }
            SPECIALSXP | BUILTINSXP => {
                let len = self.read_length(1)?;
                RValue::Builtin(String::from_utf8_lossy(self.take(len)?).into_owned())
            }
            EXTPTRSXP => {
                self.refs.push(RValue::ExternalPointer.into());
                // protected value and tag
                self.read_item()?;
                self.read_item()?;
                RValue::ExternalPointer
            }
            WEAKREFSXP => {
                self.refs.push(RValue::WeakReference.into());
                RValue::WeakReference
            }
            S4SXP => RValue::S4,
            other => {
                return Err(RdsError::UnsupportedType(format!("SEXP type {other}")));
            }
        };

        let attributes = if flags.has_attributes() {
            self.read_attributes()?
        } else {
            Vec::new()
        };

        Ok(RObject {
            value,
            attributes,
            is_object: flags.is_object(),
        })
    }

    fn read_char_contents(&mut self, flags: Flags) -> Result<Option<String>, RdsError> {
        let len = self.read_i32()?;
        if len == -1 {
            return Ok(None);
        }
        let len = usize::try_from(len).map_err(|_| RdsError::InvalidLength(i64::from(len)))?;
        let bytes = self.take(len)?;
        if flags.levels() & LATIN1_MASK != 0 {
            Ok(Some(bytes.iter().map(|&b| char::from(b)).collect()))
        } else {
            Ok(Some(String::from_utf8_lossy(bytes).into_owned()))
        }
    }
}

/// Turn an attribute pairlist into (name, value) pairs. Untagged cells are dropped.
fn attribute_pairs(attributes: RObject) -> Vec<(String, RObject)> {
    match attributes.value {
        RValue::PairList { nodes, .. } => nodes
            .into_iter()
            .filter_map(|node| node.tag.map(|tag| (tag, node.value)))
            .collect(),
        _ => Vec::new(),
    }
}

fn expand_altrep(class: &str, state: RObject) -> Result<RValue, RdsError> {
    match class {
        "compact_intseq" => {
            let (n, start, step) = sequence_info(&state)?;
            let (start, step) = (start as i64, step as i64);
            // values outside the i32 range decode as NA
            let values = (0..n as i64)
                .map(|i| {
                    i.checked_mul(step)
                        .and_then(|offset| offset.checked_add(start))
                        .and_then(|v| i32::try_from(v).ok())
                })
                .collect();
            Ok(RValue::Integer(values))
        }
        "compact_realseq" => {
            let (n, start, step) = sequence_info(&state)?;
            Ok(RValue::Real(
                (0..n).map(|i| start + i as f64 * step).collect(),
            ))
        }
        "wrap_integer" | "wrap_real" | "wrap_logical" | "wrap_string" | "wrap_complex"
        | "wrap_raw" | "wrap_list" => Ok(first_state_value(state)?.value),
        "deferred_string" => {
            let source = first_state_value(state)?;
            let strings = match &source.value {
                RValue::Integer(values) => values
                    .iter()
                    .map(|v| v.map(|i| i.to_string()))
                    .collect(),
                RValue::Real(values) => values.iter().map(|v| format_double(*v)).collect(),
                RValue::String(values) => values.clone(),
                _ => {
                    return Err(RdsError::Malformed(format!(
                        "deferred string over {}",
                        source.type_name()
                    )));
                }
            };
            Ok(RValue::String(strings))
        }
        other => Err(RdsError::UnsupportedType(format!("ALTREP class {other}"))),
    }
}

fn sequence_info(state: &RObject) -> Result<(usize, f64, f64), RdsError> {
    match state.as_f64_vec().as_deref() {
        Some(&[n, start, step]) if n.is_finite() => {
            if n < 0.0 || n.fract() != 0.0 || n > MAX_SEQUENCE_LENGTH as f64 {
                return Err(RdsError::InvalidLength(n as i64));
            }
            Ok((n as usize, start, step))
        }
        _ => Err(RdsError::Malformed(
            "compact sequence state must be (length, start, step)".to_string(),
        )),
    }
}

fn first_state_value(state: RObject) -> Result<RObject, RdsError> {
    match state.value {
        RValue::PairList { nodes, .. } => nodes.into_iter().next().map(|node| node.value),
        RValue::List(items) => items.into_iter().next(),
        _ => None,
    }
    .ok_or_else(|| RdsError::Malformed("ALTREP wrapper state is empty".to_string()))
}

fn format_double(value: f64) -> Option<String> {
    if value.is_nan() {
        None
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        Some(format!("{}", value as i64))
    } else {
        Some(format!("{value}"))
    }
}
