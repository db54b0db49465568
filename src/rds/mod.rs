//! Native decoder for R's serialization format as written by `saveRDS`.
//!
//! Only the XDR binary flavour (the default) is understood, either raw or
//! wrapped in gzip. The decoder produces a generic [`RObject`] tree; knowing
//! what a bnlearn network looks like is left to [`crate::bnlearn`].

pub mod reader;
pub mod sexp;

use std::path::Path;

use log::debug;

use crate::error::BnError;

pub use reader::{Compression, RdsHeader, detect_compression, read_rds, read_rds_with_header};
pub use sexp::{PairListKind, PairNode, RObject, RValue};

/// Read and decode an RDS file from disk.
pub fn read_rds_file(path: impl AsRef<Path>) -> Result<RObject, BnError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|source| BnError::io(format!("failed to read {}", path.display()), source))?;
    debug!("read {} bytes from {}", bytes.len(), path.display());
    Ok(read_rds(&bytes)?)
}
