use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, time::Duration};

use crate::error::BnError;

pub const DEFAULT_REPOSITORY_URL: &str = "https://www.bnlearn.com/bnrepository";

/// Column sums may stray this far from 1 before the model check rejects a CPD
pub const DEFAULT_TOLERANCE: f64 = 0.01;

/// Settings shared by `load_model` and `fetch_model`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Base URL; models are fetched from `{repository_url}/{name}/{name}.rds`
    pub repository_url: String,
    pub tolerance: f64,
    /// Request timeout for downloads, in seconds when read from JSON. `None` blocks.
    #[serde(with = "seconds")]
    pub timeout: Option<Duration>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            repository_url: DEFAULT_REPOSITORY_URL.to_string(),
            tolerance: DEFAULT_TOLERANCE,
            timeout: None,
        }
    }
}

impl LoaderConfig {
    /// Defaults, overridden by any `BNLEARN_*` variables that are set
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("BNLEARN_REPOSITORY_URL") {
            if !url.trim().is_empty() {
                config.repository_url = url.trim().to_string();
            }
        }

        if let Some(tol) = lookup("BNLEARN_CPD_TOLERANCE") {
            match tol.parse::<f64>() {
                Ok(tol_val) if tol_val.is_finite() && tol_val >= 0.0 => config.tolerance = tol_val,
                _ => warn!("ignoring BNLEARN_CPD_TOLERANCE={:?}", tol),
            }
        }

        if let Some(secs) = lookup("BNLEARN_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(0) => config.timeout = None,
                Ok(secs_val) => config.timeout = Some(Duration::from_secs(secs_val)),
                Err(_) => warn!("ignoring BNLEARN_TIMEOUT_SECS={:?}", secs),
            }
        }

        debug!("loader config: {:?}", config);
        config
    }

    /// Read a JSON config file; missing fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, BnError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| BnError::io(format!("reading config {}", path.display()), e))?;
        serde_json::from_str(&text).map_err(|e| {
            BnError::io(
                format!("parsing config {}", path.display()),
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })
    }
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(deserializer)?;
        match secs {
            Some(s) if s.is_finite() && s > 0.0 => Ok(Some(Duration::from_secs_f64(s))),
            Some(s) if s == 0.0 => Ok(None),
            Some(s) => Err(serde::de::Error::custom(format!("invalid timeout {s}"))),
            None => Ok(None),
        }
    }
}
