use std::io::Write;

use log::{debug, info};
use reqwest::blocking::Client;
use tempfile::NamedTempFile;

use crate::common::config::LoaderConfig;
use crate::error::BnError;

/// `{base}/{name}/{name}.rds`, after checking that `name` is a plain file stem
pub fn model_url(base: &str, name: &str) -> Result<String, BnError> {
    let valid = !name.is_empty()
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !valid {
        return Err(BnError::InvalidModelName(name.to_string()));
    }
    Ok(format!("{}/{name}/{name}.rds", base.trim_end_matches('/')))
}

/// Download a repository model into a temp file that is removed when dropped
pub fn download(config: &LoaderConfig, name: &str) -> Result<NamedTempFile, BnError> {
    let url = model_url(&config.repository_url, name)?;
    let network = |source: reqwest::Error| BnError::Network {
        url: url.clone(),
        source,
    };

    let client = Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(network)?;
    info!("fetching {}", url);
    let mut response = client.get(&url).send().map_err(network)?;

    let status = response.status();
    if !status.is_success() {
        return Err(BnError::HttpStatus {
            url: url.clone(),
            status: status.as_u16(),
        });
    }

    let mut file = tempfile::Builder::new()
        .prefix(&format!("{name}-"))
        .suffix(".rds")
        .tempfile()
        .map_err(|e| BnError::io("creating temp file for download", e))?;
    let bytes = response.copy_to(&mut file).map_err(network)?;
    file.flush()
        .map_err(|e| BnError::io(format!("writing {}", file.path().display()), e))?;
    debug!("saved {} bytes to {}", bytes, file.path().display());
    Ok(file)
}
