// src/layout/fetch.rs

use std::{fs, path::PathBuf};
use tracing::{debug, info};
use url::Url;

use super::{extract, FieldSpec};
use crate::error::LayoutError;

/// Read a codebook from a local path or an `http(s)://` URL.
///
/// Invalid UTF-8 is replaced rather than rejected; codebooks exported from
/// SAS are not reliably encoded.
pub fn read_codebook(location: &str) -> Result<String, LayoutError> {
    match Url::parse(location) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => fetch_codebook(url),
        _ => {
            let path = PathBuf::from(location);
            let raw = fs::read(&path).map_err(|source| LayoutError::Io { path, source })?;
            debug!(bytes = raw.len(), "read codebook from disk");
            Ok(String::from_utf8_lossy(&raw).into_owned())
        }
    }
}

fn fetch_codebook(url: Url) -> Result<String, LayoutError> {
    info!(%url, "fetching codebook");
    let wrap = |source: reqwest::Error| LayoutError::Fetch {
        url: url.to_string(),
        source,
    };
    let body = reqwest::blocking::get(url.clone())
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.bytes())
        .map_err(wrap)?;
    debug!(bytes = body.len(), "downloaded codebook");
    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Read the codebook at `location` and extract its layout.
pub fn load_layout(location: &str) -> Result<Vec<FieldSpec>, LayoutError> {
    let text = read_codebook(location)?;
    extract(&text)
}
