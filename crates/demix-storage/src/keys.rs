//! Shared key and URL layout for storage backends.

use crate::{StorageError, StorageResult};

/// Key for one separated stem: `stems/{stem}_{safe_filename}`.
pub fn stem_key(stem: &str, safe_filename: &str) -> String {
    format!("stems/{}_{}", stem, safe_filename)
}

/// Key for the request's input file: `originals/{safe_filename}`.
pub fn original_key(safe_filename: &str) -> String {
    format!("originals/{}", safe_filename)
}

/// Public URL of an object.
///
/// AWS uses the virtual-hosted form `https://{bucket}.s3.{region}.amazonaws.com/{key}`;
/// S3-compatible providers get the path-style form `{endpoint}/{bucket}/{key}`.
pub fn s3_object_url(bucket: &str, region: &str, endpoint: Option<&str>, key: &str) -> String {
    match endpoint {
        Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key),
        None => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key),
    }
}

/// Reject keys that could escape the bucket prefix or the local storage root.
pub fn validate_key(storage_key: &str) -> StorageResult<()> {
    if storage_key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if storage_key.starts_with('/') || storage_key.split('/').any(|segment| segment == "..") {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

/// Split `scheme://host/path` into `(host, path)`.
///
/// A collapsed `https:/host/path` (as produced by some proxies when a URL is
/// embedded in a request path) is accepted too. Returns `None` for strings
/// without an http(s) scheme.
pub(crate) fn split_http_url(url: &str) -> Option<(&str, &str)> {
    let rest = ["https://", "http://", "https:/", "http:/"]
        .iter()
        .find_map(|scheme| url.strip_prefix(scheme))?;
    let rest = rest.trim_start_matches('/');
    let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
    let path = path.split(['?', '#']).next().unwrap_or_default();
    Some((host, path))
}
