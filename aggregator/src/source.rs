use std::collections::HashSet;
use url::Url;

use crate::manifest::Manifest;

/// One upstream add-on: its normalized base endpoint plus the manifest
/// fetched from it at tenant initialization. Immutable afterwards.
#[derive(Debug, Clone)]
pub struct Source {
    pub base: Url,
    pub manifest: Manifest,
}

impl Source {
    /// Absolute URL for a path under this source's base endpoint.
    pub fn endpoint(&self, path: &str) -> String {
        join_endpoint(&self.base, path)
    }

    /// Whether this source speaks the JSON-body protocol generation.
    /// Manifests of that generation carry a `manifestVersion` field; all
    /// others are addressed with path-encoded GETs.
    pub fn speaks_json_protocol(&self) -> bool {
        self.manifest.manifest_version.is_some()
    }
}

pub fn join_endpoint(base: &Url, path: &str) -> String {
    format!("{}/{}", base.as_str().trim_end_matches('/'), path)
}

pub fn manifest_url(base: &Url) -> String {
    join_endpoint(base, "manifest.json")
}

/// Cleans a raw endpoint list: trims whitespace, strips one trailing
/// `/manifest.json` (case-insensitive) and trailing slashes, drops empty or
/// unparseable entries, and de-duplicates on the normalized string while
/// preserving first-seen order.
pub fn normalize_endpoints(raw: &[String]) -> Vec<Url> {
    let mut seen = HashSet::new();
    let mut endpoints = Vec::new();

    for entry in raw {
        let mut cleaned = entry.trim().to_string();
        let lowered = cleaned.to_ascii_lowercase();
        if let Some(prefix) = lowered.strip_suffix("/manifest.json") {
            cleaned.truncate(prefix.len());
        }
        let cleaned = cleaned.trim_end_matches('/');
        if cleaned.is_empty() {
            continue;
        }

        let url = match Url::parse(cleaned) {
            Ok(url) => url,
            Err(error) => {
                tracing::warn!(endpoint = %cleaned, error = %error, "discarding invalid endpoint");
                continue;
            }
        };
        if seen.insert(cleaned.to_string()) {
            endpoints.push(url);
        }
    }

    endpoints
}
