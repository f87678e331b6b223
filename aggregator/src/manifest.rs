//! Upstream manifest model and the merge that derives one aggregate
//! manifest plus a catalog-ownership index from a tenant's sources.
//!
//! Merge rules:
//! - `types` / `idPrefixes`: de-duplicated union, first occurrence wins the
//!   position
//! - `catalogs`: flat concatenation in source order; duplicate catalog ids
//!   from different sources are preserved, each remains independently
//!   addressable through the ownership index
//! - `logo` / `icon`: first source with a non-empty value
//! - identity fields: synthesized, never inherited from a source

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::protocol::ResourceKind;
use crate::source::Source;

/// One catalog entry as declared by an upstream manifest. Ids are not
/// globally unique across sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

/// Permissive view of an upstream manifest document. Every field defaults so
/// that any JSON object parses; unknown fields ride along in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(rename = "idPrefixes", default, skip_serializing_if = "Vec::is_empty")]
    pub id_prefixes: Vec<String>,
    #[serde(default)]
    pub catalogs: Vec<CatalogDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(
        rename = "manifestVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub manifest_version: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

/// The merged manifest served to clients under `/{tenant}/manifest.json`.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateManifest {
    #[serde(rename = "manifestVersion")]
    pub manifest_version: String,
    pub id: String,
    pub version: String,
    pub name: String,
    pub description: String,
    pub resources: Vec<String>,
    pub types: Vec<String>,
    #[serde(rename = "idPrefixes")]
    pub id_prefixes: Vec<String>,
    pub catalogs: Vec<CatalogDescriptor>,
    pub logo: String,
    pub icon: String,
}

/// Catalog id to the ordered indices of the sources declaring it. More than
/// one owner per id is legal; all owners are queried on a catalog request.
pub type OwnershipIndex = IndexMap<String, Vec<usize>>;

/// Derives the aggregate manifest and ownership index from a tenant's
/// sources. Pure; an empty source list yields the synthesized identity with
/// empty collections. The two outputs are built in one pass so they can
/// never skew against each other.
pub fn merge(tenant: &str, sources: &[Source]) -> (AggregateManifest, OwnershipIndex) {
    let mut types: Vec<String> = Vec::new();
    let mut id_prefixes: Vec<String> = Vec::new();
    let mut catalogs: Vec<CatalogDescriptor> = Vec::new();
    let mut ownership: OwnershipIndex = IndexMap::new();
    let mut logo = String::new();
    let mut icon = String::new();

    for (index, source) in sources.iter().enumerate() {
        let manifest = &source.manifest;

        for kind in &manifest.types {
            if !types.contains(kind) {
                types.push(kind.clone());
            }
        }
        for prefix in &manifest.id_prefixes {
            if !id_prefixes.contains(prefix) {
                id_prefixes.push(prefix.clone());
            }
        }
        for catalog in &manifest.catalogs {
            ownership.entry(catalog.id.clone()).or_default().push(index);
            catalogs.push(catalog.clone());
        }
        if logo.is_empty()
            && let Some(value) = manifest.logo.as_deref().filter(|v| !v.is_empty())
        {
            logo = value.to_string();
        }
        if icon.is_empty()
            && let Some(value) = manifest.icon.as_deref().filter(|v| !v.is_empty())
        {
            icon = value.to_string();
        }
    }

    let manifest = AggregateManifest {
        manifest_version: "4".to_string(),
        id: format!("manifold-{tenant}"),
        version: env!("CARGO_PKG_VERSION").to_string(),
        name: format!("Manifold ({tenant})"),
        description: "Aggregated catalog of all configured add-ons".to_string(),
        resources: ResourceKind::ALL
            .iter()
            .map(|resource| resource.segment().to_string())
            .collect(),
        types,
        id_prefixes,
        catalogs,
        logo,
        icon,
    };

    (manifest, ownership)
}
