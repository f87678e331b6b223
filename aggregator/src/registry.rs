//! Tenant registry: one named aggregation configuration per tenant, built
//! once at startup and read-only afterwards.
//!
//! Initialization is strictly fail-soft. A tenant whose raw configuration
//! does not parse is skipped; an upstream whose manifest cannot be fetched
//! (or lacks catalogs) is dropped from its tenant; a tenant that ends up
//! with zero sources is still registered and serves an empty aggregate.
//! Registration is all-or-nothing per tenant: sources, merged manifest, and
//! ownership index are built together before the tenant becomes visible, so
//! lookups can never observe a half-built tenant.

use std::collections::HashMap;

use crate::config::{Config, TenantConfig};
use crate::dispatch::{Dispatcher, OutboundCall};
use crate::manifest::{AggregateManifest, Manifest, OwnershipIndex, merge};
use crate::source::{Source, manifest_url, normalize_endpoints};

pub struct Tenant {
    pub name: String,
    /// Surviving sources in registration order; this order fixes the
    /// concatenation order of every merged response.
    pub sources: Vec<Source>,
    pub manifest: AggregateManifest,
    ownership: OwnershipIndex,
}

impl Tenant {
    fn build(name: String, sources: Vec<Source>) -> Self {
        let (manifest, ownership) = merge(&name, &sources);
        Self {
            name,
            sources,
            manifest,
            ownership,
        }
    }

    /// Sources declaring the given catalog id, in registration order. An
    /// unknown id yields no owners, which the caller treats as "no targets,
    /// no network calls".
    pub fn catalog_owners(&self, catalog_id: &str) -> Vec<&Source> {
        self.ownership
            .get(catalog_id)
            .map(|indices| indices.iter().map(|&index| &self.sources[index]).collect())
            .unwrap_or_default()
    }

    pub fn all_sources(&self) -> Vec<&Source> {
        self.sources.iter().collect()
    }
}

pub struct TenantRegistry {
    tenants: HashMap<String, Tenant>,
}

impl TenantRegistry {
    /// Builds every tenant before the registry becomes visible to lookups.
    pub async fn initialize(config: &Config, dispatcher: &Dispatcher) -> Self {
        let mut tenants = HashMap::new();

        for (name, raw) in &config.tenants {
            let tenant_config: TenantConfig = match serde_json::from_value(raw.clone()) {
                Ok(parsed) => parsed,
                Err(error) => {
                    tracing::warn!(tenant = %name, error = %error, "skipping tenant with invalid config");
                    continue;
                }
            };

            let tenant = init_tenant(name, &tenant_config, dispatcher).await;
            tracing::info!(
                tenant = %name,
                sources = tenant.sources.len(),
                catalogs = tenant.manifest.catalogs.len(),
                "tenant initialized"
            );
            tenants.insert(name.clone(), tenant);
        }

        Self { tenants }
    }

    pub fn lookup(&self, name: &str) -> Option<&Tenant> {
        self.tenants.get(name)
    }

    pub fn tenant_count(&self) -> usize {
        self.tenants.len()
    }
}

/// Fetches every endpoint's manifest concurrently and keeps the survivors
/// in their original order.
async fn init_tenant(name: &str, config: &TenantConfig, dispatcher: &Dispatcher) -> Tenant {
    let endpoints = normalize_endpoints(&config.addons);
    let calls = endpoints
        .iter()
        .map(|base| OutboundCall::get(manifest_url(base)))
        .collect();
    let payloads = dispatcher.dispatch(calls).await;

    let mut sources = Vec::new();
    for (base, payload) in endpoints.into_iter().zip(payloads) {
        let Some(payload) = payload else {
            tracing::warn!(tenant = %name, endpoint = %base, "manifest fetch failed");
            continue;
        };
        let manifest: Manifest = match serde_json::from_value(payload) {
            Ok(manifest) => manifest,
            Err(error) => {
                tracing::warn!(tenant = %name, endpoint = %base, error = %error, "malformed manifest");
                continue;
            }
        };
        if manifest.catalogs.is_empty() {
            tracing::warn!(tenant = %name, endpoint = %base, "manifest declares no catalogs, dropping source");
            continue;
        }
        sources.push(Source { base, manifest });
    }

    Tenant::build(name.to_string(), sources)
}
