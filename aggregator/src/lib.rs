pub mod config;
pub mod dispatch;
pub mod errors;
pub mod http;
pub mod manifest;
pub mod protocol;
pub mod registry;
pub mod response;
pub mod service;
pub mod source;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::dispatch::Dispatcher;
use crate::errors::AggregatorError;
use crate::registry::TenantRegistry;
use crate::service::AggregatorService;
use shared::admin_service::AdminService;
use shared::http::run_http_service;

/// Brings up the admin listener, initializes every tenant, and serves
/// client traffic. The main listener only binds after the registry is fully
/// built, so no request can ever observe a partially initialized tenant.
pub async fn run(config: config::Config) -> Result<(), AggregatorError> {
    let dispatcher = Dispatcher::new(Duration::from_secs(config.upstream.http_timeout_secs));

    let ready = Arc::new(AtomicBool::new(false));
    let admin: AdminService<AggregatorError> = AdminService::new(ready.clone());
    let admin_listener = config.admin_listener.clone();
    tokio::spawn(async move {
        if let Err(error) =
            run_http_service(&admin_listener.host, admin_listener.port, admin).await
        {
            tracing::error!(error = %error, "admin listener failed");
        }
    });

    let registry = TenantRegistry::initialize(&config, &dispatcher).await;
    tracing::info!(tenants = registry.tenant_count(), "registry initialized");
    ready.store(true, Ordering::Release);

    let service = AggregatorService::new(registry, dispatcher);
    run_http_service(&config.listener.host, config.listener.port, service).await
}
