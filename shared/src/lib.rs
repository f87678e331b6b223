pub mod admin_service;
pub mod cors;
pub mod http;
pub mod metrics;
