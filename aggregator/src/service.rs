//! Inbound HTTP surface: per-tenant manifest and resource routes.
//!
//! Routes, all rooted at a tenant-name path prefix:
//! - `GET /{tenant}/manifest.json` — the merged manifest
//! - `POST /{tenant}/{resource}` — JSON-body generation
//! - `GET /{tenant}/{resource}/{type}/{id}.json[?extras]` — path generation
//!
//! Resource responses are always `200 {key: [...]}`; upstream trouble only
//! ever shrinks the list. The 404/400 error bodies are reserved for
//! structural client errors (unknown tenant, unroutable path, unparseable
//! body).

use http_body_util::{BodyExt, combinators::BoxBody};
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode, header};
use shared::http::{full_body, text_response};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use crate::dispatch::Dispatcher;
use crate::errors::AggregatorError;
use crate::protocol::{ResourceKind, ResourceRequest};
use crate::registry::{Tenant, TenantRegistry};
use crate::response;

type HandlerResponse = Response<BoxBody<Bytes, AggregatorError>>;

/// Routes one inbound request against the registry and fans it out.
pub struct RequestHandler {
    registry: TenantRegistry,
    dispatcher: Dispatcher,
}

impl RequestHandler {
    pub fn new(registry: TenantRegistry, dispatcher: Dispatcher) -> Self {
        Self {
            registry,
            dispatcher,
        }
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Result<HandlerResponse, AggregatorError>
    where
        B: Body + Send,
        B::Data: Send,
        B::Error: std::error::Error,
    {
        let mut response = self.route(req).await?;
        shared::cors::apply_cors(response.headers_mut());
        Ok(response)
    }

    async fn route<B>(&self, req: Request<B>) -> Result<HandlerResponse, AggregatorError>
    where
        B: Body + Send,
        B::Data: Send,
        B::Error: std::error::Error,
    {
        if req.method() == Method::OPTIONS {
            return Ok(text_response(StatusCode::OK, ""));
        }

        let method = req.method().clone();
        let query = req.uri().query().map(str::to_string);
        let segments: Vec<String> = req
            .uri()
            .path()
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();

        let Some((tenant_name, rest)) = segments.split_first() else {
            return error_response(StatusCode::NOT_FOUND, "not found");
        };
        let Some(tenant) = self.registry.lookup(tenant_name) else {
            return error_response(StatusCode::NOT_FOUND, "tenant not found");
        };

        if method == Method::GET && rest.len() == 1 && rest[0] == "manifest.json" {
            let body = serde_json::to_vec(&tenant.manifest)
                .map_err(|e| AggregatorError::ResponseSerialization(e.to_string()))?;
            return json_response(StatusCode::OK, Bytes::from(body));
        }

        if method == Method::POST && rest.len() == 1 {
            let Some(resource) = ResourceKind::from_segment(&rest[0]) else {
                return error_response(StatusCode::NOT_FOUND, "not found");
            };
            let body = req
                .into_body()
                .collect()
                .await
                .map(|collected| collected.to_bytes())
                .map_err(|e| AggregatorError::RequestBody(e.to_string()))?;
            return match ResourceRequest::from_json_body(resource, &body) {
                Ok(request) => self.serve_resource(tenant, request).await,
                Err(error) => error_response(
                    StatusCode::BAD_REQUEST,
                    &format!("invalid request body: {error}"),
                ),
            };
        }

        if method == Method::GET && rest.len() == 3 {
            let path_segments: Vec<&str> = rest.iter().map(String::as_str).collect();
            if let Some(request) = ResourceRequest::from_path(&path_segments, query.as_deref()) {
                return self.serve_resource(tenant, request).await;
            }
        }

        error_response(StatusCode::NOT_FOUND, "not found")
    }

    async fn serve_resource(
        &self,
        tenant: &Tenant,
        request: ResourceRequest,
    ) -> Result<HandlerResponse, AggregatorError> {
        // Catalog requests go only to the sources owning that catalog id; an
        // unrecognized id means no targets and therefore no network calls.
        // Every other resource is broadcast, since any source may have
        // content for any item id.
        let targets = match request.resource {
            ResourceKind::Catalog => tenant.catalog_owners(&request.id),
            _ => tenant.all_sources(),
        };

        metrics::counter!(
            shared::metrics::REQUESTS_TOTAL,
            "resource" => request.resource.segment()
        )
        .increment(1);
        tracing::debug!(
            tenant = %tenant.name,
            resource = request.resource.segment(),
            id = %request.id,
            targets = targets.len(),
            "dispatching resource request"
        );

        let calls = targets
            .iter()
            .map(|source| request.outbound_call(source))
            .collect();
        let payloads = self.dispatcher.dispatch(calls).await;
        let items = response::aggregate(request.resource, &payloads);

        json_response(StatusCode::OK, response::into_body(request.resource, items))
    }
}

fn json_response(status: StatusCode, body: Bytes) -> Result<HandlerResponse, AggregatorError> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(full_body(body))
        .map_err(|e| AggregatorError::Internal(format!("failed to build response: {e}")))
}

fn error_response(status: StatusCode, message: &str) -> Result<HandlerResponse, AggregatorError> {
    let body = serde_json::json!({"error": message}).to_string();
    json_response(status, Bytes::from(body))
}

/// The hyper service handed to the listener; clones share one handler.
#[derive(Clone)]
pub struct AggregatorService {
    handler: Arc<RequestHandler>,
}

impl AggregatorService {
    pub fn new(registry: TenantRegistry, dispatcher: Dispatcher) -> Self {
        Self {
            handler: Arc::new(RequestHandler::new(registry, dispatcher)),
        }
    }
}

impl Service<Request<Incoming>> for AggregatorService {
    type Response = HandlerResponse;
    type Error = AggregatorError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let handler = self.handler.clone();

        Box::pin(async move {
            let started = Instant::now();
            let response = handler.handle(req).await;
            metrics::histogram!(shared::metrics::REQUEST_DURATION)
                .record(started.elapsed().as_secs_f64());
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use http::header::ACCESS_CONTROL_ALLOW_ORIGIN;
    use http_body_util::Full;
    use hyper::service::service_fn;
    use hyper_util::rt::TokioExecutor;
    use serde_json::Value as JsonValue;
    use std::convert::Infallible;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Mock add-on. Records every request it receives and answers through
    /// the provided closure; `None` becomes a 404.
    struct MockAddon {
        port: u16,
        hits: Arc<Mutex<Vec<String>>>,
    }

    impl MockAddon {
        fn base(&self) -> String {
            format!("http://127.0.0.1:{}", self.port)
        }

        fn hits(&self) -> Vec<String> {
            self.hits.lock().unwrap().clone()
        }

        fn resource_hits(&self) -> Vec<String> {
            self.hits()
                .into_iter()
                .filter(|hit| !hit.ends_with("/manifest.json"))
                .collect()
        }
    }

    async fn start_addon<F>(respond: F) -> MockAddon
    where
        F: Fn(&Method, &str, &Bytes) -> Option<JsonValue> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let respond = Arc::new(respond);

        let hits_for_server = hits.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let io = hyper_util::rt::TokioIo::new(stream);
                let respond = respond.clone();
                let hits = hits_for_server.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let respond = respond.clone();
                        let hits = hits.clone();
                        async move {
                            let (parts, body) = req.into_parts();
                            let body = body.collect().await.unwrap().to_bytes();
                            let path = parts
                                .uri
                                .path_and_query()
                                .map(|pq| pq.as_str().to_string())
                                .unwrap_or_default();
                            hits.lock()
                                .unwrap()
                                .push(format!("{} {}", parts.method, path));

                            let response = match respond(&parts.method, &path, &body) {
                                Some(json) => {
                                    Response::new(Full::new(Bytes::from(json.to_string())))
                                }
                                None => {
                                    let mut res =
                                        Response::new(Full::new(Bytes::from_static(b"{}")));
                                    *res.status_mut() = StatusCode::NOT_FOUND;
                                    res
                                }
                            };
                            Ok::<_, Infallible>(response)
                        }
                    });

                    let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await;
                });
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        MockAddon { port, hits }
    }

    fn manifest_json(catalog_ids: &[&str], manifest_version: Option<&str>) -> JsonValue {
        let catalogs: Vec<JsonValue> = catalog_ids
            .iter()
            .map(|id| serde_json::json!({"id": id, "type": "movie"}))
            .collect();
        let mut manifest = serde_json::json!({
            "types": ["movie"],
            "catalogs": catalogs,
        });
        if let Some(version) = manifest_version {
            manifest["manifestVersion"] = serde_json::json!(version);
        }
        manifest
    }

    /// Path-generation add-on: one catalog, answers `GET
    /// /catalog/movie/<id>.json` with the given metas.
    async fn start_path_addon(catalog_id: &'static str, metas: JsonValue) -> MockAddon {
        start_addon(move |method, path, _body| {
            if path == "/manifest.json" {
                return Some(manifest_json(&[catalog_id], None));
            }
            if method == Method::GET && path.starts_with(&format!("/catalog/movie/{catalog_id}.json")) {
                return Some(serde_json::json!({"metas": metas.clone()}));
            }
            None
        })
        .await
    }

    async fn build_handler(tenants: Vec<(&str, Vec<String>)>) -> RequestHandler {
        let yaml = r#"
listener: {host: "127.0.0.1", port: 7000}
admin_listener: {host: "127.0.0.1", port: 7001}
"#;
        let mut config: Config = serde_yaml::from_str(yaml).unwrap();
        config.tenants = tenants
            .into_iter()
            .map(|(name, addons)| (name.to_string(), serde_json::json!({"addons": addons})))
            .collect();

        let dispatcher = Dispatcher::new(Duration::from_secs(2));
        let registry = TenantRegistry::initialize(&config, &dispatcher).await;
        RequestHandler::new(registry, dispatcher)
    }

    fn get(path: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn post(path: &str, body: JsonValue) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn body_json(response: HandlerResponse) -> JsonValue {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_manifest_route_merges_sources() {
        let one = start_path_addon("one", serde_json::json!([])).await;
        let two = start_path_addon("two", serde_json::json!([])).await;
        let handler = build_handler(vec![("main", vec![one.base(), two.base()])]).await;

        let response = handler.handle(get("/main/manifest.json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(ACCESS_CONTROL_ALLOW_ORIGIN));

        let manifest = body_json(response).await;
        assert_eq!(manifest["manifestVersion"], "4");
        assert_eq!(manifest["id"], "manifold-main");
        let ids: Vec<&str> = manifest["catalogs"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_not_found() {
        let handler = build_handler(vec![]).await;

        let response = handler.handle(get("/nope/manifest.json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"error": "tenant not found"})
        );

        let response = handler
            .handle(post(
                "/nope/catalog",
                serde_json::json!({"type": "movie", "id": "x"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_options_short_circuits_with_cors() {
        let handler = build_handler(vec![]).await;

        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/main/catalog")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = handler.handle(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(ACCESS_CONTROL_ALLOW_ORIGIN));
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_catalog_dispatches_to_owner_only() {
        let owner = start_path_addon("cat-a", serde_json::json!([{"id": "a1"}])).await;
        let bystander = start_path_addon("cat-b", serde_json::json!([{"id": "b1"}])).await;
        let handler = build_handler(vec![("main", vec![owner.base(), bystander.base()])]).await;

        let response = handler
            .handle(post(
                "/main/catalog",
                serde_json::json!({"type": "movie", "id": "cat-a"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["metas"][0]["id"], "a1");

        assert_eq!(owner.resource_hits(), vec!["GET /catalog/movie/cat-a.json"]);
        assert!(bystander.resource_hits().is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_catalog_id_makes_no_calls() {
        let addon = start_path_addon("known", serde_json::json!([{"id": "k"}])).await;
        let handler = build_handler(vec![("main", vec![addon.base()])]).await;

        let response = handler
            .handle(post(
                "/main/catalog",
                serde_json::json!({"type": "movie", "id": "unknown"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!({"metas": []}));
        assert!(addon.resource_hits().is_empty());
    }

    #[tokio::test]
    async fn test_ambiguous_ownership_queries_all_owners() {
        let first = start_path_addon("shared", serde_json::json!([{"id": "first"}])).await;
        let second = start_path_addon("shared", serde_json::json!([{"id": "second"}])).await;
        let handler = build_handler(vec![("main", vec![first.base(), second.base()])]).await;

        let response = handler
            .handle(post(
                "/main/catalog",
                serde_json::json!({"type": "movie", "id": "shared"}),
            ))
            .await
            .unwrap();

        let body = body_json(response).await;
        let ids: Vec<&str> = body["metas"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["first", "second"]);
        assert_eq!(first.resource_hits().len(), 1);
        assert_eq!(second.resource_hits().len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_tolerates_partial_failure() {
        let one = start_addon(|method, path, _| {
            if path == "/manifest.json" {
                return Some(manifest_json(&["c1"], None));
            }
            (method == Method::GET && path.starts_with("/stream/"))
                .then(|| serde_json::json!({"streams": [{"url": "one"}]}))
        })
        .await;
        // Healthy at initialization, but every resource call it receives
        // comes back 404; its slot must stay empty without shifting the
        // neighbors.
        let flaky = start_addon(|_method, path, _| {
            (path == "/manifest.json").then(|| manifest_json(&["c2"], None))
        })
        .await;
        let two = start_addon(|method, path, _| {
            if path == "/manifest.json" {
                return Some(manifest_json(&["c3"], None));
            }
            (method == Method::GET && path.starts_with("/stream/"))
                .then(|| serde_json::json!({"streams": [{"url": "two"}]}))
        })
        .await;

        let handler = build_handler(vec![(
            "main",
            vec![one.base(), flaky.base(), two.base()],
        )])
        .await;

        let response = handler
            .handle(post(
                "/main/stream",
                serde_json::json!({"type": "movie", "id": "tt0111161"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let urls: Vec<&str> = body["streams"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["url"].as_str().unwrap())
            .collect();
        assert_eq!(urls, vec!["one", "two"]);
        // The failing source was queried like the others.
        assert_eq!(flaky.resource_hits().len(), 1);
    }

    #[tokio::test]
    async fn test_generation_equivalence_for_mixed_upstreams() {
        // One upstream per generation, both owning the same catalog id.
        let path_style = start_addon(|method, path, _| {
            if path == "/manifest.json" {
                return Some(manifest_json(&["cat1"], None));
            }
            (method == Method::GET && path == "/catalog/movie/cat1.json?skip=20")
                .then(|| serde_json::json!({"metas": [{"id": "from-path"}]}))
        })
        .await;
        let json_style = start_addon(|method, path, body| {
            if path == "/manifest.json" {
                return Some(manifest_json(&["cat1"], Some("4")));
            }
            if method == Method::POST && path == "/catalog" {
                let parsed: JsonValue = serde_json::from_slice(body).unwrap();
                assert_eq!(parsed["extra"][0]["name"], "skip");
                assert_eq!(parsed["extra"][0]["value"], "20");
                return Some(serde_json::json!({"metas": [{"id": "from-json"}]}));
            }
            None
        })
        .await;

        let handler =
            build_handler(vec![("main", vec![path_style.base(), json_style.base()])]).await;

        let via_post = handler
            .handle(post(
                "/main/catalog",
                serde_json::json!({
                    "type": "movie",
                    "id": "cat1",
                    "extra": [{"name": "skip", "value": "20"}],
                }),
            ))
            .await
            .unwrap();
        let via_get = handler
            .handle(get("/main/catalog/movie/cat1.json?skip=20"))
            .await
            .unwrap();

        let post_body = body_json(via_post).await;
        let get_body = body_json(via_get).await;
        assert_eq!(post_body, get_body);
        assert_eq!(
            post_body["metas"],
            serde_json::json!([{"id": "from-path"}, {"id": "from-json"}])
        );
    }

    #[tokio::test]
    async fn test_empty_tenant_serves_empty_everything() {
        let handler =
            build_handler(vec![("main", vec!["http://127.0.0.1:1".to_string()])]).await;

        let manifest = handler.handle(get("/main/manifest.json")).await.unwrap();
        assert_eq!(manifest.status(), StatusCode::OK);
        assert_eq!(
            body_json(manifest).await["catalogs"],
            serde_json::json!([])
        );

        for (path, key) in [
            ("/main/catalog", "metas"),
            ("/main/meta", "metas"),
            ("/main/stream", "streams"),
            ("/main/subtitles", "subtitles"),
        ] {
            let response = handler
                .handle(post(path, serde_json::json!({"type": "movie", "id": "x"})))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(body[key], serde_json::json!([]), "route {path}");
        }

        let response = handler
            .handle(get("/main/subtitles/movie/tt1.json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"subtitles": []})
        );
    }

    #[tokio::test]
    async fn test_malformed_post_body_is_bad_request() {
        let addon = start_path_addon("c", serde_json::json!([])).await;
        let handler = build_handler(vec![("main", vec![addon.base()])]).await;

        let request = Request::builder()
            .method(Method::POST)
            .uri("/main/catalog")
            .body(Full::new(Bytes::from_static(b"{not json")))
            .unwrap();
        let response = handler.handle(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_unroutable_paths_are_not_found() {
        let addon = start_path_addon("c", serde_json::json!([])).await;
        let handler = build_handler(vec![("main", vec![addon.base()])]).await;

        // meta has no path-generation encoding
        let response = handler.handle(get("/main/meta/movie/tt1.json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = handler.handle(get("/main/poster/movie/tt1.json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = handler.handle(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
