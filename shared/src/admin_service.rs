use crate::http::text_response;
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Health/readiness endpoints served on the admin listener.
///
/// `/health` answers as soon as the listener is up; `/ready` flips to 200
/// once the owning service stores `true` into the shared flag.
pub struct AdminService<E> {
    ready: Arc<AtomicBool>,
    _error: PhantomData<E>,
}

impl<E> AdminService<E> {
    pub fn new(ready: Arc<AtomicBool>) -> Self {
        Self {
            ready,
            _error: PhantomData,
        }
    }
}

fn admin_response<E: 'static>(path: &str, ready: bool) -> Response<BoxBody<Bytes, E>> {
    match path {
        "/health" => text_response(StatusCode::OK, "ok\n"),
        "/ready" if ready => text_response(StatusCode::OK, "ok\n"),
        "/ready" => text_response(StatusCode::SERVICE_UNAVAILABLE, "starting\n"),
        _ => text_response(StatusCode::NOT_FOUND, ""),
    }
}

impl<E> Service<Request<Incoming>> for AdminService<E>
where
    E: Send + Sync + 'static,
{
    type Response = Response<BoxBody<Bytes, E>>;
    type Error = E;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let ready = self.ready.load(Ordering::Acquire);
        let path = req.uri().path().to_string();

        Box::pin(async move { Ok(admin_response(&path, ready)) })
    }
}
