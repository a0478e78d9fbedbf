// src/server/handler.rs
use crate::orchestrator::{EngineError, Orchestrator};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::Serialize;
use std::convert::Infallible;
use tower::Service;
use tracing::{debug, error, info_span, Instrument};

/// Serves `GET /health[/{module}[/{check}]][?nocache=1]`.
#[derive(Clone)]
pub struct HealthHandler {
    orchestrator: Orchestrator,
}

/// What a request path and query select.
#[derive(Debug, PartialEq, Eq)]
struct HealthQuery {
    module: String,
    check: String,
    no_cache: bool,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl HealthHandler {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let request_id = uuid::Uuid::new_v4();
        let span = info_span!(
            "health_request",
            %request_id,
            method = %req.method(),
            path = %req.uri().path(),
        );

        async move {
            if req.method() != Method::GET {
                return error_response(StatusCode::METHOD_NOT_ALLOWED, "only GET is supported");
            }

            let query = match parse_request(req.uri().path(), req.uri().query()) {
                Ok(Some(query)) => query,
                Ok(None) => return error_response(StatusCode::NOT_FOUND, "not found"),
                Err(message) => return error_response(StatusCode::BAD_REQUEST, &message),
            };

            match self
                .orchestrator
                .health_checks(&query.module, &query.check, query.no_cache)
                .await
            {
                Ok(response) => {
                    debug!("Answered with status {}", response.status);
                    json_response(StatusCode::OK, &response)
                }
                Err(EngineError::Validation(e)) => {
                    debug!("Rejected request: {}", e);
                    error_response(StatusCode::BAD_REQUEST, &e.to_string())
                }
                Err(e) => {
                    error!("Health request failed: {}", e);
                    error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
                }
            }
        }
        .instrument(span)
        .await
    }
}

impl Service<Request<Body>> for HealthHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move { Ok(handler.handle(req).await) })
    }
}

/// `Ok(None)` for paths outside `/health`.
fn parse_request(path: &str, query: Option<&str>) -> Result<Option<HealthQuery>, String> {
    let rest = match path.strip_prefix("/health") {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return Ok(None),
    };

    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
    let (module, check) = match segments.as_slice() {
        [] => ("", ""),
        [module] => (*module, ""),
        [module, check] => (*module, *check),
        _ => return Ok(None),
    };

    let mut no_cache = false;
    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if key == "nocache" {
                no_cache = match value.as_ref() {
                    "1" | "true" => true,
                    "0" | "false" | "" => false,
                    other => return Err(format!("invalid nocache value {:?}", other)),
                };
            }
        }
    }

    Ok(Some(HealthQuery {
        module: module.to_string(),
        check: check.to_string(),
        no_cache,
    }))
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            let mut response = Response::new(Body::from("internal error"));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response<Body> {
    json_response(status, &ErrorBody { error: message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{HealthResponse, HealthStatus};
    use crate::registry::{Checker, CheckerRegistry, ProbeError, ProbeOutcome};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct DownChecker {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Checker for DownChecker {
        async fn probe(&self, check: &str) -> Result<ProbeOutcome, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match check {
                "ping" => Ok(ProbeOutcome::ok(serde_json::json!({ "pong": true }))),
                _ => Ok(ProbeOutcome::new(
                    HealthStatus::Ko,
                    serde_json::json!({ "reason": "index red" }),
                )),
            }
        }

        fn kind(&self) -> &'static str {
            "down"
        }
    }

    fn handler() -> (Arc<DownChecker>, HealthHandler) {
        let checker = Arc::new(DownChecker {
            calls: AtomicUsize::new(0),
        });
        let registry = CheckerRegistry::new().register(
            "search",
            vec!["ping".to_string(), "index".to_string()],
            Duration::from_secs(60),
            checker.clone(),
        );
        let orchestrator = Orchestrator::new(registry, Arc::new(MemoryStore::new("i1")));
        (checker, HealthHandler::new(orchestrator))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    async fn body_of(response: Response<Body>) -> serde_json::Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_parse_paths() {
        let parsed = parse_request("/health/search/ping", Some("nocache=1")).unwrap();
        assert_eq!(
            parsed,
            Some(HealthQuery {
                module: "search".to_string(),
                check: "ping".to_string(),
                no_cache: true,
            })
        );

        let all = parse_request("/health", None).unwrap().unwrap();
        assert_eq!((all.module.as_str(), all.check.as_str(), all.no_cache), ("", "", false));

        assert_eq!(parse_request("/healthz", None), Ok(None));
        assert_eq!(parse_request("/health/a/b/c", None), Ok(None));
        assert!(parse_request("/health/search", Some("nocache=maybe")).is_err());
    }

    #[tokio::test]
    async fn test_unhealthy_dependency_is_still_200() {
        let (_, handler) = handler();

        let response = handler.handle(get("/health/search")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let body: HealthResponse = serde_json::from_value(body_of(response).await).unwrap();
        assert_eq!(body.status, HealthStatus::Ko);
        assert_eq!(body.modules[0].checks.len(), 2);
    }

    #[tokio::test]
    async fn test_nocache_forces_probe() {
        let (checker, handler) = handler();

        handler.handle(get("/health/search/ping")).await;
        handler.handle(get("/health/search/ping")).await;
        assert_eq!(checker.calls.load(Ordering::SeqCst), 1);

        handler.handle(get("/health/search/ping?nocache=true")).await;
        assert_eq!(checker.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_check_is_bad_request() {
        let (checker, handler) = handler();

        let response = handler.handle(get("/health/search/nextid")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_of(response).await;
        assert!(body["error"].as_str().unwrap().contains("nextid"));
        assert_eq!(checker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_routing_errors() {
        let (_, handler) = handler();

        let response = handler.handle(get("/status")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let post = Request::post("/health").body(Body::empty()).unwrap();
        let response = handler.handle(post).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
