//! gRPC Tracing Interceptor
//!
//! Tower middleware wrapped around the driver-facing tonic server. Every
//! unary call gets a span carrying the service, method and a request id, and
//! one log line with its duration and gRPC status when it completes.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tonic::codegen::http::{HeaderMap, Request, Response};
use tower::{Layer, Service};
use tracing::{info, info_span, warn, Instrument, Span};

/// Tower layer that logs every gRPC call
#[derive(Debug, Clone, Default)]
pub struct GrpcTracingLayer;

impl GrpcTracingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for GrpcTracingLayer {
    type Service = GrpcTracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GrpcTracingService { inner }
    }
}

/// Service wrapper created by [`GrpcTracingLayer`]
#[derive(Debug, Clone)]
pub struct GrpcTracingService<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for GrpcTracingService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::fmt::Display,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let (service, method) = parse_grpc_path(request.uri().path());
        let span = create_grpc_span(&service, &method);

        // Take the service that was driven to readiness, leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = inner.call(request).await;
                let duration_ms = start.elapsed().as_millis() as u64;

                match &result {
                    Ok(response) => {
                        let code = grpc_status(response.headers());
                        Span::current().record("grpc.code", code.as_str());
                        if code == "0" {
                            info!(duration_ms, grpc_code = %code, "gRPC call completed");
                        } else {
                            warn!(duration_ms, grpc_code = %code, "gRPC call failed");
                        }
                    }
                    Err(e) => {
                        warn!(duration_ms, error = %e, "gRPC call errored in transport");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}

/// Parse gRPC path into service and method names
///
/// gRPC paths are formatted as `/package.ServiceName/MethodName`
fn parse_grpc_path(path: &str) -> (String, String) {
    let parts: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    match parts.as_slice() {
        [service, method] => (service.to_string(), method.to_string()),
        [single] if !single.is_empty() => (single.to_string(), "unknown".to_string()),
        _ => ("unknown".to_string(), "unknown".to_string()),
    }
}

/// Status of a trailers-only response; successful unary responses carry it
/// in trailers, which are not visible here.
fn grpc_status(headers: &HeaderMap) -> String {
    headers
        .get("grpc-status")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("0")
        .to_string()
}

fn create_grpc_span(service: &str, method: &str) -> Span {
    info_span!(
        "grpc.server",
        rpc.service = %service,
        rpc.method = %method,
        request_id = %uuid::Uuid::new_v4(),
        grpc.code = tracing::field::Empty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tonic::codegen::http::HeaderValue;
    use tracing_test::traced_test;

    #[test]
    fn test_parse_grpc_path_standard() {
        let (service, method) = parse_grpc_path("/v1alpha1.CSIDriverProvider/Mount");
        assert_eq!(service, "v1alpha1.CSIDriverProvider");
        assert_eq!(method, "Mount");
    }

    #[test]
    fn test_parse_grpc_path_empty() {
        let (service, method) = parse_grpc_path("/");
        assert_eq!(service, "unknown");
        assert_eq!(method, "unknown");
    }

    #[test]
    fn test_parse_grpc_path_single_component() {
        let (service, method) = parse_grpc_path("/ServiceOnly");
        assert_eq!(service, "ServiceOnly");
        assert_eq!(method, "unknown");
    }

    #[test]
    fn test_grpc_status_defaults_to_ok() {
        let mut headers = HeaderMap::new();
        assert_eq!(grpc_status(&headers), "0");

        headers.insert("grpc-status", HeaderValue::from_static("16"));
        assert_eq!(grpc_status(&headers), "16");
    }

    #[derive(Clone)]
    struct StatusService(&'static str);

    impl Service<Request<()>> for StatusService {
        type Response = Response<()>;
        type Error = Infallible;
        type Future = std::future::Ready<Result<Response<()>, Infallible>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _request: Request<()>) -> Self::Future {
            let mut response = Response::new(());
            response.headers_mut().insert("grpc-status", HeaderValue::from_static(self.0));
            std::future::ready(Ok(response))
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_layer_logs_failed_call() {
        let mut service = GrpcTracingLayer::new().layer(StatusService("5"));

        let request = Request::builder()
            .uri("/v1alpha1.CSIDriverProvider/Mount")
            .body(())
            .unwrap();
        service.call(request).await.unwrap();

        assert!(logs_contain("gRPC call failed"));
        assert!(logs_contain("grpc_code=5"));
    }
}
