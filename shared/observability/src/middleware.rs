//! HTTP middleware for request/response logging.
//!
//! Every request gets a request id: the inbound `x-request-id` header when
//! present, otherwise a fresh UUID. The id is stored in the request extensions,
//! attached to the request span and echoed on the response.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpMessage,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    rc::Rc,
    time::Instant,
};
use tracing::{error, info, span, warn, Instrument, Level};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request id assigned by [`ObservabilityMiddleware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Configuration for observability middleware
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Service name for log attribution
    pub service_name: String,
    /// Paths to exclude from logging (e.g., /health)
    pub exclude_paths: Vec<String>,
    /// Threshold in ms for slow request warnings
    pub slow_request_threshold_ms: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "cyber-security-shield".to_string(),
            exclude_paths: vec!["/health".to_string(), "/favicon.ico".to_string()],
            slow_request_threshold_ms: 1000,
        }
    }
}

impl ObservabilityConfig {
    pub fn for_service(name: impl Into<String>) -> Self {
        Self {
            service_name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_slow_threshold(mut self, ms: u64) -> Self {
        self.slow_request_threshold_ms = ms;
        self
    }

    pub fn exclude_path(mut self, path: impl Into<String>) -> Self {
        self.exclude_paths.push(path.into());
        self
    }
}

/// Observability middleware for actix-web
#[derive(Clone)]
pub struct ObservabilityMiddleware {
    config: ObservabilityConfig,
}

impl ObservabilityMiddleware {
    pub fn new(config: ObservabilityConfig) -> Self {
        Self { config }
    }

    pub fn for_service(name: impl Into<String>) -> Self {
        Self::new(ObservabilityConfig::for_service(name))
    }
}

impl<S, B> Transform<S, ServiceRequest> for ObservabilityMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ObservabilityMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ObservabilityMiddlewareService {
            service: Rc::new(service),
            config: self.config.clone(),
        }))
    }
}

pub struct ObservabilityMiddlewareService<S> {
    service: Rc<S>,
    config: ObservabilityConfig,
}

fn request_id_from(req: &ServiceRequest) -> String {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

impl<S, B> Service<ServiceRequest> for ObservabilityMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let config = self.config.clone();
        let service = self.service.clone();

        Box::pin(async move {
            let path = req.path().to_string();
            let method = req.method().to_string();
            let excluded = config.exclude_paths.iter().any(|p| path.starts_with(p));

            let request_id = request_id_from(&req);
            req.extensions_mut().insert(RequestId(request_id.clone()));

            let remote_ip = req
                .connection_info()
                .realip_remote_addr()
                .unwrap_or("unknown")
                .to_string();

            let request_span = span!(
                Level::INFO,
                "http_request",
                request_id = %request_id,
                method = %method,
                path = %path,
                service = %config.service_name,
            );

            let start = Instant::now();
            let result = service.call(req).instrument(request_span).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(mut res) => {
                    if let Ok(value) = HeaderValue::from_str(&request_id) {
                        res.headers_mut()
                            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                    }

                    if excluded {
                        return Ok(res);
                    }

                    let status_code = res.status().as_u16();
                    if status_code >= 500 {
                        error!(request_id = %request_id, remote_ip = %remote_ip, status = status_code, duration_ms,
                            "← {} {} {} {}ms", method, path, status_code, duration_ms);
                    } else if status_code >= 400 {
                        warn!(request_id = %request_id, remote_ip = %remote_ip, status = status_code, duration_ms,
                            "← {} {} {} {}ms", method, path, status_code, duration_ms);
                    } else if duration_ms > config.slow_request_threshold_ms {
                        warn!(request_id = %request_id, remote_ip = %remote_ip, status = status_code, duration_ms,
                            "← SLOW {} {} {} {}ms", method, path, status_code, duration_ms);
                    } else {
                        info!(request_id = %request_id, remote_ip = %remote_ip, status = status_code, duration_ms,
                            "← {} {} {} {}ms", method, path, status_code, duration_ms);
                    }

                    Ok(res)
                }
                Err(e) => {
                    error!(request_id = %request_id, duration_ms, error = %e,
                        "← {} {} ERROR {}ms", method, path, duration_ms);
                    Err(e)
                }
            }
        })
    }
}

/// Helper to create observability middleware for a service
pub fn observability(service_name: impl Into<String>) -> ObservabilityMiddleware {
    ObservabilityMiddleware::for_service(service_name)
}

/// Request id of the current request, if the middleware ran.
pub fn request_id(req: &actix_web::HttpRequest) -> Option<String> {
    req.extensions().get::<RequestId>().map(|id| id.0.clone())
}
