use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpResponse,
};
use futures_util::future::LocalBoxFuture;
use parking_lot::Mutex;
use shield_config::ServerConfig;
use std::{
    collections::HashMap,
    future::{ready, Ready},
    rc::Rc,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, warn};

// Entries whose window ended are pruned once the cache grows past this.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_window: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_window: 100,
            window: Duration::from_secs(15 * 60),
        }
    }
}

impl RateLimitConfig {
    pub fn from_server_config(server: &ServerConfig, enabled: bool) -> Self {
        Self {
            enabled,
            requests_per_window: server.rate_limit_requests,
            window: server.rate_limit_window,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

/// Fixed-window limiter keyed by client address.
#[derive(Clone)]
pub struct RateLimitMiddleware {
    config: RateLimitConfig,
    local_cache: Arc<Mutex<HashMap<String, RateLimitEntry>>>,
}

impl RateLimitMiddleware {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            local_cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn get_client_key(req: &ServiceRequest) -> String {
        req.connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string()
    }

    /// Count one request for `key` at `now`; false once the window is exhausted.
    pub fn check(&self, key: &str, now: Instant) -> bool {
        let mut cache = self.local_cache.lock();

        if cache.len() > PRUNE_THRESHOLD {
            let window = self.config.window;
            cache.retain(|_, entry| now.saturating_duration_since(entry.window_start) < window);
        }

        let entry = cache.entry(key.to_string()).or_insert(RateLimitEntry {
            count: 0,
            window_start: now,
        });

        if now.saturating_duration_since(entry.window_start) >= self.config.window {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count >= self.config.requests_per_window {
            return false;
        }

        entry.count += 1;
        true
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            middleware: self.clone(),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    middleware: RateLimitMiddleware,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let middleware = self.middleware.clone();
        let service = self.service.clone();

        Box::pin(async move {
            if !middleware.config.enabled {
                return service.call(req).await.map(|res| res.map_into_left_body());
            }

            let key = RateLimitMiddleware::get_client_key(&req);
            if !middleware.check(&key, Instant::now()) {
                let limit = middleware.config.requests_per_window;
                let window_secs = middleware.config.window.as_secs();
                warn!(client = %key, limit, window_secs, "Rate limit exceeded");

                let response = HttpResponse::TooManyRequests()
                    .insert_header(("X-RateLimit-Limit", limit.to_string()))
                    .insert_header(("X-RateLimit-Window", window_secs.to_string()))
                    .insert_header(("Retry-After", window_secs.to_string()))
                    .json(serde_json::json!({
                        "error": "Rate limit exceeded",
                        "message": "Too many requests from this IP, please try again later."
                    }));

                return Ok(req.into_response(response).map_into_right_body());
            }

            debug!(client = %key, "Rate limit check passed");
            service.call(req).await.map(|res| res.map_into_left_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, web, App};

    fn limiter(requests: u32, window: Duration) -> RateLimitMiddleware {
        RateLimitMiddleware::new(RateLimitConfig {
            enabled: true,
            requests_per_window: requests,
            window,
        })
    }

    #[::core::prelude::v1::test]
    fn window_exhausts_then_resets() {
        let limiter = limiter(2, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.check("10.0.0.1", start));
        assert!(limiter.check("10.0.0.1", start));
        assert!(!limiter.check("10.0.0.1", start));
        assert!(limiter.check("10.0.0.2", start));

        assert!(limiter.check("10.0.0.1", start + Duration::from_secs(61)));
    }

    #[actix_web::test]
    async fn exhausted_client_gets_429() {
        let app = test::init_service(
            App::new()
                .wrap(limiter(1, Duration::from_secs(60)))
                .route("/api/ping", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let first = test::call_service(&app, test::TestRequest::get().uri("/api/ping").to_request()).await;
        assert_eq!(first.status(), StatusCode::OK);

        let second = test::call_service(&app, test::TestRequest::get().uri("/api/ping").to_request()).await;
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers().get("X-RateLimit-Limit").unwrap(), "1");
    }

    #[actix_web::test]
    async fn disabled_limiter_passes_everything() {
        let disabled = RateLimitMiddleware::new(RateLimitConfig {
            enabled: false,
            requests_per_window: 1,
            window: Duration::from_secs(60),
        });
        let app = test::init_service(
            App::new()
                .wrap(disabled)
                .route("/api/ping", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        for _ in 0..3 {
            let resp = test::call_service(&app, test::TestRequest::get().uri("/api/ping").to_request()).await;
            assert_eq!(resp.status(), StatusCode::OK);
        }
    }
}
