use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error as ActixError, HttpMessage, HttpRequest, HttpResponse,
};
use futures_util::future::LocalBoxFuture;
use serde_json::json;
use shield_models::{Claims, UserRole};
use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

use crate::token::JwtKeys;

pub struct AuthMiddleware<S> {
    service: Rc<S>,
    keys: Arc<JwtKeys>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let keys = Arc::clone(&self.keys);

        Box::pin(async move {
            if is_public_endpoint(req.path()) {
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            }

            let token = req
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(str::to_string);

            let Some(token) = token else {
                return Ok(req
                    .into_response(HttpResponse::Unauthorized().json(json!({
                        "error": "Authentication required",
                        "message": "No authentication token provided"
                    })))
                    .map_into_right_body());
            };

            match keys.verify(&token) {
                Ok(claims) => {
                    req.extensions_mut().insert(claims);
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(e) => {
                    tracing::warn!(path = %req.path(), error = %e, "JWT verification failed");
                    Ok(req
                        .into_response(HttpResponse::Unauthorized().json(json!({
                            "error": "Invalid or expired token",
                            "message": e.to_string()
                        })))
                        .map_into_right_body())
                }
            }
        })
    }
}

#[derive(Clone)]
pub struct AuthMiddlewareFactory {
    keys: Arc<JwtKeys>,
}

impl AuthMiddlewareFactory {
    pub fn new(keys: Arc<JwtKeys>) -> Self {
        Self { keys }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = ActixError;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddleware {
            service: Rc::new(service),
            keys: Arc::clone(&self.keys),
        }))
    }
}

/// Endpoints reachable without a bearer token.
pub fn is_public_endpoint(path: &str) -> bool {
    const PUBLIC_PATHS: [&str; 4] = [
        "/health",
        "/api/auth/login",
        "/api/auth/register",
        "/api/security/health",
    ];

    PUBLIC_PATHS.iter().any(|&public| path == public)
}

pub fn extract_token_from_request(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|s| s.to_string())
}

pub fn extract_claims_from_request(req: &HttpRequest) -> Option<Claims> {
    req.extensions().get::<Claims>().cloned()
}

pub fn extract_account_id_from_request(req: &HttpRequest) -> Option<Uuid> {
    extract_claims_from_request(req)?.account_id()
}

// Role-based authorization; must run inside `AuthMiddlewareFactory`.
pub struct RoleAuthMiddleware<S> {
    service: Rc<S>,
    required_role: UserRole,
}

impl<S, B> Service<ServiceRequest> for RoleAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let required_role = self.required_role;

        Box::pin(async move {
            let role = req.extensions().get::<Claims>().map(|claims| claims.role);

            match role {
                Some(role) if role == required_role || role == UserRole::Admin => {
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Some(_) => Ok(req
                    .into_response(HttpResponse::Forbidden().json(json!({
                        "error": "Insufficient permissions",
                        "message": format!("{} access required", required_role)
                    })))
                    .map_into_right_body()),
                None => Ok(req
                    .into_response(HttpResponse::Unauthorized().json(json!({
                        "error": "Authentication required",
                        "message": "No authentication token provided"
                    })))
                    .map_into_right_body()),
            }
        })
    }
}

pub struct RoleAuthMiddlewareFactory {
    required_role: UserRole,
}

impl RoleAuthMiddlewareFactory {
    pub fn new(required_role: UserRole) -> Self {
        Self { required_role }
    }

    pub fn admin() -> Self {
        Self::new(UserRole::Admin)
    }
}

impl<S, B> Transform<S, ServiceRequest> for RoleAuthMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = ActixError;
    type Transform = RoleAuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RoleAuthMiddleware {
            service: Rc::new(service),
            required_role: self.required_role,
        }))
    }
}
