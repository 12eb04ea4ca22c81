pub mod admin;
pub mod alerts;
pub mod auth;
pub mod security;

use actix_web::{web, HttpRequest};
use shield_middleware::{extract_claims_from_request, RateLimitMiddleware};
use shield_models::{Account, Claims};

use crate::auth::ClientInfo;
use crate::errors::{ServiceError, ServiceResult};
use crate::state::AppState;

/// Mount every route. `/api` sits behind the per-client rate limiter.
pub fn configure(cfg: &mut web::ServiceConfig, limiter: RateLimitMiddleware) {
    cfg.route("/health", web::get().to(security::health)).service(
        web::scope("/api")
            .configure(auth::configure)
            .configure(alerts::configure)
            .configure(security::configure)
            .configure(admin::configure)
            .wrap(limiter),
    );
}

pub(crate) fn client_info(req: &HttpRequest) -> ClientInfo {
    let source_address = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string();
    let user_agent = req
        .headers()
        .get("User-Agent")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);
    ClientInfo::new(source_address, user_agent)
}

pub(crate) fn claims(req: &HttpRequest) -> ServiceResult<Claims> {
    extract_claims_from_request(req).ok_or_else(|| ServiceError::Unauthorized("Authentication required".to_string()))
}

/// The active account behind the request's token.
pub(crate) async fn current_account(state: &AppState, req: &HttpRequest) -> ServiceResult<Account> {
    let claims = claims(req)?;
    state.auth.authenticated_account(&claims).await
}
