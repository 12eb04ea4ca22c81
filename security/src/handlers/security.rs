use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use shield_models::EventFilter;
use uuid::Uuid;

use super::current_account;
use crate::errors::{ServiceError, ServiceResult};
use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/security")
            .route("/dashboard", web::get().to(dashboard))
            .route("/logs", web::get().to(logs))
            .route("/logs/{id}/resolve", web::patch().to(resolve_log))
            .route("/firewall", web::get().to(firewall))
            .route("/health", web::get().to(health)),
    );
}

pub async fn dashboard(state: web::Data<AppState>, req: HttpRequest) -> ServiceResult<HttpResponse> {
    current_account(&state, &req).await?;
    let stats = state.security.dashboard(Utc::now()).await?;
    Ok(HttpResponse::Ok().json(stats))
}

pub async fn logs(
    state: web::Data<AppState>,
    query: web::Query<EventFilter>,
    req: HttpRequest,
) -> ServiceResult<HttpResponse> {
    current_account(&state, &req).await?;
    let events = state.security.logs(&query).await?;
    Ok(HttpResponse::Ok().json(events))
}

pub async fn resolve_log(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: HttpRequest,
) -> ServiceResult<HttpResponse> {
    let account = current_account(&state, &req).await?;
    if !account.is_admin() {
        return Err(ServiceError::Forbidden("admin access required".to_string()));
    }
    let event = state.security.resolve_event(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(event))
}

pub async fn firewall(state: web::Data<AppState>, req: HttpRequest) -> ServiceResult<HttpResponse> {
    current_account(&state, &req).await?;
    let status = state.security.firewall(Utc::now()).await?;
    Ok(HttpResponse::Ok().json(status))
}

/// Public: no token required.
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.security.health(Utc::now()).await)
}
