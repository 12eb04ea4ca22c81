use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use shield_models::{AlertFilter, CreateAlertRequest};
use uuid::Uuid;
use validator::Validate;

use super::current_account;
use crate::errors::ServiceResult;
use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/alerts")
            .route("", web::get().to(list_alerts))
            .route("", web::post().to(create_alert))
            .route("/stats", web::get().to(alert_stats))
            .route("/{id}", web::get().to(get_alert))
            .route("/{id}/acknowledge", web::patch().to(acknowledge_alert))
            .route("/{id}/resolve", web::patch().to(resolve_alert)),
    );
}

pub async fn list_alerts(
    state: web::Data<AppState>,
    query: web::Query<AlertFilter>,
    req: HttpRequest,
) -> ServiceResult<HttpResponse> {
    current_account(&state, &req).await?;
    let alerts = state.alerts.list(&query).await?;
    Ok(HttpResponse::Ok().json(alerts))
}

pub async fn create_alert(
    state: web::Data<AppState>,
    request: web::Json<CreateAlertRequest>,
    req: HttpRequest,
) -> ServiceResult<HttpResponse> {
    let account = current_account(&state, &req).await?;
    let request = request.into_inner();
    request.validate()?;

    let alert = state.alerts.create_alert(request.into()).await?;
    tracing::info!(alert_id = %alert.id, account_id = %account.id, "Alert raised via API");
    Ok(HttpResponse::Created().json(alert))
}

pub async fn alert_stats(state: web::Data<AppState>, req: HttpRequest) -> ServiceResult<HttpResponse> {
    current_account(&state, &req).await?;
    let stats = state.alerts.stats(Utc::now()).await?;
    Ok(HttpResponse::Ok().json(stats))
}

pub async fn get_alert(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: HttpRequest,
) -> ServiceResult<HttpResponse> {
    current_account(&state, &req).await?;
    let alert = state.alerts.get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(alert))
}

pub async fn acknowledge_alert(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: HttpRequest,
) -> ServiceResult<HttpResponse> {
    current_account(&state, &req).await?;
    let alert = state.alerts.acknowledge(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(alert))
}

pub async fn resolve_alert(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: HttpRequest,
) -> ServiceResult<HttpResponse> {
    current_account(&state, &req).await?;
    let alert = state.alerts.resolve(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(alert))
}
