use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};
use serde_json::json;
use shield_models::{LoginRequest, RegisterRequest};

use super::{claims, client_info};
use crate::auth::{LoginResult, ACCOUNT_LOCKED};
use crate::errors::ServiceResult;
use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/me", web::get().to(me)),
    );
}

pub async fn register(
    state: web::Data<AppState>,
    request: web::Json<RegisterRequest>,
    req: HttpRequest,
) -> ServiceResult<HttpResponse> {
    let response = state.auth.register(request.into_inner(), &client_info(&req)).await?;
    Ok(HttpResponse::Created().json(response))
}

pub async fn login(
    state: web::Data<AppState>,
    request: web::Json<LoginRequest>,
    req: HttpRequest,
) -> ServiceResult<HttpResponse> {
    match state.auth.login(request.into_inner(), &client_info(&req)).await? {
        LoginResult::Authenticated(response) => Ok(HttpResponse::Ok().json(response)),
        LoginResult::Locked { .. } => Ok(HttpResponse::build(StatusCode::LOCKED).json(json!({
            "error": "account_locked",
            "message": ACCOUNT_LOCKED,
        }))),
    }
}

pub async fn me(state: web::Data<AppState>, req: HttpRequest) -> ServiceResult<HttpResponse> {
    let profile = state.auth.me(&claims(&req)?).await?;
    Ok(HttpResponse::Ok().json(profile))
}
