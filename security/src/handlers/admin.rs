use actix_web::{web, HttpRequest, HttpResponse};
use shield_middleware::RoleAuthMiddlewareFactory;
use uuid::Uuid;

use super::current_account;
use crate::errors::ServiceResult;
use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .route("/accounts/{id}/unlock", web::post().to(unlock_account))
            .wrap(RoleAuthMiddlewareFactory::admin()),
    );
}

pub async fn unlock_account(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: HttpRequest,
) -> ServiceResult<HttpResponse> {
    let admin = current_account(&state, &req).await?;
    let id = path.into_inner();
    tracing::info!(admin_id = %admin.id, account_id = %id, "Unlocking account");

    let profile = state.auth.unlock(id).await?;
    Ok(HttpResponse::Ok().json(profile))
}
