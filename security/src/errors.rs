use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use shield_database::StoreError;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Notification transport failed: {0}")]
    TransportFailure(String),

    #[error("{0}")]
    InvalidTransition(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServiceError {
    fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation_error",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::StoreUnavailable(_) => "store_unavailable",
            ServiceError::TransportFailure(_) => "transport_failure",
            ServiceError::InvalidTransition(_) => "invalid_transition",
            ServiceError::Unauthorized(_) => "unauthorized",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::Internal(_) => "internal_error",
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, .. } => ServiceError::NotFound(entity.to_string()),
            StoreError::Conflict(message) => ServiceError::Conflict(message),
            StoreError::Unavailable(e) => ServiceError::StoreUnavailable(e.to_string()),
            StoreError::Migration(e) => ServiceError::StoreUnavailable(e.to_string()),
            StoreError::Serialization(e) => ServiceError::Internal(e.to_string()),
            StoreError::InvalidRow(message) => ServiceError::Internal(message),
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("Invalid value for {}", field),
                })
            })
            .collect();
        messages.sort();
        ServiceError::Validation(messages.join("; "))
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::TransportFailure(_) => StatusCode::BAD_GATEWAY,
            ServiceError::InvalidTransition(_) => StatusCode::CONFLICT,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        HttpResponse::build(self.status_code()).json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn store_errors_map_to_http_statuses() {
        let not_found: ServiceError = StoreError::not_found("Alert", Uuid::new_v4()).into();
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.to_string(), "Alert not found");

        let unavailable: ServiceError = StoreError::Unavailable(shield_database::sqlx::Error::PoolClosed).into();
        assert_eq!(unavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let conflict: ServiceError = StoreError::Conflict("taken".into()).into();
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn invalid_transition_is_conflict() {
        let err = ServiceError::InvalidTransition("Alert is already resolved".into());
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
