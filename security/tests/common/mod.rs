#![allow(dead_code)]

use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::test;
use async_trait::async_trait;
use serde_json::{json, Value};
use shield_config::{feature_toggles::FeatureToggles, AppConfig};
use shield_database::MemoryStore;
use shield_security::{AppState, NotificationMessage, NotificationTransport, TransportError};
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const PASSWORD: &str = "correct horse";
pub const ADMIN_EMAIL: &str = "root@example.com";

/// Build the service the way `main` does, minus CORS and request logging.
macro_rules! init_app {
    ($state:expr) => {{
        let state: shield_security::AppState = $state;
        let limiter = state.rate_limiter();
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new(state.clone()))
                .wrap(shield_middleware::AuthMiddlewareFactory::new(state.keys.clone()))
                .configure(|cfg| shield_security::handlers::configure(cfg, limiter)),
        )
        .await
    }};
}

/// Counts notifications instead of sending them.
#[derive(Default)]
pub struct RecordingTransport {
    sends: AtomicUsize,
}

impl RecordingTransport {
    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    async fn send(&self, _message: &NotificationMessage) -> Result<(), TransportError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub transport: Arc<RecordingTransport>,
    pub state: AppState,
}

pub fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.bcrypt_cost = 4;
    config.auth.admin_emails = vec![ADMIN_EMAIL.to_string()];
    config.feature_toggles = FeatureToggles::default().with_flag("RateLimiting", false);
    config
}

pub fn harness() -> Harness {
    harness_with(config())
}

pub fn harness_with(config: AppConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::default());
    let state = AppState::with_transport(&config, store.clone(), transport.clone());
    Harness { store, transport, state }
}

/// Call the app and decode the JSON body (`Null` when empty).
pub async fn send<S, R, B, E>(app: &S, req: R) -> (StatusCode, Value)
where
    S: Service<R, Response = ServiceResponse<B>, Error = E>,
    B: MessageBody,
    E: Debug,
{
    let resp = test::call_service(app, req).await;
    let status = resp.status();
    let body = test::read_body(resp).await;
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

pub fn register_req(username: &str, email: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/auth/register")
        .insert_header(("X-Forwarded-For", "192.0.2.10"))
        .set_json(json!({ "username": username, "email": email, "password": PASSWORD }))
}

pub fn login_req(email: &str, password: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/auth/login")
        .insert_header(("X-Forwarded-For", "192.0.2.10"))
        .set_json(json!({ "email": email, "password": password }))
}

pub fn token_of(body: &Value) -> String {
    body["token"].as_str().expect("token in response").to_string()
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}
