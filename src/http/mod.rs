mod routes;
mod types;

use crate::completion::CompletionClient;
use crate::http::routes::{health, whatsapp_webhook};
use crate::relay::RelayClient;
use axum::http::{HeaderName, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::set_header::SetResponseHeaderLayer;

/// Per-process client handles, cloned into each request by axum. The
/// clients hold no exclusive resource so there is no teardown step.
#[derive(Clone)]
pub struct HttpState {
    pub completion: CompletionClient,
    pub relay: RelayClient,
}

pub fn create_app(state: HttpState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/whatsapp", post(whatsapp_webhook))
        .layer(
            ServiceBuilder::new().layer(SetResponseHeaderLayer::overriding(
                HeaderName::from_static("x-version"),
                HeaderValue::from_static(crate::VERSION),
            )),
        )
        .with_state(state)
}
