//! HTTP surface.

pub mod auth;
pub mod cart;
pub mod error;
pub mod orders;
pub mod pincodes;
pub mod products;

use std::sync::Arc;

use axum::extract::{FromRequest, Request};
use axum::http::HeaderValue;
use axum::routing::get;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use validator::Validate;

use crate::services::{CartService, CatalogService, OrderService, ZoneService};
use crate::EcommerceError;

pub use auth::{issue_token, AdminPrincipal, Principal, Role};

#[derive(Clone)]
pub struct AppState {
    pub orders: OrderService,
    pub catalog: CatalogService,
    pub carts: CartService,
    pub zones: ZoneService,
    /// HS256 key for session tokens.
    pub secret_key: Arc<str>,
}

/// JSON body that has passed its `validator` rules.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = EcommerceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| EcommerceError::Validation(rejection.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}

fn cors(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = allowed_origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
}

pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "healthy", "service": "storefront" })) }))
        .nest("/api/orders", orders::routes())
        .nest("/api/pincodes", pincodes::routes())
        .nest("/api", cart::routes().merge(products::routes()))
        .layer(TraceLayer::new_for_http())
        .layer(cors(allowed_origins))
        .with_state(state)
}
