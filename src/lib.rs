//! Storefront backend
//!
//! Product catalog with stock tracking, carts, an order pipeline with
//! payment-gateway integration, and pincode-based delivery lookup.
//!
//! ## Layout
//! - [`domain`]: aggregates, value objects, events and the order state machine
//! - [`services`]: pricing, stock reservation, order lifecycle, catalog/cart/zone use cases
//! - [`payment`]: gateway client, payment signature and webhook verification
//! - [`store`]: persistence seam with Postgres and in-memory implementations
//! - [`api`]: axum routes, authentication extractors, error responses

pub mod api;
pub mod config;
pub mod domain;
pub mod payment;
pub mod publisher;
pub mod services;
pub mod store;

use thiserror::Error;

use crate::domain::aggregates::OrderError;
use crate::domain::value_objects::{AmountOverflow, CodeError, ProductCode};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("{0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Product {0} not found")]
    ProductNotFound(ProductCode),

    #[error("Insufficient stock for {product_id}. Available: {available}, Requested: {requested}")]
    InsufficientStock { product_id: ProductCode, available: u32, requested: u32 },

    #[error(transparent)]
    InvalidTransition(#[from] OrderError),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Payment verification failed")]
    SignatureInvalid,

    #[error("Invalid webhook signature")]
    WebhookSignatureInvalid,

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Persistence(String),
}

impl EcommerceError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }
}

impl From<sqlx::Error> for EcommerceError {
    fn from(e: sqlx::Error) -> Self { Self::Persistence(e.to_string()) }
}

impl From<CodeError> for EcommerceError {
    fn from(e: CodeError) -> Self { Self::Validation(e.to_string()) }
}

impl From<AmountOverflow> for EcommerceError {
    fn from(e: AmountOverflow) -> Self { Self::Validation(e.to_string()) }
}

impl From<validator::ValidationErrors> for EcommerceError {
    fn from(e: validator::ValidationErrors) -> Self { Self::Validation(e.to_string()) }
}

pub type Result<T> = std::result::Result<T, EcommerceError>;
