//! HTTP mapping for [`EcommerceError`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::EcommerceError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl EcommerceError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::EmptyCart | Self::InvalidTransition(_) => StatusCode::BAD_REQUEST,
            Self::SignatureInvalid | Self::WebhookSignatureInvalid => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound { .. } | Self::ProductNotFound(_) => StatusCode::NOT_FOUND,
            Self::InsufficientStock { .. } | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::EmptyCart => "EMPTY_CART",
            Self::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::WebhookSignatureInvalid => "WEBHOOK_SIGNATURE_INVALID",
            Self::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            Self::Conflict(_) => "CONFLICT",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }
}

impl IntoResponse for EcommerceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, details) = match &self {
            Self::Persistence(cause) => {
                tracing::error!(error = %cause, "storage failure");
                ("Internal server error".to_string(), None)
            }
            Self::GatewayUnavailable(cause) => {
                tracing::error!(error = %cause, "payment gateway call failed");
                ("Payment gateway unavailable".to_string(), None)
            }
            Self::InsufficientStock { product_id, available, requested } => (
                self.to_string(),
                Some(json!({ "productId": product_id, "available": available, "requested": requested })),
            ),
            Self::WebhookSignatureInvalid => {
                tracing::warn!("webhook signature verification failed");
                (self.to_string(), None)
            }
            _ => (self.to_string(), None),
        };
        let body = ErrorBody { success: false, code: self.code(), message, details };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{OrderError, OrderStatus};
    use crate::domain::value_objects::ProductCode;

    #[test]
    fn test_status_mapping() {
        let stock = EcommerceError::InsufficientStock { product_id: ProductCode::new("P1").unwrap(), available: 1, requested: 2 };
        assert_eq!(stock.status(), StatusCode::CONFLICT);
        let transition = EcommerceError::from(OrderError::InvalidTransition { from: OrderStatus::Shipped, to: OrderStatus::Cancelled });
        assert_eq!(transition.status(), StatusCode::BAD_REQUEST);
        assert_eq!(EcommerceError::GatewayUnavailable("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(EcommerceError::not_found("Order", "ORD1").status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_persistence_detail_is_hidden() {
        let response = EcommerceError::Persistence("relation \"orders\" does not exist".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
