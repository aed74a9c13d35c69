//! `/api/cart` routes. Every response carries the cart joined with its products.

use axum::extract::{Path, State};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::{AppState, Principal, ValidatedJson};
use crate::domain::aggregates::Cart;
use crate::domain::value_objects::ProductCode;
use crate::services::cart::CartLine;
use crate::Result;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(get_cart))
        .route("/cart/add", post(add_item))
        .route("/cart/update", patch(update_item))
        .route("/cart/remove/:product_id", delete(remove_item))
        .route("/cart/clear", delete(clear_cart))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: ProductCode,
    #[validate(range(min = 1, max = 1000, message = "quantity must be between 1 and 1000"))]
    pub quantity: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    pub product_id: ProductCode,
    #[validate(range(min = 1, max = 1000, message = "quantity must be between 1 and 1000"))]
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    items: Vec<CartLine>,
}

async fn respond(state: &AppState, cart: &Cart, message: Option<&'static str>) -> Result<Json<CartResponse>> {
    Ok(Json(CartResponse { message, items: state.carts.lines(cart).await? }))
}

async fn get_cart(State(state): State<AppState>, principal: Principal) -> Result<Json<CartResponse>> {
    let cart = state.carts.cart(principal.id).await?;
    respond(&state, &cart, None).await
}

async fn add_item(
    State(state): State<AppState>,
    principal: Principal,
    ValidatedJson(req): ValidatedJson<AddItemRequest>,
) -> Result<Json<CartResponse>> {
    let cart = state.carts.add(principal.id, req.product_id, req.quantity).await?;
    respond(&state, &cart, Some("Item added to cart")).await
}

async fn update_item(
    State(state): State<AppState>,
    principal: Principal,
    ValidatedJson(req): ValidatedJson<UpdateItemRequest>,
) -> Result<Json<CartResponse>> {
    let cart = state.carts.update_quantity(principal.id, &req.product_id, req.quantity).await?;
    respond(&state, &cart, Some("Cart updated")).await
}

async fn remove_item(State(state): State<AppState>, principal: Principal, Path(product_id): Path<String>) -> Result<Json<CartResponse>> {
    let cart = state.carts.remove(principal.id, &ProductCode::new(product_id)?).await?;
    respond(&state, &cart, Some("Item removed from cart")).await
}

async fn clear_cart(State(state): State<AppState>, principal: Principal) -> Result<Json<CartResponse>> {
    let cart = state.carts.clear(principal.id).await?;
    respond(&state, &cart, Some("Cart cleared")).await
}
