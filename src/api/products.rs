//! `/api/products` routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::api::{AdminPrincipal, AppState, Principal, ValidatedJson};
use crate::domain::aggregates::{Product, ProductImage, StockAdjustment};
use crate::domain::value_objects::{Money, ProductCode};
use crate::services::catalog::{Availability, NewProduct};
use crate::store::ProductFilter;
use crate::Result;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/low-stock", get(low_stock))
        .route("/products/:id", get(get_product))
        .route("/products/:id/availability/:quantity", get(availability))
        .route("/products/:id/stock", patch(adjust_stock))
        .route("/products/:id/review", post(add_review))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub product_id: Option<ProductCode>,
    #[validate(length(min = 1, max = 200, message = "productName is required"))]
    pub product_name: String,
    #[validate(length(min = 1, max = 100, message = "productCategory is required"))]
    pub product_category: String,
    pub details: Option<String>,
    pub price: Money,
    #[serde(default)]
    pub stock_quantity: u32,
    pub low_stock_threshold: Option<u32>,
    /// Already stored by the upload collaborator.
    #[serde(default)]
    #[validate(length(max = 5, message = "at most 5 images"))]
    pub images: Vec<ProductImage>,
    #[serde(default)]
    pub colour_options: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    pub in_stock: Option<bool>,
    pub category: Option<String>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockOperation { Set, Add, Subtract }

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StockRequest {
    #[validate(range(max = 1_000_000, message = "stockQuantity is out of range"))]
    pub stock_quantity: u32,
    #[serde(default = "default_operation")]
    pub operation: StockOperation,
}

fn default_operation() -> StockOperation { StockOperation::Set }

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewRequest {
    #[validate(range(min = 1, max = 5, message = "rating must be between 1 and 5"))]
    pub rating: u8,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub comment: String,
}

fn code(raw: String) -> Result<ProductCode> { Ok(ProductCode::new(raw)?) }

async fn list_products(State(state): State<AppState>, Query(q): Query<ProductQuery>) -> Result<Json<Vec<Product>>> {
    let filter = ProductFilter {
        in_stock: q.in_stock,
        category: q.category.filter(|c| !c.trim().is_empty()),
        min_price: q.min_price,
        max_price: q.max_price,
    };
    Ok(Json(state.catalog.list(&filter).await?))
}

async fn get_product(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Product>> {
    Ok(Json(state.catalog.product(&code(id)?).await?))
}

async fn availability(State(state): State<AppState>, Path((id, quantity)): Path<(String, u32)>) -> Result<Json<Availability>> {
    Ok(Json(state.catalog.availability(&code(id)?, quantity).await?))
}

async fn create_product(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    ValidatedJson(req): ValidatedJson<CreateProductRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let product = state.catalog.create_product(NewProduct {
        product_id: req.product_id,
        name: req.product_name,
        category: req.product_category,
        details: req.details,
        price: req.price,
        stock_quantity: req.stock_quantity,
        low_stock_threshold: req.low_stock_threshold,
        images: req.images,
        colour_options: req.colour_options,
    })
    .await?;
    Ok((StatusCode::CREATED, Json(json!({ "message": "Product created successfully", "product": product }))))
}

async fn adjust_stock(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<StockRequest>,
) -> Result<Json<Value>> {
    let adjustment = match req.operation {
        StockOperation::Set => StockAdjustment::Set(req.stock_quantity),
        StockOperation::Add => StockAdjustment::Add(req.stock_quantity),
        StockOperation::Subtract => StockAdjustment::Subtract(req.stock_quantity),
    };
    let change = state.catalog.adjust_stock(&code(id)?, adjustment).await?;
    Ok(Json(json!({
        "message": "Stock updated successfully",
        "product": change.product,
        "previousStock": change.previous_stock,
        "newStock": change.new_stock,
    })))
}

async fn low_stock(State(state): State<AppState>, _admin: AdminPrincipal) -> Result<Json<Value>> {
    let products = state.catalog.low_stock().await?;
    Ok(Json(json!({ "message": format!("Found {} products with low stock", products.len()), "products": products })))
}

async fn add_review(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<ReviewRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let author = principal.name.unwrap_or_else(|| "Customer".to_string());
    let review = state.catalog.add_review(&code(id)?, &author, req.rating, &req.comment).await?;
    Ok((StatusCode::CREATED, Json(json!({ "message": "Review added successfully", "review": review }))))
}
