use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};

/// Username accepted by the token endpoint.
pub const DEMO_USERNAME: &str = "demo";
/// Password accepted by the token endpoint.
pub const DEMO_PASSWORD: &str = "secret";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    pub price: f64,
}

#[derive(Deserialize)]
pub struct CreateProduct {
    pub name: String,
    #[serde(default)]
    pub price: f64,
}

#[derive(Deserialize)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub price: Option<f64>,
}

#[derive(Deserialize)]
pub struct Search {
    pub name: Option<String>,
    pub max_price: Option<f64>,
}

#[derive(Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
    pub grant_type: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

#[derive(Deserialize)]
pub struct Delay {
    #[serde(default)]
    pub ms: u64,
}

pub struct Catalog {
    products: RwLock<BTreeMap<u64, Product>>,
    tokens: RwLock<HashSet<String>>,
    next_id: AtomicU64,
}

pub type Db = Arc<Catalog>;

impl Catalog {
    /// A catalog seeded with three products, ids 1 to 3.
    pub fn seeded() -> Self {
        let products: BTreeMap<u64, Product> = [("Coffee Mug", 9.5), ("Desk Lamp", 34.0), ("Notebook", 4.25)]
            .into_iter()
            .zip(1u64..)
            .map(|((name, price), id)| {
                (
                    id,
                    Product {
                        id,
                        name: name.to_string(),
                        price,
                    },
                )
            })
            .collect();
        let next_id = products.len() as u64 + 1;
        Self {
            products: RwLock::new(products),
            tokens: RwLock::new(HashSet::new()),
            next_id: AtomicU64::new(next_id),
        }
    }
}

pub fn app() -> Router {
    let db: Db = Arc::new(Catalog::seeded());
    Router::new()
        .route("/api/products", get(list_products).post(create_product))
        .route("/api/products/search", get(search_products))
        .route(
            "/api/products/{id}",
            get(get_product)
                .put(replace_product)
                .patch(update_product)
                .delete(delete_product),
        )
        .route("/api/token", post(issue_token))
        .route("/api/me", get(whoami))
        .route("/api/headers", get(echo_headers))
        .route("/api/slow", get(slow))
        .route("/api/status/{code}", get(status))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn not_found(id: u64) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("product {id} not found"))
}

async fn list_products(State(db): State<Db>) -> Json<Vec<Product>> {
    let products = db.products.read().await;
    Json(products.values().cloned().collect())
}

async fn search_products(State(db): State<Db>, Query(search): Query<Search>) -> Json<Vec<Product>> {
    let products = db.products.read().await;
    let needle = search.name.map(|n| n.to_lowercase());
    Json(
        products
            .values()
            .filter(|p| needle.as_ref().map_or(true, |n| p.name.to_lowercase().contains(n.as_str())))
            .filter(|p| search.max_price.map_or(true, |max| p.price <= max))
            .cloned()
            .collect(),
    )
}

async fn create_product(
    State(db): State<Db>,
    Json(input): Json<CreateProduct>,
) -> (StatusCode, Json<Product>) {
    let product = Product {
        id: db.next_id.fetch_add(1, Ordering::SeqCst),
        name: input.name,
        price: input.price,
    };
    db.products.write().await.insert(product.id, product.clone());
    tracing::info!(id = product.id, "product created");
    (StatusCode::CREATED, Json(product))
}

async fn get_product(
    State(db): State<Db>,
    Path(id): Path<u64>,
) -> Result<Json<Product>, (StatusCode, String)> {
    let products = db.products.read().await;
    products.get(&id).cloned().map(Json).ok_or_else(|| not_found(id))
}

async fn replace_product(
    State(db): State<Db>,
    Path(id): Path<u64>,
    Json(input): Json<CreateProduct>,
) -> Result<Json<Product>, (StatusCode, String)> {
    let mut products = db.products.write().await;
    let product = products.get_mut(&id).ok_or_else(|| not_found(id))?;
    product.name = input.name;
    product.price = input.price;
    Ok(Json(product.clone()))
}

async fn update_product(
    State(db): State<Db>,
    Path(id): Path<u64>,
    Json(input): Json<UpdateProduct>,
) -> Result<Json<Product>, (StatusCode, String)> {
    let mut products = db.products.write().await;
    let product = products.get_mut(&id).ok_or_else(|| not_found(id))?;
    if let Some(name) = input.name {
        product.name = name;
    }
    if let Some(price) = input.price {
        product.price = price;
    }
    Ok(Json(product.clone()))
}

async fn delete_product(
    State(db): State<Db>,
    Path(id): Path<u64>,
) -> Result<StatusCode, (StatusCode, String)> {
    let mut products = db.products.write().await;
    products
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| not_found(id))
}

async fn issue_token(
    State(db): State<Db>,
    Form(input): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, (StatusCode, Json<serde_json::Value>)> {
    if input.grant_type != "password" {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "unsupported_grant_type" })),
        ));
    }
    if input.username != DEMO_USERNAME || input.password != DEMO_PASSWORD {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "invalid_grant" })),
        ));
    }
    let mut tokens = db.tokens.write().await;
    let access_token = format!("token-{}-{}", input.username, tokens.len() + 1);
    tokens.insert(access_token.clone());
    tracing::debug!(username = %input.username, "token issued");
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
    }))
}

async fn whoami(
    State(db): State<Db>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;
    if !db.tokens.read().await.contains(token) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(serde_json::json!({ "username": DEMO_USERNAME })))
}

async fn echo_headers(headers: HeaderMap) -> Json<HashMap<String, String>> {
    Json(
        headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect(),
    )
}

async fn slow(Query(delay): Query<Delay>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(delay.ms)).await;
    "done"
}

async fn status(Path(code): Path<u16>) -> Result<(StatusCode, String), StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok((status, format!("status {code}")))
}
