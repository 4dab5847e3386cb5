//! HTTP server — REST surface and the SSE transport adapter.
//!
//! The push transport is an adapter over the in-process event bus: each SSE
//! connection subscribes for one investor and relays `OrderUpdated` events
//! carrying the full order snapshot.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use oc_core::types::market::Asset;
use oc_core::types::{AssetId, Holding, InvestorId, Order, OrderId, OrderStatus, Side};
use oc_engine::{CreateOrderRequest, EngineError, EventBus, OrderEngine};

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// The order engine.
    pub engine: Arc<OrderEngine>,
    /// The event bus the SSE adapter subscribes to.
    pub bus: EventBus,
}

// ── Request / response bodies ──────────────────────────────────────────

/// `POST /orders` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderBody {
    investor_id: i64,
    asset_id: i64,
    order_type: Side,
    quantity: Decimal,
    #[serde(default)]
    price: Option<Decimal>,
}

/// `POST /orders` response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderResponse {
    order_id: OrderId,
    status: OrderStatus,
}

/// `POST /orders/{id}/cancel` request body.
#[derive(Debug, Deserialize)]
struct CancelBody {
    reason: String,
}

/// Generic message response.
#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Query parameters for the investor order listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListOrdersQuery {
    from_date: Option<DateTime<Utc>>,
}

/// `GET /health` response body.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

// ── Error mapping ──────────────────────────────────────────────────────

enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match &e {
            EngineError::NotFound(_) => ApiError::NotFound(e.to_string()),
            EngineError::InvalidState { .. } => ApiError::BadRequest(e.to_string()),
            EngineError::Timeout | EngineError::Store(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

// ── Handlers ───────────────────────────────────────────────────────────

/// `POST /orders` — submit an order. Returns `202 Accepted` once the `New`
/// record is durably committed; processing continues asynchronously.
async fn create_order_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateOrderBody>,
) -> Result<impl IntoResponse, ApiError> {
    // Well-formedness checks; admission rules proper run in the workflow.
    let min_quantity = Decimal::new(1, 4); // 0.0001
    if body.quantity < min_quantity {
        return Err(ApiError::BadRequest(format!(
            "quantity must be at least {min_quantity}"
        )));
    }
    if let Some(price) = body.price {
        if price <= Decimal::ZERO {
            return Err(ApiError::BadRequest("price must be positive".into()));
        }
    }

    let idempotency_key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let order = state.engine.create_order(
        CreateOrderRequest {
            investor_id: InvestorId(body.investor_id),
            asset_id: AssetId(body.asset_id),
            side: body.order_type,
            quantity: body.quantity,
            price: body.price,
        },
        idempotency_key,
    )?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateOrderResponse {
            order_id: order.id,
            status: order.status,
        }),
    ))
}

/// `GET /orders/{orderId}` — fetch one order.
async fn get_order_handler(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, ApiError> {
    state
        .engine
        .get_order(OrderId(order_id))?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("order not found: {order_id}")))
}

/// `GET /orders/investor/{investorId}?fromDate=...` — list an investor's
/// orders, newest first.
async fn list_orders_handler(
    State(state): State<AppState>,
    Path(investor_id): Path<i64>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let orders = state
        .engine
        .list_orders_for_investor(InvestorId(investor_id), query.from_date)?;
    Ok(Json(orders))
}

/// `POST /orders/{orderId}/cancel` — cancel an order still in `New` or
/// `Validated`.
async fn cancel_order_handler(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(body): Json<CancelBody>,
) -> Result<Json<MessageResponse>, ApiError> {
    let order = state
        .engine
        .cancel_order(OrderId(order_id), &body.reason)?;
    Ok(Json(MessageResponse {
        message: format!("Order {} cancelled", order.id),
    }))
}

/// `GET /holdings/{investorId}` — an investor's current holdings.
async fn holdings_handler(
    State(state): State<AppState>,
    Path(investor_id): Path<i64>,
) -> Result<Json<Vec<Holding>>, ApiError> {
    let holdings = state.engine.holdings_for_investor(InvestorId(investor_id))?;
    Ok(Json(holdings))
}

/// `GET /assets/{assetId}` — one asset.
async fn asset_handler(
    State(state): State<AppState>,
    Path(asset_id): Path<i64>,
) -> Result<Json<Asset>, ApiError> {
    state
        .engine
        .get_asset(AssetId(asset_id))?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("asset not found: {asset_id}")))
}

/// `GET /orders/stream/{investorId}` — SSE stream of `OrderUpdated` events
/// for one investor.
///
/// Best-effort live delivery only: a client that reconnects re-reads order
/// state through `GET /orders/{orderId}`.
async fn stream_orders_handler(
    State(state): State<AppState>,
    Path(investor_id): Path<i64>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let rx = state.bus.subscribe(InvestorId(investor_id));
    let stream = UnboundedReceiverStream::new(rx)
        .map(|update| Event::default().event("OrderUpdated").json_data(&update));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// `GET /health` — liveness check.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// ── Router / server ────────────────────────────────────────────────────

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order_handler))
        .route("/orders/:order_id", get(get_order_handler))
        .route("/orders/:order_id/cancel", post(cancel_order_handler))
        .route("/orders/investor/:investor_id", get(list_orders_handler))
        .route("/orders/stream/:investor_id", get(stream_orders_handler))
        .route("/holdings/:investor_id", get(holdings_handler))
        .route("/assets/:asset_id", get(asset_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Bind and serve until cancellation.
pub async fn run_server(
    state: AppState,
    port: u16,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let app = router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "HTTP server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await?;

    Ok(())
}
