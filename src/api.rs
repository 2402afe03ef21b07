use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, warn};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        FromRequest, Path, Request, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};

use crate::{
    engine::EngineError,
    fanout::{BookUpdateData, MarketUpdate, TradeUpdate},
    order::{OrderType, Side},
    orderbook::BookSnapshot,
    state::AppState,
    trade::Trade,
};

type ApiErr = (StatusCode, Json<serde_json::Value>);
fn err(status: StatusCode, msg: &str) -> ApiErr {
    (status, Json(json!({ "error": msg })))
}

fn log_rejected(payload: &NewOrder, reason: &str) {
    warn!(
        reason,
        side = ?payload.side,
        order_type = ?payload.order_type,
        price = ?payload.price,
        quantity = payload.quantity,
        symbol = %payload.symbol,
        "order rejected"
    );
}

pub struct LoggedJson<T>(pub T);

impl<S, T> FromRequest<S> for LoggedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiErr;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| err(StatusCode::BAD_REQUEST, &e.to_string()))?;

        match serde_json::from_slice::<T>(&bytes) {
            Ok(val) => Ok(LoggedJson(val)),
            Err(e) => {
                let preview = String::from_utf8_lossy(&bytes);
                let preview = &preview[..preview.len().min(4096)];
                warn!(
                    error = %e,
                    %method,
                    uri = %uri,
                    body_preview = %preview,
                    "order rejected: JSON deserialization failed"
                );
                Err(err(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string()))
            }
        }
    }
}

/// Request payload for `POST /orders`.
///
/// - `side`: buy or sell
/// - `order_type`: limit or market
/// - `price`: limit price, required for limit orders and ignored otherwise
/// - `quantity`: how many units to trade
/// - `symbol`: the registered symbol, e.g. `"BTC-USD"`
#[derive(Deserialize)]
pub struct NewOrder {
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<f64>,
    pub quantity: u32,
    pub symbol: String,
}

/// A single websocket frame, internally tagged as
/// `{"type": "BookSnapshot" | "Trade" | "BookUpdate", "data": {...}}`.
#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type", content = "data")]
pub enum WsFrame {
    BookSnapshot(BookSnapshot),
    Trade(TradeUpdate),
    BookUpdate(BookUpdateData),
}

impl From<MarketUpdate> for WsFrame {
    fn from(update: MarketUpdate) -> Self {
        match update {
            MarketUpdate::Trade(t) => WsFrame::Trade(t),
            MarketUpdate::BookUpdate(b) => WsFrame::BookUpdate(b),
        }
    }
}

/// Response for `POST /orders`, mirroring the `PlaceOrder` result shape:
/// `order_id`/`trades` are populated on success, `error_message` on
/// failure; `trades` is always present (empty on failure) as a convenience
/// beyond the minimal `{success, order_id, error_message}` shape.
#[derive(Serialize, Deserialize)]
pub struct OrderAck {
    pub success: bool,
    pub order_id: Option<u64>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub trades: Vec<Trade>,
}

impl OrderAck {
    fn ok(order_id: u64, trades: Vec<Trade>) -> Self {
        OrderAck {
            success: true,
            order_id: Some(order_id),
            error_message: None,
            trades,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        OrderAck {
            success: false,
            order_id: None,
            error_message: Some(message.into()),
            trades: Vec::new(),
        }
    }
}

/// Response for `DELETE /orders/{order_id}`, mirroring the `CancelOrder`
/// result shape.
#[derive(Serialize, Deserialize)]
pub struct CancelAck {
    pub success: bool,
    pub error_message: Option<String>,
}

/// `GET /book/{symbol}` — full-depth, best-first snapshot of one symbol's book.
pub async fn get_order_book(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> impl IntoResponse {
    match state.engine.book_snapshot(&symbol) {
        Some(snapshot) => Json(snapshot).into_response(),
        None => err(
            StatusCode::BAD_REQUEST,
            &format!("unsupported symbol `{}`", symbol),
        )
        .into_response(),
    }
}

/// `POST /orders` — places a new order and returns any trades it produced.
pub async fn create_order(
    State(state): State<AppState>,
    LoggedJson(payload): LoggedJson<NewOrder>,
) -> impl IntoResponse {
    if payload.order_type == OrderType::Limit && payload.price.is_none() {
        log_rejected(&payload, "limit orders require a price");
        return (
            StatusCode::BAD_REQUEST,
            Json(OrderAck::failed("limit orders require a price")),
        );
    }

    match state.engine.admit(
        &payload.symbol,
        payload.side,
        payload.order_type,
        payload.price,
        payload.quantity,
    ) {
        Ok((order_id, trades)) => (StatusCode::OK, Json(OrderAck::ok(order_id, trades))),
        Err(EngineError::UnknownSymbol(symbol)) => {
            log_rejected(&payload, "unsupported symbol");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(OrderAck::failed(format!("unsupported symbol `{}`", symbol))),
            )
        }
        Err(EngineError::InvalidQuantity) => {
            log_rejected(&payload, "quantity must be > 0");
            (
                StatusCode::BAD_REQUEST,
                Json(OrderAck::failed("quantity must be > 0")),
            )
        }
        Err(EngineError::MissingPrice) => {
            log_rejected(&payload, "limit orders require a price");
            (
                StatusCode::BAD_REQUEST,
                Json(OrderAck::failed("limit orders require a price")),
            )
        }
        Err(EngineError::OrderNotFound(_)) => unreachable!("admit never returns OrderNotFound"),
    }
}

/// `DELETE /orders/{order_id}` — cancels a resting order.
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<u64>,
) -> impl IntoResponse {
    match state.engine.cancel(order_id) {
        Ok(()) => (
            StatusCode::OK,
            Json(CancelAck {
                success: true,
                error_message: None,
            }),
        ),
        Err(EngineError::OrderNotFound(id)) => (
            StatusCode::NOT_FOUND,
            Json(CancelAck {
                success: false,
                error_message: Some(format!("order {} not found", id)),
            }),
        ),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(CancelAck {
                success: false,
                error_message: Some("internal error".to_string()),
            }),
        ),
    }
}

/// `GET /ws/{symbol}` — upgrades to a WebSocket and streams an initial
/// book snapshot followed by every trade and book update for that symbol.
pub async fn ws_handler(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, symbol))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, symbol: String) {
    let (sub_id, mut updates) = state.fanout.subscribe(&symbol);

    let initial = state.engine.book_snapshot(&symbol).unwrap_or(BookSnapshot {
        symbol: symbol.clone(),
        bids: Vec::new(),
        asks: Vec::new(),
    });
    let frame = WsFrame::BookSnapshot(initial);
    if let Err(e) = socket
        .send(Message::Text(serde_json::to_string(&frame).unwrap().into()))
        .await
    {
        error!("failed to send initial book snapshot: {:?}", e);
        state.fanout.unsubscribe(&symbol, sub_id);
        return;
    }

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            maybe_update = updates.recv() => {
                let Some(update) = maybe_update else { break };
                let frame: WsFrame = update.into();
                if let Err(e) = socket
                    .send(Message::Text(serde_json::to_string(&frame).unwrap().into()))
                    .await
                {
                    error!("websocket send failed: {:?}", e);
                    break;
                }
            }
        }
    }

    state.fanout.unsubscribe(&symbol, sub_id);
}

/// Constructs the application's `Router` with all routes and shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{order_id}", delete(cancel_order))
        .route("/book/{symbol}", get(get_order_book))
        .route("/ws/{symbol}", get(ws_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .include_headers(false)
                        .level(tracing::Level::TRACE),
                )
                .on_response(DefaultOnResponse::new().level(tracing::Level::TRACE)),
        )
        .with_state(state)
}
