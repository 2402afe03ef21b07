use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::engine::MarketDataListener;
use crate::order::Side;
use crate::trade::Trade;

/// Bounded so a slow subscriber can never make the engine's mutation lock
/// wait on a network write; a full channel is treated as a dead
/// subscriber and dropped on the next update for that symbol.
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize)]
pub struct TradeUpdate {
    pub symbol: String,
    pub maker_order_id: u64,
    pub taker_order_id: u64,
    pub price: f64,
    pub quantity: u32,
    pub taker_side: Side,
    pub seq: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookUpdateData {
    pub symbol: String,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub bid_size: u32,
    pub ask_size: u32,
    pub seq: u64,
}

/// Wire shape pushed to market-data subscribers. `seq` is a single
/// monotonically increasing counter shared across every symbol and update
/// kind, so a client can detect gaps from a channel that dropped it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum MarketUpdate {
    Trade(TradeUpdate),
    BookUpdate(BookUpdateData),
}

struct Subscriber {
    id: u64,
    sender: mpsc::Sender<MarketUpdate>,
}

/// Fans trades and book updates out to per-symbol subscribers. Registered
/// with a `MatchingEngine` as a `MarketDataListener`; its own callbacks run
/// synchronously under the engine's lock, so they never await — they only
/// assign a sequence number and `try_send`.
pub struct MarketDataFanout {
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
    next_seq: AtomicU64,
    next_subscriber_id: AtomicU64,
}

impl Default for MarketDataFanout {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketDataFanout {
    pub fn new() -> Self {
        MarketDataFanout {
            subscribers: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    /// Registers a new subscriber for `symbol`. The returned id is used to
    /// unsubscribe; the caller drives the returned receiver until its own
    /// cancellation signal fires, then calls `unsubscribe`.
    pub fn subscribe(&self, symbol: &str) -> (u64, mpsc::Receiver<MarketUpdate>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        let mut subs = self.subscribers.lock().unwrap();
        subs.entry(symbol.to_string())
            .or_default()
            .push(Subscriber { id, sender: tx });
        (id, rx)
    }

    pub fn unsubscribe(&self, symbol: &str, id: u64) {
        let mut subs = self.subscribers.lock().unwrap();
        if let Some(v) = subs.get_mut(symbol) {
            v.retain(|s| s.id != id);
        }
    }

    fn dispatch(&self, symbol: &str, update: MarketUpdate) {
        let mut subs = self.subscribers.lock().unwrap();
        if let Some(v) = subs.get_mut(symbol) {
            v.retain(|s| s.sender.try_send(update.clone()).is_ok());
        }
    }

    pub fn subscriber_count(&self, symbol: &str) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .get(symbol)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

impl MarketDataListener for MarketDataFanout {
    fn on_trade(&self, trade: &Trade) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.dispatch(
            &trade.symbol,
            MarketUpdate::Trade(TradeUpdate {
                symbol: trade.symbol.clone(),
                maker_order_id: trade.maker_order_id,
                taker_order_id: trade.taker_order_id,
                price: trade.price,
                quantity: trade.quantity,
                taker_side: trade.taker_side,
                seq,
            }),
        );
    }

    fn on_book_update(
        &self,
        symbol: &str,
        best_bid: Option<f64>,
        best_ask: Option<f64>,
        bid_size: u32,
        ask_size: u32,
    ) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.dispatch(
            symbol,
            MarketUpdate::BookUpdate(BookUpdateData {
                symbol: symbol.to_string(),
                best_bid,
                best_ask,
                bid_size,
                ask_size,
                seq,
            }),
        );
    }
}
