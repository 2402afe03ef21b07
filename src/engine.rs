use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use thiserror::Error;

use crate::order::{Order, OrderType, Side};
use crate::orderbook::{BookSnapshot, OrderBook};
use crate::trade::Trade;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
    #[error("order not found: {0}")]
    OrderNotFound(u64),
    #[error("quantity must be greater than zero")]
    InvalidQuantity,
    #[error("limit orders require a price")]
    MissingPrice,
}

/// Receives matching-engine events synchronously, under the engine's
/// mutation lock. Implementations must not block — this is called while
/// admit/cancel callers are waiting on the same lock.
pub trait MarketDataListener: Send + Sync {
    fn on_trade(&self, trade: &Trade);
    fn on_book_update(
        &self,
        symbol: &str,
        best_bid: Option<f64>,
        best_ask: Option<f64>,
        bid_size: u32,
        ask_size: u32,
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerHandle(u64);

struct Inner {
    books: HashMap<String, OrderBook>,
    order_index: HashMap<u64, (String, Side)>,
    listeners: Vec<(u64, Arc<dyn MarketDataListener>)>,
    next_order_id: u64,
    next_arrival_seq: u64,
    next_listener_id: u64,
}

/// A single mutex serializes admit, cancel, listener (de)registration, and
/// event dispatch. Listener callbacks run inline while the lock is held,
/// so the engine never hands control to untrusted async code without it.
pub struct MatchingEngine {
    inner: Mutex<Inner>,
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchingEngine {
    pub fn new() -> Self {
        MatchingEngine {
            inner: Mutex::new(Inner {
                books: HashMap::new(),
                order_index: HashMap::new(),
                listeners: Vec::new(),
                next_order_id: 1,
                next_arrival_seq: 1,
                next_listener_id: 1,
            }),
        }
    }

    /// Idempotent: returns `true` if this symbol was newly registered,
    /// `false` if it already existed.
    pub fn register_symbol(&self, symbol: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.books.contains_key(symbol) {
            false
        } else {
            inner.books.insert(symbol.to_string(), OrderBook::new(symbol));
            true
        }
    }

    pub fn register_listener(&self, listener: Arc<dyn MarketDataListener>) -> ListenerHandle {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_listener_id;
        inner.next_listener_id += 1;
        inner.listeners.push((id, listener));
        ListenerHandle(id)
    }

    pub fn unregister_listener(&self, handle: ListenerHandle) {
        let mut inner = self.inner.lock().unwrap();
        inner.listeners.retain(|(id, _)| *id != handle.0);
    }

    /// Admits a new order: validates, assigns an id and arrival sequence,
    /// matches it against the resting book, rests any limit residual, and
    /// notifies listeners of every trade produced followed by one
    /// book-update — all before releasing the lock, so a subscriber never
    /// observes a book update that precedes the trades that caused it.
    pub fn admit(
        &self,
        symbol: &str,
        side: Side,
        order_type: OrderType,
        price: Option<f64>,
        quantity: u32,
    ) -> Result<(u64, Vec<Trade>), EngineError> {
        if quantity == 0 {
            return Err(EngineError::InvalidQuantity);
        }
        if order_type == OrderType::Limit && price.is_none() {
            return Err(EngineError::MissingPrice);
        }

        let mut inner = self.inner.lock().unwrap();
        if !inner.books.contains_key(symbol) {
            return Err(EngineError::UnknownSymbol(symbol.to_string()));
        }

        let order_id = inner.next_order_id;
        inner.next_order_id += 1;
        let arrival_seq = inner.next_arrival_seq;
        inner.next_arrival_seq += 1;

        let order = Order {
            id: order_id,
            symbol: symbol.to_string(),
            side,
            order_type,
            price,
            quantity,
            remaining_quantity: quantity,
            arrival_seq,
            timestamp: SystemTime::now(),
        };

        let book = inner
            .books
            .get_mut(symbol)
            .expect("symbol presence already checked");
        let (trades, filled_makers) = book.match_order(order);
        let filled: u32 = trades.iter().map(|t| t.quantity).sum();
        let rested = order_type == OrderType::Limit && filled < quantity;

        let best_bid = book.best_bid();
        let best_ask = book.best_ask();
        let bid_size = book.best_bid_size();
        let ask_size = book.best_ask_size();

        for maker_id in filled_makers {
            inner.order_index.remove(&maker_id);
        }
        if rested {
            inner.order_index.insert(order_id, (symbol.to_string(), side));
        }

        for (_, listener) in inner.listeners.iter() {
            for trade in &trades {
                listener.on_trade(trade);
            }
            listener.on_book_update(symbol, best_bid, best_ask, bid_size, ask_size);
        }

        Ok((order_id, trades))
    }

    /// Cancels a resting order by id. Returns `ORDER_NOT_FOUND` if the
    /// order was never resting (already filled, already cancelled, or
    /// unknown) — a second cancel of the same id always fails this way.
    pub fn cancel(&self, order_id: u64) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        let (symbol, side) = inner
            .order_index
            .remove(&order_id)
            .ok_or(EngineError::OrderNotFound(order_id))?;

        let book = inner
            .books
            .get_mut(&symbol)
            .expect("indexed order must belong to a registered book");
        if book.cancel_order(order_id, side).is_none() {
            return Err(EngineError::OrderNotFound(order_id));
        }

        let best_bid = book.best_bid();
        let best_ask = book.best_ask();
        let bid_size = book.best_bid_size();
        let ask_size = book.best_ask_size();

        for (_, listener) in inner.listeners.iter() {
            listener.on_book_update(&symbol, best_bid, best_ask, bid_size, ask_size);
        }

        Ok(())
    }

    pub fn best_quote(&self, symbol: &str) -> Option<(Option<f64>, Option<f64>, u32, u32)> {
        let inner = self.inner.lock().unwrap();
        let book = inner.books.get(symbol)?;
        Some((
            book.best_bid(),
            book.best_ask(),
            book.best_bid_size(),
            book.best_ask_size(),
        ))
    }

    pub fn book_snapshot(&self, symbol: &str) -> Option<BookSnapshot> {
        let inner = self.inner.lock().unwrap();
        inner.books.get(symbol).map(|b| b.snapshot())
    }

    pub fn has_symbol(&self, symbol: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.books.contains_key(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records each callback as an ordered tag rather than just a count, so
    /// tests can assert dispatch order, not merely that both fired.
    struct RecordingListener {
        events: Mutex<Vec<&'static str>>,
    }

    impl RecordingListener {
        fn new() -> Self {
            RecordingListener {
                events: Mutex::new(Vec::new()),
            }
        }
    }

    impl MarketDataListener for RecordingListener {
        fn on_trade(&self, _trade: &Trade) {
            self.events.lock().unwrap().push("trade");
        }
        fn on_book_update(
            &self,
            _symbol: &str,
            _best_bid: Option<f64>,
            _best_ask: Option<f64>,
            _bid_size: u32,
            _ask_size: u32,
        ) {
            self.events.lock().unwrap().push("book_update");
        }
    }

    #[test]
    fn register_symbol_is_idempotent() {
        let engine = MatchingEngine::new();
        assert!(engine.register_symbol("BTC-USD"));
        assert!(!engine.register_symbol("BTC-USD"));
    }

    #[test]
    fn admit_rejects_unknown_symbol_and_zero_quantity() {
        let engine = MatchingEngine::new();
        engine.register_symbol("BTC-USD");

        let err = engine
            .admit("ETH-USD", Side::Buy, OrderType::Limit, Some(10.0), 1)
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownSymbol(_)));

        let err = engine
            .admit("BTC-USD", Side::Buy, OrderType::Limit, Some(10.0), 0)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidQuantity));
    }

    #[test]
    fn admit_rejects_limit_order_without_a_price_instead_of_panicking() {
        let engine = MatchingEngine::new();
        engine.register_symbol("BTC-USD");

        let err = engine
            .admit("BTC-USD", Side::Buy, OrderType::Limit, None, 5)
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingPrice));

        // Same rejection must hold with a crossable resting order on the book,
        // where the old panic surfaced in the matching loop instead of `rest()`.
        engine
            .admit("BTC-USD", Side::Sell, OrderType::Limit, Some(100.0), 5)
            .unwrap();
        let err = engine
            .admit("BTC-USD", Side::Buy, OrderType::Limit, None, 5)
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingPrice));
    }

    #[test]
    fn admit_and_cancel_round_trip() {
        let engine = MatchingEngine::new();
        engine.register_symbol("BTC-USD");
        let (order_id, trades) = engine
            .admit("BTC-USD", Side::Buy, OrderType::Limit, Some(100.0), 5)
            .unwrap();
        assert!(trades.is_empty());

        engine.cancel(order_id).unwrap();
        let err = engine.cancel(order_id).unwrap_err();
        assert!(matches!(err, EngineError::OrderNotFound(_)));
    }

    #[test]
    fn cancel_of_fully_filled_order_is_not_found() {
        let engine = MatchingEngine::new();
        engine.register_symbol("BTC-USD");
        let (maker_id, _) = engine
            .admit("BTC-USD", Side::Sell, OrderType::Limit, Some(100.0), 5)
            .unwrap();
        let (_, trades) = engine
            .admit("BTC-USD", Side::Buy, OrderType::Market, None, 5)
            .unwrap();
        assert_eq!(trades.len(), 1);

        let err = engine.cancel(maker_id).unwrap_err();
        assert!(matches!(err, EngineError::OrderNotFound(_)));
    }

    #[test]
    fn fully_filled_maker_is_dropped_from_index_immediately() {
        // Regression test: the index must not retain a maker's id past the
        // admit that fully filled it — otherwise a lookup succeeds even
        // though the order no longer rests in any book, and only gets
        // cleaned up incidentally whenever someone happens to cancel it.
        let engine = MatchingEngine::new();
        engine.register_symbol("BTC-USD");
        let (maker_id, _) = engine
            .admit("BTC-USD", Side::Sell, OrderType::Limit, Some(100.0), 5)
            .unwrap();
        engine
            .admit("BTC-USD", Side::Buy, OrderType::Market, None, 5)
            .unwrap();

        let inner = engine.inner.lock().unwrap();
        assert!(!inner.order_index.contains_key(&maker_id));
    }

    #[test]
    fn listener_sees_trades_before_book_update_per_admit() {
        let engine = MatchingEngine::new();
        engine.register_symbol("BTC-USD");
        // Two resting makers at the same price, so the taker below produces
        // two trade events, to also confirm both precede the single update.
        engine
            .admit("BTC-USD", Side::Sell, OrderType::Limit, Some(100.0), 3)
            .unwrap();
        engine
            .admit("BTC-USD", Side::Sell, OrderType::Limit, Some(100.0), 2)
            .unwrap();

        let listener = Arc::new(RecordingListener::new());
        engine.register_listener(listener.clone());

        engine
            .admit("BTC-USD", Side::Buy, OrderType::Market, None, 5)
            .unwrap();

        let events = listener.events.lock().unwrap();
        assert_eq!(*events, vec!["trade", "trade", "book_update"]);
    }

    #[test]
    fn unregister_listener_stops_notifications() {
        let engine = MatchingEngine::new();
        engine.register_symbol("BTC-USD");
        let listener = Arc::new(RecordingListener::new());
        let handle = engine.register_listener(listener.clone());
        engine.unregister_listener(handle);

        engine
            .admit("BTC-USD", Side::Buy, OrderType::Limit, Some(10.0), 1)
            .unwrap();
        assert!(listener.events.lock().unwrap().is_empty());
    }
}
