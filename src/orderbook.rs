use std::collections::BTreeMap;
use std::time::SystemTime;

use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::order::{Order, OrderType, Side};
use crate::price_level::PriceLevel;
use crate::trade::Trade;

/// Full-depth, best-price-first view of one symbol's book, used by the
/// read-only transport endpoint and printed at startup.
#[derive(Debug, Clone, Serialize)]
pub struct BookSnapshot {
    pub symbol: String,
    pub bids: Vec<(f64, u32)>,
    pub asks: Vec<(f64, u32)>,
}

/// One symbol's resting orders, split into bid and ask sides. Both sides
/// are keyed ascending by price; bids are read best-first from the back
/// (highest price), asks best-first from the front (lowest price).
/// Price-time priority within a side comes from `PriceLevel`'s FIFO queue.
#[derive(Debug)]
pub struct OrderBook {
    symbol: String,
    bids: BTreeMap<OrderedFloat<f64>, PriceLevel>,
    asks: BTreeMap<OrderedFloat<f64>, PriceLevel>,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        OrderBook {
            symbol: symbol.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.keys().next_back().map(|p| p.into_inner())
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.keys().next().map(|p| p.into_inner())
    }

    pub fn best_bid_size(&self) -> u32 {
        self.bids
            .values()
            .next_back()
            .map(|l| l.total_quantity())
            .unwrap_or(0)
    }

    pub fn best_ask_size(&self) -> u32 {
        self.asks
            .values()
            .next()
            .map(|l| l.total_quantity())
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            symbol: self.symbol.clone(),
            bids: self
                .bids
                .iter()
                .rev()
                .map(|(p, l)| (p.into_inner(), l.total_quantity()))
                .collect(),
            asks: self
                .asks
                .iter()
                .map(|(p, l)| (p.into_inner(), l.total_quantity()))
                .collect(),
        }
    }

    fn crosses(incoming: &Order, level_price: f64) -> bool {
        match incoming.order_type {
            OrderType::Market => true,
            OrderType::Limit => {
                let limit = incoming.price.expect("limit order must carry a price");
                match incoming.side {
                    Side::Buy => level_price <= limit,
                    Side::Sell => level_price >= limit,
                }
            }
        }
    }

    /// Matches `incoming` against the resting book, producing one `Trade`
    /// per maker order consumed, always at that maker's price. A limit
    /// order with quantity left over after matching rests at its limit
    /// price; a market order's unfilled remainder is discarded — there is
    /// no such thing as a resting market order. The second return value
    /// lists maker order ids that were fully filled and left the book, so
    /// the caller can drop them from its own order index.
    pub fn match_order(&mut self, mut incoming: Order) -> (Vec<Trade>, Vec<u64>) {
        let mut trades = Vec::new();
        let mut filled_makers = Vec::new();

        loop {
            if incoming.remaining_quantity == 0 {
                break;
            }

            let best_key = match incoming.side {
                Side::Buy => self.asks.keys().next().copied(),
                Side::Sell => self.bids.keys().next_back().copied(),
            };
            let Some(key) = best_key else {
                break;
            };
            if !Self::crosses(&incoming, key.into_inner()) {
                break;
            }

            let levels = match incoming.side {
                Side::Buy => &mut self.asks,
                Side::Sell => &mut self.bids,
            };
            let level = levels.get_mut(&key).expect("best key must resolve to a level");

            let maker = level.front_mut().expect("non-empty level has a front order");
            let maker_id = maker.id;
            let maker_price = maker.price.expect("resting order always carries a price");
            let fill_qty = incoming.remaining_quantity.min(maker.remaining_quantity);
            maker.remaining_quantity -= fill_qty;

            level.adjust_total(-(fill_qty as i64));
            incoming.remaining_quantity -= fill_qty;

            trades.push(Trade {
                symbol: self.symbol.clone(),
                maker_order_id: maker_id,
                taker_order_id: incoming.id,
                price: maker_price,
                quantity: fill_qty,
                taker_side: incoming.side,
                timestamp: SystemTime::now(),
            });

            if level.front().map(|o| o.remaining_quantity == 0).unwrap_or(false) {
                level.pop_front();
                filled_makers.push(maker_id);
            }
            if level.is_empty() {
                levels.remove(&key);
            }
        }

        if incoming.remaining_quantity > 0 && incoming.order_type == OrderType::Limit {
            self.rest(incoming);
        }

        (trades, filled_makers)
    }

    /// Rests an order directly without matching it first. Used to seed a
    /// book with depth (config-driven initial depth, benchmarks, tests)
    /// where the caller already knows the order should not cross.
    pub fn add_resting_order(&mut self, order: Order) {
        self.rest(order);
    }

    fn rest(&mut self, order: Order) {
        let price = order.price.expect("only limit orders rest");
        let key = OrderedFloat(price);
        let side_map = match order.side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        side_map
            .entry(key)
            .or_insert_with(|| PriceLevel::new(price))
            .push(order);
    }

    /// Removes a resting order by id from the given side. Returns `None`
    /// if it was never resting there (already filled, already cancelled,
    /// or never existed) — cancel is idempotent from the caller's view.
    pub fn cancel_order(&mut self, order_id: u64, side: Side) -> Option<Order> {
        let side_map = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };

        let mut found = None;
        let mut empty_key = None;
        for (key, level) in side_map.iter_mut() {
            if let Some(order) = level.remove(order_id) {
                found = Some(order);
                if level.is_empty() {
                    empty_key = Some(*key);
                }
                break;
            }
        }
        if let Some(key) = empty_key {
            side_map.remove(&key);
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: u64, side: Side, order_type: OrderType, price: Option<f64>, qty: u32) -> Order {
        Order {
            id,
            symbol: "BTC-USD".into(),
            side,
            order_type,
            price,
            quantity: qty,
            remaining_quantity: qty,
            arrival_seq: id,
            timestamp: SystemTime::now(),
        }
    }

    #[test]
    fn market_order_partial_fill_against_thin_book() {
        let mut book = OrderBook::new("BTC-USD");
        book.match_order(order(1, Side::Sell, OrderType::Limit, Some(100.0), 5));

        let (trades, _) = book.match_order(order(2, Side::Buy, OrderType::Market, None, 8));
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].quantity, 5);
        assert_eq!(trades[0].price, 100.0);
        assert!(book.best_ask().is_none());
    }

    #[test]
    fn market_order_with_no_liquidity_produces_no_trades() {
        let mut book = OrderBook::new("BTC-USD");
        let (trades, _) = book.match_order(order(1, Side::Buy, OrderType::Market, None, 10));
        assert!(trades.is_empty());
    }

    #[test]
    fn fifo_priority_at_same_price() {
        let mut book = OrderBook::new("BTC-USD");
        book.match_order(order(1, Side::Sell, OrderType::Limit, Some(100.0), 5));
        book.match_order(order(2, Side::Sell, OrderType::Limit, Some(100.0), 5));

        let (trades, _) = book.match_order(order(3, Side::Buy, OrderType::Market, None, 6));
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].maker_order_id, 1);
        assert_eq!(trades[0].quantity, 5);
        assert_eq!(trades[1].maker_order_id, 2);
        assert_eq!(trades[1].quantity, 1);
    }

    #[test]
    fn limit_order_rests_when_it_does_not_cross() {
        let mut book = OrderBook::new("BTC-USD");
        let (trades, _) = book.match_order(order(1, Side::Buy, OrderType::Limit, Some(99.0), 10));
        assert!(trades.is_empty());
        assert_eq!(book.best_bid(), Some(99.0));
        assert_eq!(book.best_bid_size(), 10);
    }

    #[test]
    fn crossing_limit_order_matches_at_maker_price_instead_of_resting() {
        let mut book = OrderBook::new("BTC-USD");
        book.match_order(order(1, Side::Sell, OrderType::Limit, Some(100.0), 5));

        let (trades, _) = book.match_order(order(2, Side::Buy, OrderType::Limit, Some(105.0), 5));
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, 100.0, "trade executes at the maker's price");
        assert!(book.best_ask().is_none());
        assert!(book.best_bid().is_none(), "fully filled taker does not rest");
    }

    #[test]
    fn book_never_crosses_after_resting() {
        let mut book = OrderBook::new("BTC-USD");
        book.match_order(order(1, Side::Buy, OrderType::Limit, Some(99.0), 5));
        book.match_order(order(2, Side::Sell, OrderType::Limit, Some(101.0), 5));
        assert!(book.best_bid().unwrap() < book.best_ask().unwrap());
    }

    #[test]
    fn cancel_removes_resting_order_and_is_idempotent() {
        let mut book = OrderBook::new("BTC-USD");
        book.match_order(order(1, Side::Buy, OrderType::Limit, Some(99.0), 10));

        let cancelled = book.cancel_order(1, Side::Buy);
        assert!(cancelled.is_some());
        assert!(book.best_bid().is_none());

        assert!(book.cancel_order(1, Side::Buy).is_none());
    }

    #[test]
    fn cancel_of_unknown_order_returns_none() {
        let mut book = OrderBook::new("BTC-USD");
        assert!(book.cancel_order(404, Side::Sell).is_none());
    }

    #[test]
    fn match_order_reports_fully_filled_makers_but_not_partially_filled_ones() {
        let mut book = OrderBook::new("BTC-USD");
        book.match_order(order(1, Side::Sell, OrderType::Limit, Some(100.0), 5));
        book.match_order(order(2, Side::Sell, OrderType::Limit, Some(100.0), 10));

        let (_, filled_makers) = book.match_order(order(3, Side::Buy, OrderType::Market, None, 7));
        assert_eq!(filled_makers, vec![1], "order 2 only partially filled, stays resting");
    }

    #[test]
    fn snapshot_is_best_price_first_on_both_sides() {
        let mut book = OrderBook::new("BTC-USD");
        book.match_order(order(1, Side::Buy, OrderType::Limit, Some(99.0), 1));
        book.match_order(order(2, Side::Buy, OrderType::Limit, Some(101.0), 1));
        book.match_order(order(3, Side::Sell, OrderType::Limit, Some(105.0), 1));
        book.match_order(order(4, Side::Sell, OrderType::Limit, Some(103.0), 1));

        let snap = book.snapshot();
        assert_eq!(snap.bids.first().unwrap().0, 101.0);
        assert_eq!(snap.asks.first().unwrap().0, 103.0);
    }
}
