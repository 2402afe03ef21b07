use std::time::SystemTime;

use crate::order::Side;

/// A trade represents a matched transaction between two orders.
///
/// - The price comes from the maker's order (i.e. the resting order).
/// - Quantity is the amount filled.
/// - The taker is the incoming order that triggered the trade.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Trade {
    pub symbol: String,
    pub maker_order_id: u64,
    pub taker_order_id: u64,
    pub price: f64,
    pub quantity: u32,
    pub taker_side: Side,
    pub timestamp: SystemTime,
}
