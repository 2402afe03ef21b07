use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum OrderType {
    Limit,
    Market,
}

/// A resting or incoming order. `arrival_seq` is assigned by the engine at
/// admit time and is what price-time priority actually compares on;
/// `timestamp` is wall-clock, kept for observability only.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Order {
    pub id: u64,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<f64>,
    pub quantity: u32,
    pub remaining_quantity: u32,
    pub arrival_seq: u64,
    pub timestamp: SystemTime,
}

impl Order {
    pub fn is_filled(&self) -> bool {
        self.remaining_quantity == 0
    }
}
