use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::GeneratorConfig;
use crate::engine::MatchingEngine;
use crate::order::{OrderType, Side};

/// Synthetic order flow, run as an in-process client of the engine: it
/// calls only `best_quote`/`admit`, the same public surface an external
/// RPC client would use, so it has no privileged back channel into the
/// book. Ticks a registered symbol is skipped if that symbol has no best
/// bid or ask yet, mirroring the reference simulator.
pub struct Generator {
    engine: Arc<MatchingEngine>,
    symbols: Vec<String>,
    config: GeneratorConfig,
}

impl Generator {
    pub fn new(engine: Arc<MatchingEngine>, symbols: Vec<String>, config: GeneratorConfig) -> Self {
        Generator {
            engine,
            symbols,
            config,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        if !self.config.enabled || self.symbols.is_empty() {
            return;
        }

        let period = Duration::from_millis(self.config.interval_ms.max(1));
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => self.tick(),
            }
        }
    }

    fn tick(&self) {
        let mut rng = rand::rng();
        let idx = rng.random_range(0..self.symbols.len());
        let symbol = &self.symbols[idx];

        let Some((Some(best_bid), Some(best_ask), _, _)) = self.engine.best_quote(symbol) else {
            debug!(symbol, "generator skipping tick, book has no two-sided quote yet");
            return;
        };

        let side = if rng.random_bool(0.5) { Side::Buy } else { Side::Sell };
        let is_limit = rng.random_ratio(8, 10);
        let quantity = rng.random_range(self.config.min_order_size..=self.config.max_order_size);

        let reference_price = match side {
            Side::Buy => best_bid,
            Side::Sell => best_ask,
        };
        let variance = self.config.price_variance.max(0.0);
        let offset = if variance > 0.0 {
            rng.random_range(-variance..=variance)
        } else {
            0.0
        };
        let mut price = reference_price + offset;
        if price <= 0.0 {
            price = reference_price;
        }

        let order_type = if is_limit { OrderType::Limit } else { OrderType::Market };
        let price_arg = if is_limit { Some(price) } else { None };

        if let Err(err) = self.engine.admit(symbol, side, order_type, price_arg, quantity) {
            debug!(symbol, %err, "generator order rejected");
        }
    }
}
