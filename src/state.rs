use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::engine::MatchingEngine;
use crate::fanout::MarketDataFanout;

/// Shared application handle passed into the transport layer. `engine` and
/// `fanout` are `Arc`-backed, so cloning `AppState` into each request
/// handler is cheap and shares the same engine and fan-out across every
/// connection; `shutdown` lets each open WebSocket unwind on the same
/// signal that stops the server.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MatchingEngine>,
    pub fanout: Arc<MarketDataFanout>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_shutdown(CancellationToken::new())
    }

    pub fn with_shutdown(shutdown: CancellationToken) -> Self {
        let engine = Arc::new(MatchingEngine::new());
        let fanout = Arc::new(MarketDataFanout::new());
        engine.register_listener(fanout.clone());
        AppState {
            engine,
            fanout,
            shutdown,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
