use clap::{Subcommand, arg, builder::PossibleValuesParser};
use futures_util::StreamExt;
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::api::{OrderAck, WsFrame};

/// One-shot operations a human or a script can run against a running
/// server, over the same HTTP/WebSocket surface any external client uses.
#[derive(Subcommand)]
pub enum ClientCommand {
    /// Place a limit or market order.
    Place {
        symbol: String,
        #[arg(value_parser = PossibleValuesParser::new(["buy", "sell"]))]
        side: String,
        #[arg(value_parser = PossibleValuesParser::new(["limit", "market"]))]
        order_type: String,
        quantity: u32,
        /// Required for limit orders, ignored for market orders.
        price: Option<f64>,
    },
    /// Cancel a resting order by id.
    Cancel { order_id: u64 },
    /// Stream market-data updates for a symbol until interrupted.
    Subscribe { symbol: String },
}

fn pascal_case(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

pub async fn run_client(endpoint: &str, command: ClientCommand) -> anyhow::Result<()> {
    match command {
        ClientCommand::Place {
            symbol,
            side,
            order_type,
            quantity,
            price,
        } => place(endpoint, symbol, side, order_type, quantity, price).await,
        ClientCommand::Cancel { order_id } => cancel(endpoint, order_id).await,
        ClientCommand::Subscribe { symbol } => subscribe(endpoint, symbol).await,
    }
}

async fn place(
    endpoint: &str,
    symbol: String,
    side: String,
    order_type: String,
    quantity: u32,
    price: Option<f64>,
) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let body = json!({
        "symbol": symbol,
        "side": pascal_case(&side),
        "order_type": pascal_case(&order_type),
        "quantity": quantity,
        "price": price,
    });
    let resp = client
        .post(format!("{}/orders", endpoint))
        .json(&body)
        .send()
        .await?
        .error_for_status()?;
    let ack: OrderAck = resp.json().await?;
    println!(
        "order {} placed, {} trade(s) produced",
        ack.order_id.unwrap_or_default(),
        ack.trades.len()
    );
    for trade in ack.trades {
        println!("  {:?}", trade);
    }
    Ok(())
}

async fn cancel(endpoint: &str, order_id: u64) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let resp = client
        .delete(format!("{}/orders/{}", endpoint, order_id))
        .send()
        .await?;
    if resp.status().is_success() {
        println!("order {} cancelled", order_id);
    } else {
        println!("cancel failed: {}", resp.text().await?);
    }
    Ok(())
}

async fn subscribe(endpoint: &str, symbol: String) -> anyhow::Result<()> {
    let ws_url = format!("{}/ws/{}", endpoint.replace("http://", "ws://"), symbol);
    let (mut ws, _resp) = connect_async(&ws_url).await?;
    println!("subscribed to {}, press ctrl+c to stop", symbol);

    let shutdown = CancellationToken::new();
    let sc = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        sc.cancel();
    });

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = ws.next() => {
                let Some(msg) = msg else { break };
                if let Message::Text(text) = msg? {
                    match serde_json::from_str::<WsFrame>(&text) {
                        Ok(frame) => println!("{:?}", frame),
                        Err(_) => println!("{}", text),
                    }
                }
            }
        }
    }
    Ok(())
}
