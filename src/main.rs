use std::path::PathBuf;

use clap::{Parser, Subcommand};
use order_book_engine::api;
use order_book_engine::cli::{self, ClientCommand};
use order_book_engine::config::Config;
use order_book_engine::generator::Generator;
use order_book_engine::order::{OrderType, Side};
use order_book_engine::state::AppState;
use order_book_engine::utils::shutdown_token;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "order-book-engine")]
#[command(
    author = "Andrew Odiit",
    version = "0.1",
    about = "A price-time priority matching engine with a market-data fan-out"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the matching engine and its HTTP/WebSocket server.
    Server {
        #[arg(long, default_value = "config.json")]
        config: PathBuf,
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Drive a running server's external interface.
    Client {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        endpoint: String,
        #[command(subcommand)]
        command: ClientCommand,
    },
}

async fn run_server(config_path: PathBuf, port: u16) -> anyhow::Result<()> {
    let config = match Config::load_from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, path = %config_path.display(), "failed to load config");
            std::process::exit(1);
        }
    };

    let shutdown = shutdown_token();
    let state = AppState::with_shutdown(shutdown.clone());

    let mut symbols = Vec::with_capacity(config.symbols.len());
    for symbol_config in &config.symbols {
        state.engine.register_symbol(&symbol_config.symbol);
        symbols.push(symbol_config.symbol.clone());

        for seed in &symbol_config.initial_depth.bids {
            state
                .engine
                .admit(
                    &symbol_config.symbol,
                    Side::Buy,
                    OrderType::Limit,
                    Some(seed.price),
                    seed.quantity,
                )
                .expect("seed bid should be accepted");
        }
        for seed in &symbol_config.initial_depth.asks {
            state
                .engine
                .admit(
                    &symbol_config.symbol,
                    Side::Sell,
                    OrderType::Limit,
                    Some(seed.price),
                    seed.quantity,
                )
                .expect("seed ask should be accepted");
        }

        let (best_bid, best_ask, _, _) = state
            .engine
            .best_quote(&symbol_config.symbol)
            .expect("symbol was just registered");
        tracing::info!(
            symbol = %symbol_config.symbol,
            ?best_bid,
            ?best_ask,
            "registered symbol and seeded initial depth"
        );
    }

    let mut tasks = tokio::task::JoinSet::new();

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    let app = api::router(state.clone());
    let server_shutdown = shutdown.clone();
    tasks.spawn(async move {
        tracing::info!(port, "HTTP/WS server listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(server_shutdown.cancelled_owned())
            .await
            .unwrap();
    });

    if config.generator.enabled {
        let generator = Generator::new(state.engine.clone(), symbols, config.generator.clone());
        let gen_shutdown = shutdown.clone();
        tasks.spawn(async move {
            generator.run(gen_shutdown).await;
        });
    }

    tasks.join_all().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Server { config, port } => run_server(config, port).await,
        Commands::Client { endpoint, command } => cli::run_client(&endpoint, command).await,
    }
}
