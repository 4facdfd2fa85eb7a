mod config;
mod errors;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod state;
mod utils;

use std::io;
use std::io::Write;
use std::sync::Arc;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use log::info;
use crate::config::Config;
use crate::middleware::{create_cors, RequestLogging};
use crate::routes::{api_routes, public_routes};
use crate::services::{InMemoryOrderStore, OrderStore, PaymentGateway, PesapalClient, PgOrderStore, TokenManager};
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "paycore", version, about = "Payment orchestration service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// 启动HTTP服务 (默认)
    Serve,
    /// 向网关注册IPN回调地址并输出通知ID
    RegisterIpn {
        /// 回调地址, 默认使用 PESAPAL_CALLBACK_URL
        #[arg(long)]
        url: Option<String>,
    },
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    let mut log_builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    log_builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S %:z"),
                record.level(),
                record.args()
            )
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e)) // 转换为 io::Result
        })
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::RegisterIpn { url } => register_ipn(config, url).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    config.validate(true)?;
    info!(
        "Starting paycore against {:?} gateway at {}",
        config.gateway.environment, config.gateway.base_url
    );

    let store: Arc<dyn OrderStore> = match &config.database {
        Some(database) => Arc::new(PgOrderStore::connect(database).await?),
        None => {
            log::warn!("DATABASE_URL not set, orders are kept in memory only");
            Arc::new(InMemoryOrderStore::new())
        }
    };
    let gateway: Arc<dyn PaymentGateway> = Arc::new(PesapalClient::new(&config.gateway)?);

    let bind_address = config.bind_address();
    let allowed_origins = config.server.allowed_origins.clone();
    let callback_timeout = config.reconciliation.callback_timeout;
    let sweep_interval = config.reconciliation.sweep_interval;

    let app_state = web::Data::new(AppState::new(config, store, gateway));

    let sweeper = tokio::spawn(
        app_state
            .checkout
            .clone()
            .run_timeout_sweeper(callback_timeout, sweep_interval),
    );

    info!("Listening on {}", bind_address);
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(create_cors(&allowed_origins))
            .wrap(RequestLogging)
            .service(api_routes())
            .service(public_routes())
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run()
    .await?;

    sweeper.abort();
    info!("Server stopped");
    Ok(())
}

async fn register_ipn(config: Config, url: Option<String>) -> anyhow::Result<()> {
    config.validate(false)?;

    let callback_url = url.unwrap_or_else(|| config.gateway.credentials.callback_url.clone());
    if !utils::validate_url(&callback_url) {
        anyhow::bail!("IPN URL must be an absolute http(s) URL");
    }

    let gateway: Arc<dyn PaymentGateway> = Arc::new(PesapalClient::new(&config.gateway)?);
    let tokens = TokenManager::new(
        gateway.clone(),
        config.gateway.credentials.clone(),
        config.gateway.token_safety_margin,
    );

    let token = tokens.get_token().await?;
    let ipn_id = gateway.register_ipn(&token, &callback_url).await?;

    info!("Registered IPN {} for {}", ipn_id, callback_url);
    println!("PESAPAL_IPN_ID={}", ipn_id);
    Ok(())
}
