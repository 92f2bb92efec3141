mod auth;
mod database;
mod dtos;
mod error;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod state;
mod store;
mod workflow;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{routing::get, Router};
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing_subscriber::fmt::init as tracing_init;

use crate::models::FeeSchedule;
use crate::services::{HostedCheckoutGateway, LogNotifier};
use crate::store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() {
    tracing_init();
    dotenv().ok();

    let store: Arc<dyn Store> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = match database::create_pool(&database_url).await {
                Ok(pool) => pool,
                Err(e) => {
                    tracing::error!(error=%e, "Failed to create database pool");
                    return;
                }
            };
            Arc::new(PgStore::new(pool))
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, falling back to in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let gateway_base =
        std::env::var("GATEWAY_BASE_URL").unwrap_or_else(|_| "https://pay.example.com".to_string());
    let merchant_id = std::env::var("GATEWAY_MERCHANT_ID").unwrap_or_else(|_| "medimart".to_string());
    let gateway_secret = match std::env::var("GATEWAY_SECRET") {
        Ok(s) => s,
        Err(_) => {
            tracing::error!("GATEWAY_SECRET must be set");
            return;
        }
    };
    let gateway = Arc::new(HostedCheckoutGateway::new(gateway_base, merchant_id, gateway_secret));

    let mut fees = FeeSchedule::default();
    if let Some(cents) = std::env::var("DELIVERY_FEE_CENTS").ok().and_then(|v| v.parse().ok()) {
        fees.flat_delivery_fee = crate::models::Money::from_cents(cents);
    }
    if let Some(bp) = std::env::var("PLATFORM_FEE_BASIS_POINTS").ok().and_then(|v| v.parse().ok()) {
        fees.platform_fee_basis_points = bp;
    }

    let app_state = state::AppState::new(store, gateway, Arc::new(LogNotifier), fees);

    let api = routes::create_router()
        .route("/", get(|| async { "MediMart API" }))
        .route("/health", get(health_check));

    let app = Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // HOST/PORT env with graceful port selection (axum 0.8 style)
    let host_str = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let host: IpAddr = host_str.parse().unwrap_or_else(|_| IpAddr::from([127, 0, 0, 1]));
    let base_port = std::env::var("PORT").ok().and_then(|p| p.parse::<u16>().ok()).unwrap_or(3000);

    // Try base_port..base_port+20 to avoid crash when address is in use
    let listener = {
        let mut bound = None;
        for offset in 0u16..=20 {
            let port = base_port.saturating_add(offset);
            let addr = SocketAddr::from((host, port));
            match TcpListener::bind(addr).await {
                Ok(l) => { bound = Some((l, addr)); break; }
                Err(e) => {
                    if offset == 0 { tracing::warn!(%addr, error=%e, "Port in use, trying next"); }
                }
            }
        }
        match bound {
            Some((l, addr)) => {
                tracing::info!("Server running on {}", addr);
                l
            }
            None => {
                tracing::error!("Failed to bind to any port starting at {} on {}", base_port, host);
                return;
            }
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error=%e, "Server error");
    }
}

async fn health_check() -> &'static str {
    "OK"
}
