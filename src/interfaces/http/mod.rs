//! JSON over HTTP, served with axum.

pub mod dto;
pub mod handlers;

use crate::gateway::Gateway;
use axum::Router;
use axum::routing::{get, post};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

pub fn router(gateway: Gateway) -> Router {
    Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route("/deposit", post(handlers::deposit))
        .route("/withdraw", post(handlers::withdraw))
        .route("/balance", get(handlers::balance))
        .route("/transactions", get(handlers::transactions))
        .route("/ping", get(handlers::ping))
        .with_state(gateway)
}
