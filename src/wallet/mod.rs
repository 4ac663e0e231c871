use crate::state::AppState;
use axum::Router;

pub mod address;
mod dto;
pub mod error;
pub mod handlers;
pub mod service;
pub mod signature;

pub fn router() -> Router<AppState> {
    handlers::wallet_routes()
}
