//! HTTP and WebSocket surface of the bingo hall
//!
//! Player routes live under `/players`, admin routes under `/admin` behind
//! the `X-API-Key` header, and live round events stream from `/ws`.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod websocket;

pub use server::{create_app, ApiServer};
