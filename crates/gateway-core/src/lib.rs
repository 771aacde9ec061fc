//! Core library for the edge API gateway: request identity and topology
//! models, the proxy/cache/rate-limit/circuit-breaker services, actix-web
//! middleware, route handlers, and the shared application state that ties
//! them together. The `gateway` binary crate only wires this up and runs it.

pub mod config;
pub mod logs;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use state::AppState;
