//! HTTP server for the legal question answering service

pub mod http;
pub mod state;

pub use http::create_router;
pub use state::AppState;
