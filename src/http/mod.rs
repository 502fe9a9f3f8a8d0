//! HTTP front end: maps each caller's address to a bucket and the limiter's
//! decision to a status code.

mod error;
mod handler;
mod server;

pub use error::ApiError;
pub use handler::{build_router, client_key, AppState};
pub use server::HttpServer;
