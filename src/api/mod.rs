//! Dashboard API: wire types, errors and the HTTP adapter.

mod client;
mod error;
pub mod types;

pub use client::ApiClient;
pub use error::ApiError;
