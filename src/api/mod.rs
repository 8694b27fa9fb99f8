//! Control surface over HTTP
//!
//! Thin axum handlers mapping [`Scheduler`](crate::worker::Scheduler)
//! results onto status codes.

mod error;
pub mod models;
mod server;
pub mod services;
pub mod state;

pub use error::ApiError;
pub use server::router;
