//! API Module
//!
//! HTTP handlers and routing for the admin API.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /stats` - Get cache statistics
//! - `POST /snapshot` - Write a snapshot on demand

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
