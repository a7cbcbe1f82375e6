//! API Module
//!
//! HTTP handlers and routing for the cache admin API.
//!
//! # Endpoints
//! - `PUT /entries` - Add an entry
//! - `DELETE /entries` - Clear the store or one group
//! - `GET /entries/:key` - Read an entry
//! - `DELETE /entries/:key` - Remove an entry
//! - `GET /stats` - Cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
