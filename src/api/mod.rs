//! API Module
//!
//! HTTP handlers and routing for the cache server REST API.
//!
//! # Endpoints
//! - `PUT /set` - Store a JSON value (`ttl` in milliseconds)
//! - `GET /get/:key` - Retrieve a value by key
//! - `DELETE /del/:key` - Delete a key
//! - `POST /expire/:key` - Restart a key's TTL
//! - `GET /ttl/:key` - Remaining TTL in milliseconds
//! - `POST /incr/:key` - Add to a counter
//! - `POST /invalidate` - Delete keys matching a regex
//! - `GET /stats` - Get cache statistics
//! - `GET /cluster/nodes` - Known peers and leadership
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
