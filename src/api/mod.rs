//! API Module
//!
//! HTTP handlers and routing for the admin REST API.
//!
//! # Endpoints
//! - `PUT/GET/DELETE /cache/:namespace/:key` - Entry access
//! - `GET /cache/:namespace/:key/ttl` - Remaining TTL
//! - `POST /invalidate/tag/:tag`, `/invalidate/pattern`, `/invalidate/event/:name`
//! - `POST /warming/:strategy` - Run a warmup strategy now
//! - `GET /metrics`, `/metrics/history`, `/metrics/export`
//! - `GET /alerts`, `POST /alerts/:id/resolve`
//! - `GET /trends`, `/recommendations`, `/stats`, `/health`

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
