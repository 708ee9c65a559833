//! HTTP layer: route handlers and the request/response bodies they exchange.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Wire types, documented for OpenAPI with `utoipa`
//!
//! The generated document is served at `/api-docs/openapi.json` with a browsable UI at `/docs`.

pub mod handlers;
pub mod models;
