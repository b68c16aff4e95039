//! HTTP API over a [`medrag_core::RetrievalService`].
//!
//! | route         | method | response                                  |
//! |---------------|--------|-------------------------------------------|
//! | `/`           | GET    | service banner with the indexed count     |
//! | `/health`     | GET    | [`medrag_core::HealthStatus`]             |
//! | `/query`      | POST   | `{answer, sources, confidence}`           |
//!
//! Rejected questions answer `400 {"detail": ...}`; any other failure is
//! logged and answered with a generic `500`.

pub mod error;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, QueryRequest, ServerConfig, app_router, run_server};
