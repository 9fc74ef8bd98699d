//! Churn prediction HTTP server
//!
//! Binds the prediction pipeline to HTTP endpoints and exposes health,
//! readiness and Prometheus metrics.

pub mod api;
pub mod config;
