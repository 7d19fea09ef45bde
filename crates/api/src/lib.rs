//! HTTP API: shopper-facing cart, checkout and order routes plus the
//! gateway webhook.

pub mod app;
pub mod auth;
pub mod config;
pub mod context;
pub mod middleware;
