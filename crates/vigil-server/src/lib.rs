//! vigil collector server: per-agent run-control and sample ingestion over
//! HTTP, backed by [`vigil_storage`].

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod control;
pub mod ingest;
pub mod logging;
pub mod state;
