//! Intake - instrumented HTTP ingestion service
//!
//! Accepts requests with optional binary attachments, persists a record of
//! each to PostgreSQL, and exposes health probes plus Prometheus metrics
//! covering request latency, outcomes, query timing, and pool occupancy.

pub mod app;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod telemetry;
