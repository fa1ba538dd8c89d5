//! Nestogy - multi-tenant back office for Managed Service Providers
//!
//! Clients and contacts, assets and support contracts, tickets and the
//! knowledge base, employee time clock and payroll export, billable time and
//! invoicing, RMM webhook ingestion and physical mail.
//!
//! # Features
//! - **server**: HTTP server mode (default)
//! - **cli**: Command-line interface
//!
//! # Architecture
//! - `api`: HTTP handlers, middleware and JWT
//! - `services`: business rules, one service per domain area
//! - `storage`: sea-orm connection, retries and tenant-scoped queries
//! - `events` / `jobs`: in-process event bus and background job queue
//! - `interfaces`: CLI commands
//! - `config`: Configuration management
//! - `runtime`: Application lifecycle and execution modes
//! - `system`: Logging

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod events;
pub mod interfaces;
pub mod jobs;
pub mod models;
pub mod runtime;
pub mod services;
pub mod storage;
pub mod system;
pub mod utils;
