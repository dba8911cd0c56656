//! Drydock Orchestrator
//!
//! Pipeline orchestration engine for remote development environments.
//!
//! Architecture:
//! - API: axum HTTP handlers (`api/`)
//! - Services: business logic — pipeline engine, gate controller, task
//!   executor, event log (`service/`)
//! - Repositories: all database access (`repository/`)
//! - Channel: the remote session boundary the executor drives commands
//!   through (`channel`)

pub mod api;
pub mod channel;
pub mod db;
pub mod locks;
pub mod repository;
pub mod service;
pub mod state;
