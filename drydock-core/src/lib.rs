//! Drydock Core
//!
//! Core types and abstractions for the Drydock environment-workflow system.
//!
//! This crate contains:
//! - Domain types: Core business entities (Pipeline, Step, Task, TaskEvent)
//! - DTOs: Data transfer objects for the orchestrator API and its clients

pub mod domain;
pub mod dto;
