//! # pgpress backend
//!
//! Cycle accounting for press tools.
//!
//! Operators periodically report the cumulative counter of a press slot. From
//! those readings the crate derives per-reading partial cycles, tracks tool
//! regenerations (which reset a tool's running count), manages the binding
//! of cassette tools to top tools, and builds usage timelines per press.
//!
//! ## Architecture
//!
//! - [`models`]: Domain types (presses, positions, tools, readings, regenerations)
//! - [`db`]: Repository traits, the in-memory and Postgres backends, configuration
//! - [`services`]: Business logic and the [`services::PressService`] facade
//!
//! ## Backends
//!
//! - `local-repo` (default): in-memory storage for tests and development
//! - `postgres-repo`: PostgreSQL via Diesel with embedded migrations

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod db;
pub mod models;
pub mod services;
