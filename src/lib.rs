//! sql-runner - runs SQL playbooks against Postgres, Redshift and Snowflake.
//!
//! This library exposes the core modules for the binary and integration tests.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod query;
