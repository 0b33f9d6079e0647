//! Integration tests for sql-runner.
//!
//! Playbook and Snowflake tests run against mocks. Postgres tests require a
//! running PostgreSQL database and are skipped unless DATABASE_URL is set.

pub mod playbook_test;
pub mod postgres_test;
pub mod snowflake_test;
