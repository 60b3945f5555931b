//! Postgres access: pool, schema bootstrap and one repository per table group
//!
//! Uniqueness (usernames, list names, contact emails, list membership) is left
//! to the database; repositories translate SQLSTATE 23505 into `Conflict` or
//! use `ON CONFLICT` instead of checking first. Per-recipient outcomes and list
//! deletion each commit as one transaction.

pub mod migrations;
pub mod pool;
pub mod repos;

pub use pool::{create_pool, pool_options};
pub use repos::*;
