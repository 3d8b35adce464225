//! SQLite storage layer for citedesk.
//!
//! This module provides the persistence layer using SQLite with:
//! - WAL mode for concurrent reads
//! - Transaction discipline for atomic writes
//! - Triggers cascading payment status to citation status
//! - Audit events for accountability
//!
//! # Submodules
//!
//! - [`events`] - Audit event storage
//! - [`hash`] - File checksums
//! - [`schema`] - Database schema definitions
//! - [`migrations`] - Embedded schema migrations
//! - [`sqlite`] - Connection handling and the mutation protocol

pub mod events;
pub mod hash;
pub mod migrations;
pub mod schema;
pub mod sqlite;

pub use sqlite::{MutationContext, SqliteStorage};
