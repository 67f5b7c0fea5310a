//! # dealroom-store
//!
//! Durable local storage for in-progress deal drafts, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection`. Several handles (one per window or process) may
//! point at the same file; every draft write runs in an immediate
//! transaction and bumps the draft's version counter, which is what callers
//! compare to detect that another writer got there first.

pub mod database;
pub mod drafts;
pub mod migrations;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
