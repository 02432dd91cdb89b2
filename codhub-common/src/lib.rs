//! # CODHub Common Library
//!
//! Shared code for the CODHub order platform services:
//! - Error and result types
//! - Configuration loading (TOML, root folder resolution)
//! - Database initialization, schema and migrations
//! - Sync event types and the EventBus
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
