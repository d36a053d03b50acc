//! # VBS Common Library
//!
//! Shared code for the VBS viewing guide services including:
//! - Error types
//! - Event types (VbsEvent enum) and the EventBus
//! - Configuration file resolution and loading
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
