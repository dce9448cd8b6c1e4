//! # Tagteam Common Library
//!
//! Shared code for the tagteam services:
//! - Common error type
//! - Configuration loading and root folder resolution
//! - Atomic JSON file persistence

pub mod config;
pub mod error;
pub mod json_file;

pub use error::{Error, Result};
