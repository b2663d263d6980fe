//! Shared types, error kinds, and configuration for CloudLab Manager.
//!
//! This crate has no async runtime dependency and no I/O of its own — it is
//! the vocabulary every other `clm-*` crate builds on.

pub mod config;
pub mod error;
pub mod model;

pub use error::{Error, Result};
