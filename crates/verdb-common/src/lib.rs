//! VerDB Common - Shared Types and Utilities
//!
//! Foundational error and configuration types used across the VerDB crates.
//! The document layer reports `StoreError`; everything above it speaks
//! `VerdbError`, which wraps store failures unchanged.
//!
//! Key Features:
//! - Unified error taxonomy with user/system classification
//! - Core configuration with TOML loading
//!
//! @version 0.1.0
//! @author VerDB Development Team

pub mod config;
pub mod error;

pub use config::CoreConfig;
pub use error::{Result, StoreError, StoreResult, VerdbError};
