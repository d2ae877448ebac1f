//! # media-core
//!
//! Core types and configuration for Media RS.
//!
//! This crate provides the foundational building blocks used across all other crates:
//! - Primary key type
//! - Configuration types and environment loading

pub mod config;
pub mod traits;

pub use config::*;
pub use traits::*;
