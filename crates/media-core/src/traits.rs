//! Core types shared by media entities

/// Primary key type
pub type Id = i64;
