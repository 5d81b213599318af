//! Shared domain types for Parley.
//!
//! This crate contains the types used across the Parley gateway:
//! agent replies, session snapshots, configuration, and error kinds.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod agent;
pub mod config;
pub mod error;
pub mod session;
