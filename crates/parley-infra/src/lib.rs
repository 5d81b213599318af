//! Infrastructure layer for Parley.
//!
//! Contains the concrete implementation of the collaborator traits defined
//! in `parley-core` (the agent CLI subprocess transport) and configuration
//! loading from the data directory.

pub mod agent;
pub mod config;
