//! Session registry and collaborator trait definitions for Parley.
//!
//! This crate defines the "ports" (agent connection traits) that the
//! infrastructure layer implements, plus the session registry that
//! serializes access to per-session agent handles. It depends only on
//! `parley-types` -- never on `parley-infra` or any process/IO crate.

pub mod client;
pub mod registry;
