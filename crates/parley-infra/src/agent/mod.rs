//! Agent collaborator implementations.

pub mod cli;

pub use cli::{CliConnection, CliConnector};
