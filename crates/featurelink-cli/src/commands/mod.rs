//! CLI command handlers.

pub(crate) mod config;
pub(crate) mod descriptors;
pub(crate) mod fetch;
pub(crate) mod generate;
pub(crate) mod integrate;
