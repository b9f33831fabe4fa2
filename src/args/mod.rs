//! CLI argument types and parsing helpers.
mod cli;
mod defaults;
pub(crate) mod parsers;
mod types;


pub use cli::{Cli, Command, RunArgs, ServeArgs};
pub use types::PositiveU64;

pub(crate) use defaults::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_CONTENT_TYPE, DEFAULT_DRAIN_TIMEOUT, DEFAULT_LISTEN,
    DEFAULT_REGION,
};
