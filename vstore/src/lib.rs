pub mod cli;
pub mod completion_cache;
pub mod load_config;
pub mod upload;

pub use cli::{run, Cli, Commands};
