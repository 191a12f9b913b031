//! Infrastructure adapters for the editor transport, git, config, and logging.

pub mod acme;
pub mod chunked;
pub mod config;
pub mod git;
pub mod logging;
pub mod ninep;
