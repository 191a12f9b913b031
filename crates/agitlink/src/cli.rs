//! Command-line surface.

use anyhow::Result;
use clap::{ArgAction, Parser};

use crate::app::permalink;
use crate::infra::config::{Config, Environment, Invocation};

/// Print a commit-pinned permalink for the selection in the current acme window.
///
/// Run from inside acme (for example by middle-clicking `agitlink` in a window's tag) so
/// that `$winid` names the window.
#[derive(Debug, Parser)]
#[command(author, version)]
pub struct Cli {
    /// Window to read instead of `$winid`.
    #[arg(long, value_name = "ID")]
    pub winid: Option<u32>,

    /// Log protocol and git activity to stderr (repeat for more detail).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Resolve configuration from the process environment and produce the permalink.
    pub fn run(&self) -> Result<String> {
        let env = Environment::from_env();
        let config = Config::load(&env)?;
        let invocation = Invocation::resolve(&config, &env, self.winid)?;
        tracing::debug!(?invocation, "resolved invocation");
        permalink::run(&invocation)
    }
}
