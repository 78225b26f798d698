//! `syncroot completions <shell>` - print a completion script
//!
//! Typical install for bash:
//! `syncroot completions bash > ~/.local/share/bash-completion/completions/syncroot`

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::Shell;

const BIN_NAME: &str = "syncroot";

#[derive(Debug, clap::Args)]
pub struct CompletionsCommand {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsCommand {
    pub fn execute(&self) -> Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        write_script(self.shell, &mut out)?;
        out.flush().context("Failed to flush completion script")
    }
}

/// Renders the completion script for `shell` covering every subcommand
fn write_script(shell: Shell, out: &mut dyn Write) -> Result<()> {
    let mut cmd = crate::Cli::command();
    clap_complete::generate(shell, &mut cmd, BIN_NAME, out);
    Ok(())
}
