//! Backend command implementation for boardsim CLI.

use boardsim_core::{Backend, BoardsimConfig, detect};

use crate::colors;

/// Resolve and print the execution backend.
pub fn execute(backend: &str) -> anyhow::Result<()> {
    let backend: Backend = backend.parse()?;
    let strategy = detect(backend)?;
    println!("{}", strategy.name());

    // Only meaningful for native execution; WSL resolves programs in the guest
    if strategy.name() == "native" {
        let config = BoardsimConfig::discover()?;
        if let Some(program) = config.toolchain.missing_program() {
            eprintln!(
                "{}Warning:{} {} not found in PATH",
                colors::YELLOW,
                colors::RESET,
                program
            );
        }
    }

    Ok(())
}
