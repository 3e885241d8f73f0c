//! Decode command implementation for boardsim CLI.
//!
//! Decodes one inbound payload the way the running front end would and
//! prints the resulting display frame.

use std::path::Path;

use boardsim_core::{BoardLayout, BoardsimConfig, DisplayFrame, OutputState};

/// Execute the decode command.
pub fn execute(payload: &str, json: bool, config: Option<&Path>) -> anyhow::Result<()> {
    let layout = match config {
        Some(path) => BoardsimConfig::load(path)?.layout,
        None => BoardLayout::default(),
    };

    let output: OutputState = payload.parse().map_err(boardsim_core::Error::from)?;
    let frame = DisplayFrame::from_output(&output, &layout);

    if json {
        let value = serde_json::json!({
            "output": output,
            "digit": output.digit(),
            "frame": frame,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", output);
        println!("{}", frame.render());
    }

    Ok(())
}
