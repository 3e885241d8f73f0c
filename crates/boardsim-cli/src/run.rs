//! Run command implementation for boardsim CLI.
//!
//! Compiles the design, launches the simulator and then plays the board:
//! stdin lines toggle buttons and switches, every state the simulator
//! reports is printed as a display frame.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use boardsim_core::{
    Backend, BoardEvent, BoardLayout, BoardsimConfig, DisplayFrame, InputState, OutputStream,
    Runner, detect,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::colors;

/// How often to check whether the simulator exited on its own.
const LIVENESS_INTERVAL: Duration = Duration::from_millis(250);

/// Options for the run command.
pub struct RunOptions {
    pub files: Vec<PathBuf>,
    pub sim_delay: Option<String>,
    pub it_per_cycle: Option<String>,
    pub backend: String,
    pub config: Option<PathBuf>,
    pub bind: Option<SocketAddr>,
    pub peer: Option<SocketAddr>,
}

/// A parsed stdin line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoardCommand {
    Button(u32),
    Switch(u32),
    Stop,
}

/// Execute the run command.
pub async fn execute(options: RunOptions) -> anyhow::Result<()> {
    let mut config = match &options.config {
        Some(path) => BoardsimConfig::load(path)?,
        None => BoardsimConfig::discover()?,
    };
    if let Some(bind) = options.bind {
        config.channel.bind = bind;
    }
    if let Some(peer) = options.peer {
        config.channel.peer = peer;
    }

    let mut params = config.params.clone();
    if let Some(sim_delay) = options.sim_delay {
        params.sim_delay = sim_delay;
    }
    if let Some(it_per_cycle) = options.it_per_cycle {
        params.it_per_cycle = it_per_cycle;
    }

    let backend: Backend = options.backend.parse()?;
    let strategy = detect(backend)?;
    let layout = config.layout;

    println!(
        "\n{}Compiling{} {} file(s) ({} backend, sim_delay={}, it_per_cycle={})",
        colors::BOLD,
        colors::RESET,
        options.files.len(),
        strategy.name(),
        params.sim_delay,
        params.it_per_cycle
    );
    println!("{}", "─".repeat(50));

    let mut runner = Runner::new(strategy, config);

    // Ctrl+C during the blocking compile kills the toolchain step
    let abort = runner.abort_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    let sink = |stream: OutputStream, line: &str| match stream {
        OutputStream::Stdout => println!("{}  {}{}", colors::DIM, line, colors::RESET),
        OutputStream::Stderr => eprintln!("  {}", line),
    };
    let started = tokio::task::block_in_place(|| runner.start(&options.files, &params, &sink));
    interrupt.abort();
    let mut events = started?;

    println!("{}", "─".repeat(50));
    println!(
        "{}Running{} - type `button N`, `switch N` or `stop` (Ctrl+C to quit)",
        colors::GREEN,
        colors::RESET
    );

    let result = drive(&mut runner, &mut events, &layout).await;
    let stopped = runner.stop();
    result?;
    stopped?;

    println!("{}Stopped{}", colors::CYAN, colors::RESET);
    Ok(())
}

/// Pump stdin commands and simulator events until stopped.
async fn drive(
    runner: &mut Runner,
    events: &mut tokio::sync::mpsc::Receiver<BoardEvent>,
    layout: &BoardLayout,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut input = InputState::default();
    let mut liveness = tokio::time::interval(LIVENESS_INTERVAL);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(BoardEvent::OutputStateReceived(output)) => {
                    let frame = DisplayFrame::from_output(&output, layout);
                    println!("{}", frame.render());
                    colors::flush_stdout();
                }
                None => break,
            },

            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => {
                    let Some(session) = runner.session() else { break };
                    match parse_command(&line, layout) {
                        Ok(Some(BoardCommand::Stop)) => break,
                        Ok(Some(BoardCommand::Button(index))) => {
                            input.toggle_button(index);
                            session.set_input_state(input)?;
                            session.send_input_state()?;
                        }
                        Ok(Some(BoardCommand::Switch(index))) => {
                            input.toggle_switch(index);
                            session.set_input_state(input)?;
                            session.send_input_state()?;
                        }
                        Ok(None) => {}
                        Err(message) => {
                            eprintln!("{}Error:{} {}", colors::RED, colors::RESET, message);
                        }
                    }
                }
                // keep running on EOF; the simulator or Ctrl+C ends the run
                None => stdin_open = false,
            },

            _ = liveness.tick() => {
                let alive = runner.session_mut().is_some_and(|s| s.is_alive());
                if !alive {
                    eprintln!("{}Simulator exited{}", colors::YELLOW, colors::RESET);
                    break;
                }
            }

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}

/// Parse one stdin line. Blank lines yield `None`.
fn parse_command(line: &str, layout: &BoardLayout) -> Result<Option<BoardCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let command = match verb {
        "stop" => BoardCommand::Stop,
        "button" | "switch" => {
            let index: u32 = words
                .next()
                .ok_or_else(|| format!("`{}` needs an index", verb))?
                .parse()
                .map_err(|e| format!("invalid {} index: {}", verb, e))?;
            let count = if verb == "button" {
                layout.buttons
            } else {
                layout.switches
            };
            if index >= count {
                return Err(format!("{} {} out of range (board has {})", verb, index, count));
            }
            if verb == "button" {
                BoardCommand::Button(index)
            } else {
                BoardCommand::Switch(index)
            }
        }
        other => return Err(format!("unknown command `{}`", other)),
    };

    if let Some(extra) = words.next() {
        return Err(format!("unexpected `{}` after {}", extra, verb));
    }
    Ok(Some(command))
}
