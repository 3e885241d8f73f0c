//! Build toolchain invocation.
//!
//! A simulation is built in two steps run inside the workspace: a
//! project-generation step (cmake by default) and a build step (make). Both
//! are plain commands whose arguments may reference run-time parameters.

use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::workspace::Workspace;

use super::context::{CompileContext, OutputStream};

/// One of the two toolchain steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    Configure,
    Build,
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStep::Configure => f.write_str("configure"),
            BuildStep::Build => f.write_str("build"),
        }
    }
}

/// Run-time simulation parameters, passed to the build as opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimParams {
    /// Delay between simulation steps.
    pub sim_delay: String,
    /// Model iterations per clock cycle.
    pub it_per_cycle: String,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            sim_delay: "1".to_string(),
            it_per_cycle: "10".to_string(),
        }
    }
}

impl SimParams {
    pub fn new(sim_delay: impl Into<String>, it_per_cycle: impl Into<String>) -> Self {
        Self {
            sim_delay: sim_delay.into(),
            it_per_cycle: it_per_cycle.into(),
        }
    }
}

/// A program plus arguments.
///
/// Arguments may contain the placeholders `{sim_delay}`, `{it_per_cycle}`,
/// `{sources}` (staged file names joined by `;`) and `{workspace}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Substitute placeholders in the arguments.
    pub fn expand(&self, vars: &BuildVars<'_>) -> Vec<String> {
        let sources = vars.sources.join(";");
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{sim_delay}", vars.sim_delay)
                    .replace("{it_per_cycle}", vars.it_per_cycle)
                    .replace("{sources}", &sources)
                    .replace("{workspace}", vars.workspace)
            })
            .collect()
    }
}

/// Values available to [`CommandSpec::expand`].
#[derive(Debug, Clone, Copy)]
pub struct BuildVars<'a> {
    pub sim_delay: &'a str,
    pub it_per_cycle: &'a str,
    pub sources: &'a [String],
    pub workspace: &'a str,
}

impl<'a> BuildVars<'a> {
    pub fn new(workspace: &'a Workspace, params: &'a SimParams) -> Self {
        Self {
            sim_delay: &params.sim_delay,
            it_per_cycle: &params.it_per_cycle,
            sources: workspace.staged(),
            workspace: workspace.root_str(),
        }
    }
}

/// Commands used to turn staged sources into a simulator binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Project-generation step.
    pub configure: CommandSpec,
    /// Build step, run only after `configure` succeeds.
    pub build: CommandSpec,
    /// Simulator binary produced by the build, relative to the workspace.
    pub binary: String,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            configure: CommandSpec::new(
                "cmake",
                [
                    "-DSIM_DELAY={sim_delay}",
                    "-DIT_PER_CYCLE={it_per_cycle}",
                    "-DSOURCES={sources}",
                    ".",
                ],
            ),
            build: CommandSpec::new("make", Vec::<String>::new()),
            binary: "obj_dir/Vtop".to_string(),
        }
    }
}

impl ToolchainConfig {
    /// Check that the configured programs can be found.
    ///
    /// Only meaningful for native execution; returns the first missing
    /// program.
    pub fn missing_program(&self) -> Option<&str> {
        [&self.configure.program, &self.build.program]
            .into_iter()
            .find(|program| which::which(program.as_str()).is_err())
            .map(String::as_str)
    }
}

/// Run one toolchain step to completion.
///
/// Stdout and stderr are forwarded to the sink line by line as they arrive
/// and captured for the error report.
pub(crate) fn run_step(mut cmd: Command, step: BuildStep, ctx: &CompileContext<'_>) -> Result<()> {
    if ctx.abort.is_aborted() {
        return Err(Error::Aborted);
    }

    tracing::info!("Running {} step: {:?}", step, cmd);

    crate::supervisor::own_process_group(&mut cmd);
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::Compile {
            step,
            code: None,
            output: format!("failed to run {}: {}", cmd.get_program().to_string_lossy(), e),
        })?;

    ctx.abort.track(child.id());

    let captured = Mutex::new(String::new());
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    std::thread::scope(|scope| {
        let captured = &captured;
        let sink = ctx.sink;
        if let Some(stderr) = stderr {
            scope.spawn(move || forward_lines(stderr, OutputStream::Stderr, sink, captured));
        }
        if let Some(stdout) = stdout {
            forward_lines(stdout, OutputStream::Stdout, sink, captured);
        }
    });

    let status = child.wait();
    ctx.abort.untrack();
    let status = status?;

    if ctx.abort.is_aborted() {
        return Err(Error::Aborted);
    }

    if !status.success() {
        let output = captured.into_inner().unwrap_or_else(|p| p.into_inner());
        return Err(Error::Compile {
            step,
            code: status.code(),
            output,
        });
    }

    Ok(())
}

fn forward_lines<R: Read>(
    reader: R,
    stream: OutputStream,
    sink: &dyn super::DiagnosticSink,
    captured: &Mutex<String>,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                sink.line(stream, line);
                let mut captured = captured.lock().unwrap_or_else(|p| p.into_inner());
                captured.push_str(line);
                captured.push('\n');
            }
            Err(e) => {
                tracing::debug!("Stopped reading toolchain {}: {}", stream, e);
                break;
            }
        }
    }
}
