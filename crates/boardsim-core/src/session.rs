//! Simulation session lifecycle.
//!
//! A [`Session`] owns everything one simulation run acquires: the workspace,
//! the simulator process and the datagram channel. It moves through
//!
//! ```text
//! Idle -> Staged -> Compiled -> Running -> Stopped
//! ```
//!
//! and every path out of the run ends in `Stopped` with all resources
//! released. [`Runner`] keeps at most one session alive at a time.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::compile::{AbortHandle, CompileContext, DiagnosticSink, SimParams};
use crate::config::BoardsimConfig;
use crate::error::{Error, Result};
use crate::ipc::{BoardEvent, DatagramChannel, InputState, OutputState};
use crate::strategy::ExecutionStrategy;
use crate::supervisor::SimProcess;
use crate::workspace::{Workspace, template_files};

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Nothing acquired yet.
    Idle,
    /// Workspace created and inputs copied in.
    Staged,
    /// Toolchain succeeded; the binary is ready to launch.
    Compiled,
    /// Simulator running and channel open.
    Running,
    /// Torn down. Terminal.
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Staged => "staged",
            SessionState::Compiled => "compiled",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// One simulation run.
pub struct Session {
    strategy: Arc<dyn ExecutionStrategy>,
    config: BoardsimConfig,
    state: SessionState,
    workspace: Option<Workspace>,
    process: Option<SimProcess>,
    channel: Option<DatagramChannel>,
    /// Shared with callers so an in-flight compile can be interrupted.
    abort: AbortHandle,
}

impl Session {
    pub fn new(strategy: Arc<dyn ExecutionStrategy>, config: BoardsimConfig) -> Self {
        Self::with_abort_handle(strategy, config, AbortHandle::new())
    }

    /// Create a session whose compile listens to an existing abort handle.
    pub fn with_abort_handle(
        strategy: Arc<dyn ExecutionStrategy>,
        config: BoardsimConfig,
        abort: AbortHandle,
    ) -> Self {
        Self {
            strategy,
            config,
            state: SessionState::Idle,
            workspace: None,
            process: None,
            channel: None,
            abort,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &BoardsimConfig {
        &self.config
    }

    pub fn strategy(&self) -> &Arc<dyn ExecutionStrategy> {
        &self.strategy
    }

    /// Handle that kills the toolchain step of an in-flight [`compile`](Self::compile).
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn workspace(&self) -> Option<&Workspace> {
        self.workspace.as_ref()
    }

    /// Pid of the running simulator.
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().map(SimProcess::pid)
    }

    pub fn channel(&self) -> Option<&DatagramChannel> {
        self.channel.as_ref()
    }

    /// Stage `files` into a fresh workspace and build them.
    ///
    /// Files from the configured template directory are staged first. A
    /// staging failure releases everything and stops the session. A failed
    /// toolchain step leaves the session `Staged` with the workspace kept for
    /// inspection until [`stop`](Self::stop).
    pub fn compile(
        &mut self,
        files: &[PathBuf],
        params: &SimParams,
        sink: &dyn DiagnosticSink,
    ) -> Result<()> {
        self.require("compile", SessionState::Idle)?;

        if let Err(e) = self.stage(files) {
            self.abandon(&e);
            return Err(e);
        }
        self.transition(SessionState::Staged);

        let result = match self.workspace.as_ref() {
            Some(workspace) => {
                let ctx = CompileContext::new(sink, &self.abort);
                self.strategy
                    .compile(workspace, &self.config.toolchain, params, &ctx)
            }
            None => Err(Error::InvalidState {
                operation: "compile",
                state: self.state,
            }),
        };

        match result {
            Ok(()) => {
                self.transition(SessionState::Compiled);
                Ok(())
            }
            Err(Error::Aborted) => {
                self.abandon(&Error::Aborted);
                Err(Error::Aborted)
            }
            Err(e) => {
                if let Some(workspace) = &self.workspace {
                    tracing::info!("Compile failed, workspace kept at {}", workspace.root_str());
                }
                Err(e)
            }
        }
    }

    /// Launch the compiled simulator and open the datagram channel.
    ///
    /// Must be called inside a Tokio runtime. The receiver yields one event
    /// per valid inbound datagram. On any failure the session is torn down.
    pub fn run(&mut self) -> Result<mpsc::Receiver<BoardEvent>> {
        self.require("run", SessionState::Compiled)?;

        match self.launch() {
            Ok(events) => {
                self.transition(SessionState::Running);
                Ok(events)
            }
            Err(e) => {
                self.abandon(&e);
                Err(e)
            }
        }
    }

    /// Replace the input state waiting to be sent.
    pub fn set_input_state(&self, input: InputState) -> Result<()> {
        self.running_channel("set input state")?.set_input_state(input);
        Ok(())
    }

    /// Send the pending input state. Returns whether a datagram went out.
    pub fn send_input_state(&self) -> Result<bool> {
        self.running_channel("send input state")?.send_pending()
    }

    /// Latest state reported by the simulator.
    pub fn last_output(&self) -> Option<OutputState> {
        self.channel.as_ref().and_then(DatagramChannel::last_output)
    }

    /// Whether the simulator process is still alive.
    pub fn is_alive(&mut self) -> bool {
        self.process.as_mut().is_some_and(SimProcess::is_alive)
    }

    /// Tear down whatever the session holds. Valid in any state.
    ///
    /// Always ends in `Stopped`. The first cleanup failure is returned after
    /// every resource has been released.
    pub fn stop(&mut self) -> Result<()> {
        if self.state == SessionState::Stopped {
            return Ok(());
        }
        let result = self.release();
        self.transition(SessionState::Stopped);
        result
    }

    fn require(&self, operation: &'static str, expected: SessionState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn running_channel(&self, operation: &'static str) -> Result<&DatagramChannel> {
        match (&self.channel, self.state) {
            (Some(channel), SessionState::Running) => Ok(channel),
            _ => Err(Error::InvalidState {
                operation,
                state: self.state,
            }),
        }
    }

    fn stage(&mut self, files: &[PathBuf]) -> Result<()> {
        let mut staged = match self.config.template_dir.as_deref() {
            Some(dir) => template_files(dir)?,
            None => Vec::new(),
        };
        staged.extend(files.iter().cloned());

        let workspace = self.workspace.insert(self.strategy.stage_workspace()?);
        tracing::info!(
            "Staging {} file(s) into {}",
            staged.len(),
            workspace.root_str()
        );
        self.strategy.copy_files(workspace, &staged)
    }

    fn launch(&mut self) -> Result<mpsc::Receiver<BoardEvent>> {
        let Some(workspace) = self.workspace.as_ref() else {
            return Err(Error::InvalidState {
                operation: "run",
                state: self.state,
            });
        };
        let process = self.strategy.run(workspace, &self.config.toolchain)?;
        self.process = Some(process);

        let (channel, events) = DatagramChannel::open(&self.config.channel)?;
        self.channel = Some(channel);
        Ok(events)
    }

    /// Release everything after a failure that ends the run.
    fn abandon(&mut self, cause: &Error) {
        tracing::info!("Session aborted: {}", cause);
        if let Err(e) = self.release() {
            tracing::warn!("Cleanup after failed run was incomplete: {}", e);
        }
        self.transition(SessionState::Stopped);
    }

    fn release(&mut self) -> Result<()> {
        let mut first_error = None;

        // channel first so nothing is sent to a dying process
        if let Some(channel) = self.channel.take() {
            channel.close();
        }

        if let Some(mut process) = self.process.take() {
            let grace = self.config.stop_grace();
            let stopped = match self.workspace.as_ref() {
                Some(workspace) => self.strategy.stop(workspace, &mut process, grace),
                None => process.terminate(grace),
            };
            if let Err(e) = stopped {
                tracing::warn!("Failed to stop simulator: {}", e);
                first_error.get_or_insert(e);
            }
        }

        if let Some(mut workspace) = self.workspace.take() {
            if let Err(e) = self.strategy.discard_workspace(&mut workspace) {
                tracing::warn!("Failed to remove workspace {}: {}", workspace.root_str(), e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn transition(&mut self, next: SessionState) {
        tracing::info!("Session {} -> {}", self.state, next);
        self.state = next;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("strategy", &self.strategy.name())
            .field("state", &self.state)
            .field("workspace", &self.workspace.as_ref().map(Workspace::root_str))
            .field("pid", &self.pid())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("Session teardown on drop failed: {}", e);
        }
    }
}

/// Keeps at most one session alive.
///
/// Starting a new run first tears down the previous one, so switching
/// designs never leaves a stray simulator or bound port behind.
#[derive(Debug)]
pub struct Runner {
    strategy: Arc<dyn ExecutionStrategy>,
    config: BoardsimConfig,
    abort: AbortHandle,
    session: Option<Session>,
}

impl Runner {
    pub fn new(strategy: Arc<dyn ExecutionStrategy>, config: BoardsimConfig) -> Self {
        Self {
            strategy,
            config,
            abort: AbortHandle::new(),
            session: None,
        }
    }

    /// Abort handle shared by every session this runner starts.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    /// Tear down the current session, then compile and run `files`.
    ///
    /// A session whose compile failed is kept (in `Staged`) so its workspace
    /// can be inspected until the next `start` or `stop`.
    pub fn start(
        &mut self,
        files: &[PathBuf],
        params: &SimParams,
        sink: &dyn DiagnosticSink,
    ) -> Result<mpsc::Receiver<BoardEvent>> {
        self.stop()?;
        self.abort.reset();

        let session = self.session.insert(Session::with_abort_handle(
            self.strategy.clone(),
            self.config.clone(),
            self.abort.clone(),
        ));
        session.compile(files, params, sink)?;
        session.run()
    }

    /// Stop the current session. A no-op when nothing is running.
    pub fn stop(&mut self) -> Result<()> {
        match self.session.take() {
            Some(mut session) => session.stop(),
            None => Ok(()),
        }
    }

    /// Workspace root of the current session, if any.
    pub fn workspace_root(&self) -> Option<&Path> {
        self.session
            .as_ref()
            .and_then(Session::workspace)
            .and_then(Workspace::host_path)
    }
}
