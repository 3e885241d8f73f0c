//! Host execution strategies.
//!
//! Staging, compiling, running and stopping a simulation depend on where
//! the toolchain lives. Each environment implements [`ExecutionStrategy`];
//! one is picked at startup by [`detect`] and the session only ever talks to
//! the trait.
//!
//! # Strategies
//!
//! - **`NativeStrategy`** - toolchain and simulator run directly on the host.
//! - **`WslStrategy`** - toolchain and simulator run inside a WSL guest and
//!   are driven through `wsl.exe` from a Windows host.

mod native;
mod wsl;

use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::compile::{BuildStep, BuildVars, CompileContext, SimParams, ToolchainConfig, run_step};
use crate::error::{Error, Result};
use crate::supervisor::SimProcess;
use crate::workspace::Workspace;

pub use native::NativeStrategy;
pub use wsl::{WslStrategy, to_guest_path};

/// How simulations are staged, built, run and stopped in one environment.
pub trait ExecutionStrategy: Send + Sync + fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Create a fresh, uniquely named workspace.
    fn stage_workspace(&self) -> Result<Workspace>;

    /// Copy host files into the workspace.
    ///
    /// The first failure aborts the remaining copies.
    fn copy_files(&self, workspace: &mut Workspace, files: &[PathBuf]) -> Result<()>;

    /// Command running `program` with the workspace as working directory.
    fn command(&self, workspace: &Workspace, program: &str, args: &[String]) -> Command;

    /// Whether `binary` (a workspace path from [`Workspace::join`]) exists.
    fn binary_exists(&self, workspace: &Workspace, binary: &str) -> bool;

    /// Recursively remove the workspace.
    fn discard_workspace(&self, workspace: &mut Workspace) -> Result<()>;

    /// Run the configure step, then the build step.
    ///
    /// The build step is skipped when configure fails, so a compile either
    /// fully succeeds or reports the first failing step.
    fn compile(
        &self,
        workspace: &Workspace,
        toolchain: &ToolchainConfig,
        params: &SimParams,
        ctx: &CompileContext<'_>,
    ) -> Result<()> {
        let vars = BuildVars::new(workspace, params);
        for (step, spec) in [
            (BuildStep::Configure, &toolchain.configure),
            (BuildStep::Build, &toolchain.build),
        ] {
            let args = spec.expand(&vars);
            run_step(self.command(workspace, &spec.program, &args), step, ctx)?;
        }
        Ok(())
    }

    /// Launch the compiled simulator.
    fn run(&self, workspace: &Workspace, toolchain: &ToolchainConfig) -> Result<SimProcess> {
        let binary = workspace.join(&toolchain.binary);
        if !self.binary_exists(workspace, &binary) {
            return Err(Error::Launch {
                binary: binary.into(),
                message: "binary not found; the build step did not produce it".to_string(),
            });
        }
        SimProcess::spawn(self.command(workspace, &binary, &[]), binary)
    }

    /// Stop the simulator, bounded by `grace` plus a forced kill.
    fn stop(&self, _workspace: &Workspace, process: &mut SimProcess, grace: Duration) -> Result<()> {
        process.terminate(grace)
    }
}

/// Which strategy to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backend {
    /// WSL on Windows hosts where it is installed, native otherwise.
    #[default]
    Auto,
    Native,
    Wsl,
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Backend::Auto),
            "native" => Ok(Backend::Native),
            "wsl" => Ok(Backend::Wsl),
            other => Err(Error::Config(format!(
                "unknown backend {:?} (expected auto, native or wsl)",
                other
            ))),
        }
    }
}

/// Pick the strategy for this host.
pub fn detect(backend: Backend) -> Result<Arc<dyn ExecutionStrategy>> {
    let strategy: Arc<dyn ExecutionStrategy> = match backend {
        Backend::Native => Arc::new(NativeStrategy::new()),
        Backend::Wsl => Arc::new(WslStrategy::locate()?),
        Backend::Auto => {
            if cfg!(windows) {
                match WslStrategy::locate() {
                    Ok(wsl) => Arc::new(wsl),
                    Err(e) => {
                        tracing::debug!("WSL unavailable ({}), using native execution", e);
                        Arc::new(NativeStrategy::new())
                    }
                }
            } else {
                Arc::new(NativeStrategy::new())
            }
        }
    };
    tracing::info!("Using {} execution strategy", strategy.name());
    Ok(strategy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_str() {
        assert_eq!("auto".parse::<Backend>().unwrap(), Backend::Auto);
        assert_eq!("Native".parse::<Backend>().unwrap(), Backend::Native);
        assert_eq!("WSL".parse::<Backend>().unwrap(), Backend::Wsl);
        assert!(matches!("docker".parse::<Backend>(), Err(Error::Config(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_auto_is_native_off_windows() {
        let strategy = detect(Backend::Auto).unwrap();
        assert_eq!(strategy.name(), "native");
    }
}
