//! Execution directly on the host.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::Result;
use crate::workspace::Workspace;

use super::ExecutionStrategy;

/// Runs the toolchain and simulator as ordinary host processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeStrategy;

impl NativeStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl ExecutionStrategy for NativeStrategy {
    fn name(&self) -> &'static str {
        "native"
    }

    fn stage_workspace(&self) -> Result<Workspace> {
        let workspace = Workspace::create_host()?;
        tracing::debug!("Created workspace {}", workspace.root_str());
        Ok(workspace)
    }

    fn copy_files(&self, workspace: &mut Workspace, files: &[PathBuf]) -> Result<()> {
        let names = Workspace::staged_names(files)?;
        for (file, name) in files.iter().zip(&names) {
            workspace.copy_in(file, name)?;
            tracing::debug!("Staged {} as {}", file.display(), name);
        }
        Ok(())
    }

    fn command(&self, workspace: &Workspace, program: &str, args: &[String]) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args);
        match workspace.host_path() {
            Some(dir) => cmd.current_dir(dir),
            None => cmd.current_dir(workspace.root_str()),
        };
        cmd
    }

    fn binary_exists(&self, _workspace: &Workspace, binary: &str) -> bool {
        Path::new(binary).is_file()
    }

    fn discard_workspace(&self, workspace: &mut Workspace) -> Result<()> {
        workspace.remove_host_dir()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::compile::{AbortHandle, CollectingSink, CommandSpec, CompileContext, SimParams, ToolchainConfig};
    use crate::error::Error;

    fn sh_spec(script: &str) -> CommandSpec {
        CommandSpec::new("sh", ["-c", script])
    }

    #[test]
    fn test_copy_files_aborts_on_first_failure() {
        let src = TempDir::new().expect("Failed to create temp dir");
        let good = src.path().join("good.v");
        fs::write(&good, "module good; endmodule").unwrap();
        let files = vec![
            good,
            src.path().join("missing.v"),
            src.path().join("never.v"),
        ];

        let strategy = NativeStrategy::new();
        let mut ws = strategy.stage_workspace().unwrap();
        let err = strategy.copy_files(&mut ws, &files).unwrap_err();

        assert!(matches!(err, Error::Staging { .. }));
        assert_eq!(ws.staged(), ["good.v"]);
    }

    #[test]
    fn test_compile_passes_parameters() {
        let src = TempDir::new().expect("Failed to create temp dir");
        let model = src.path().join("model.v");
        fs::write(&model, "module top; endmodule").unwrap();

        let strategy = NativeStrategy::new();
        let mut ws = strategy.stage_workspace().unwrap();
        strategy.copy_files(&mut ws, &[model]).unwrap();

        let toolchain = ToolchainConfig {
            configure: sh_spec("echo delay={sim_delay} it={it_per_cycle} src='{sources}'"),
            build: sh_spec("test -f model.v && echo built"),
            binary: "model".to_string(),
        };
        let sink = CollectingSink::default();
        let abort = AbortHandle::new();
        strategy
            .compile(&ws, &toolchain, &SimParams::new("3", "40"), &CompileContext::new(&sink, &abort))
            .unwrap();

        let text = sink.text();
        assert!(text.contains("delay=3 it=40 src=model.v"), "got: {text}");
        assert!(text.contains("built"));
    }

    #[test]
    fn test_failed_configure_skips_build() {
        let strategy = NativeStrategy::new();
        let ws = strategy.stage_workspace().unwrap();

        let toolchain = ToolchainConfig {
            configure: sh_spec("echo 'CMake Error' >&2; exit 2"),
            build: sh_spec("touch build-ran"),
            binary: "model".to_string(),
        };
        let sink = CollectingSink::default();
        let abort = AbortHandle::new();
        let err = strategy
            .compile(&ws, &toolchain, &SimParams::default(), &CompileContext::new(&sink, &abort))
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Compile { step: crate::compile::BuildStep::Configure, code: Some(2), .. }
        ));
        assert!(!ws.host_path().unwrap().join("build-ran").exists());
    }

    #[test]
    fn test_run_without_binary_is_launch_error() {
        let strategy = NativeStrategy::new();
        let ws = strategy.stage_workspace().unwrap();

        let err = strategy.run(&ws, &ToolchainConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Launch { .. }));
    }

    #[test]
    fn test_discard_removes_directory() {
        let strategy = NativeStrategy::new();
        let mut ws = strategy.stage_workspace().unwrap();
        let root = ws.host_path().unwrap().to_path_buf();

        strategy.discard_workspace(&mut ws).unwrap();
        assert!(!root.exists());
        // second discard is a no-op
        strategy.discard_workspace(&mut ws).unwrap();
    }
}
