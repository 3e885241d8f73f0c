//! Execution inside a WSL guest from a Windows host.
//!
//! The toolchain only exists in the Linux guest, so every step goes through
//! `wsl.exe`. Workspaces live in the guest's `/tmp`, host files are copied
//! in through the `/mnt/<drive>` mounts, and the simulator is stopped both by
//! killing the `wsl.exe` launcher and by killing the guest process.

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::supervisor::SimProcess;
use crate::workspace::{WORKSPACE_PREFIX, Workspace};

use super::ExecutionStrategy;

/// Guest directory that holds workspaces.
const GUEST_TMP: &str = "/tmp";

/// Drives the toolchain through `wsl.exe`.
#[derive(Debug, Clone)]
pub struct WslStrategy {
    /// Path to `wsl.exe`.
    wsl: PathBuf,
    /// Distribution to use; the default distribution when `None`.
    distro: Option<String>,
}

impl WslStrategy {
    /// Find `wsl` on `PATH`.
    pub fn locate() -> Result<Self> {
        let wsl = which::which("wsl")
            .map_err(|e| Error::Config(format!("wsl not found in PATH: {}", e)))?;
        Ok(Self { wsl, distro: None })
    }

    pub fn new(wsl: impl Into<PathBuf>) -> Self {
        Self {
            wsl: wsl.into(),
            distro: None,
        }
    }

    /// Use a specific distribution instead of the default one.
    pub fn with_distro(mut self, distro: impl Into<String>) -> Self {
        self.distro = Some(distro.into());
        self
    }

    /// `wsl [-d distro]` with nothing else.
    fn base(&self) -> Command {
        let mut cmd = Command::new(&self.wsl);
        if let Some(distro) = &self.distro {
            cmd.args(["-d", distro]);
        }
        cmd
    }

    /// Guest command line executed directly, without the guest's shell.
    ///
    /// `--exec` keeps every argument a single word, so `;` in a source list
    /// or spaces and `$` in paths reach the program unchanged.
    fn guest_command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = self.base();
        cmd.arg("--exec").args(args);
        cmd
    }

    /// Run a guest command to completion, capturing its output.
    fn guest<I, S>(&self, args: I) -> std::io::Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        self.guest_command(args).stdin(Stdio::null()).output()
    }
}

impl ExecutionStrategy for WslStrategy {
    fn name(&self) -> &'static str {
        "wsl"
    }

    fn stage_workspace(&self) -> Result<Workspace> {
        let root = format!(
            "{}/{}{}",
            GUEST_TMP,
            WORKSPACE_PREFIX,
            uuid::Uuid::new_v4().simple()
        );
        let output = self.guest(["mkdir", "-p", root.as_str()]).map_err(|e| Error::Staging {
            path: PathBuf::from(&root),
            message: format!("failed to run wsl: {}", e),
        })?;
        if !output.status.success() {
            return Err(Error::Staging {
                path: PathBuf::from(&root),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        tracing::debug!("Created guest workspace {}", root);
        Ok(Workspace::guest(root))
    }

    fn copy_files(&self, workspace: &mut Workspace, files: &[PathBuf]) -> Result<()> {
        let names = Workspace::staged_names(files)?;
        for (file, name) in files.iter().zip(&names) {
            let staging_error = |message: String| Error::Staging {
                path: file.clone(),
                message,
            };

            let host = std::path::absolute(file).map_err(|e| staging_error(e.to_string()))?;
            let source = to_guest_path(&host)
                .ok_or_else(|| staging_error("path cannot be reached from the guest".to_string()))?;
            let dest = workspace.join(name);

            let output = self
                .guest(["cp", source.as_str(), dest.as_str()])
                .map_err(|e| staging_error(format!("failed to run wsl: {}", e)))?;
            if !output.status.success() {
                return Err(staging_error(
                    String::from_utf8_lossy(&output.stderr).trim().to_string(),
                ));
            }
            workspace.record_staged(name);
            tracing::debug!("Staged {} as {}", source, dest);
        }
        Ok(())
    }

    fn command(&self, workspace: &Workspace, program: &str, args: &[String]) -> Command {
        let mut cmd = self.base();
        cmd.args(["--cd", workspace.root_str(), "--exec", program]).args(args);
        cmd
    }

    fn binary_exists(&self, _workspace: &Workspace, binary: &str) -> bool {
        self.guest(["test", "-x", binary])
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    fn discard_workspace(&self, workspace: &mut Workspace) -> Result<()> {
        let root = workspace.root_str();
        // never hand rm -rf anything but one of our own directories
        if !is_guest_workspace(root) {
            return Err(Error::Staging {
                path: PathBuf::from(root),
                message: "refusing to remove a directory boardsim did not create".to_string(),
            });
        }
        let output = self.guest(["rm", "-rf", root])?;
        if !output.status.success() {
            return Err(Error::Staging {
                path: PathBuf::from(root),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        tracing::debug!("Removed guest workspace {}", root);
        Ok(())
    }

    fn stop(&self, workspace: &Workspace, process: &mut SimProcess, grace: Duration) -> Result<()> {
        // Killing wsl.exe does not reliably take the guest process with it
        let pattern = workspace.join("");
        let killed = self.guest(["pkill", "-f", pattern.as_str()]);
        if let Err(e) = killed {
            tracing::warn!("Failed to kill guest simulator: {}", e);
        }
        process.terminate(grace)
    }
}

fn is_guest_workspace(root: &str) -> bool {
    root.strip_prefix(GUEST_TMP)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|name| name.starts_with(WORKSPACE_PREFIX) && !name.contains('/'))
}

/// Translate a host path into the path the WSL guest sees.
///
/// - `C:\Users\me\top.v` becomes `/mnt/c/Users/me/top.v`
/// - `\\wsl$\Ubuntu\home\me\top.v` and `\\wsl.localhost\Ubuntu\...` become
///   `/home/me/top.v`
/// - paths already in guest form (starting with `/`) are returned unchanged
///
/// Returns `None` for relative paths and other network shares.
pub fn to_guest_path(path: &Path) -> Option<String> {
    let raw = path.to_string_lossy();
    let raw = raw.strip_prefix(r"\\?\").unwrap_or(raw.as_ref());

    if raw.starts_with('/') {
        return Some(raw.to_string());
    }

    for share in [r"\\wsl$\", r"\\wsl.localhost\"] {
        if let Some(rest) = raw.strip_prefix(share) {
            // skip the distribution name
            let (_, inner) = rest.split_once('\\').unwrap_or((rest, ""));
            return Some(format!("/{}", inner.replace('\\', "/")));
        }
    }

    let mut chars = raw.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some(drive), Some(':'), Some('\\' | '/')) if drive.is_ascii_alphabetic() => {
            let rest = &raw[3..];
            let rest = rest.replace('\\', "/");
            let rest = rest.trim_end_matches('/');
            if rest.is_empty() {
                Some(format!("/mnt/{}", drive.to_ascii_lowercase()))
            } else {
                Some(format!("/mnt/{}/{}", drive.to_ascii_lowercase(), rest))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_paths() {
        assert_eq!(
            to_guest_path(Path::new(r"C:\Users\me\project\top.v")).as_deref(),
            Some("/mnt/c/Users/me/project/top.v")
        );
        assert_eq!(
            to_guest_path(Path::new("D:/work/alu.v")).as_deref(),
            Some("/mnt/d/work/alu.v")
        );
        assert_eq!(to_guest_path(Path::new(r"E:\")).as_deref(), Some("/mnt/e"));
        assert_eq!(
            to_guest_path(Path::new(r"\\?\C:\long\path.v")).as_deref(),
            Some("/mnt/c/long/path.v")
        );
    }

    #[test]
    fn test_wsl_share_paths() {
        assert_eq!(
            to_guest_path(Path::new(r"\\wsl$\Ubuntu\home\me\top.v")).as_deref(),
            Some("/home/me/top.v")
        );
        assert_eq!(
            to_guest_path(Path::new(r"\\wsl.localhost\Debian\tmp\x.v")).as_deref(),
            Some("/tmp/x.v")
        );
    }

    #[test]
    fn test_untranslatable_paths() {
        assert_eq!(to_guest_path(Path::new("relative/top.v")), None);
        assert_eq!(to_guest_path(Path::new(r"\\server\share\top.v")), None);
        assert_eq!(
            to_guest_path(Path::new("/home/me/top.v")).as_deref(),
            Some("/home/me/top.v")
        );
    }

    #[test]
    fn test_guest_workspace_guard() {
        assert!(is_guest_workspace("/tmp/boardsim-0123abcd"));
        assert!(!is_guest_workspace("/tmp"));
        assert!(!is_guest_workspace("/"));
        assert!(!is_guest_workspace("/tmp/boardsim-x/../../etc"));
        assert!(!is_guest_workspace("/home/me/boardsim-x"));
    }

    #[test]
    fn test_command_shape() {
        let strategy = WslStrategy::new("wsl").with_distro("Ubuntu");
        let ws = Workspace::guest("/tmp/boardsim-abc");
        let cmd = strategy.command(&ws, "make", &["-j2".to_string()]);

        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            ["-d", "Ubuntu", "--cd", "/tmp/boardsim-abc", "--exec", "make", "-j2"]
        );
    }

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_shell_metacharacters_stay_single_arguments() {
        let strategy = WslStrategy::new("wsl");
        let ws = Workspace::guest("/tmp/boardsim-abc");

        let cmd = strategy.command(
            &ws,
            "cmake",
            &["-DSOURCES=alu.v;top.v".to_string(), ".".to_string()],
        );
        assert_eq!(
            args_of(&cmd),
            ["--cd", "/tmp/boardsim-abc", "--exec", "cmake", "-DSOURCES=alu.v;top.v", "."]
        );

        let cmd = strategy.guest_command([
            "cp",
            "/mnt/c/My Designs/$top.v",
            "/tmp/boardsim-abc/$top.v",
        ]);
        assert_eq!(
            args_of(&cmd),
            ["--exec", "cp", "/mnt/c/My Designs/$top.v", "/tmp/boardsim-abc/$top.v"]
        );
    }
}
