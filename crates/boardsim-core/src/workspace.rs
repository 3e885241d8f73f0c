//! Per-run workspace directories.
//!
//! Every run gets its own uniquely named directory holding the staged
//! sources and build artifacts:
//!
//! ```text
//! boardsim-XXXXXX/
//! ├── CMakeLists.txt   # from the project template, if configured
//! ├── top.v            # staged user sources
//! └── obj_dir/Vtop     # produced by the build step
//! ```
//!
//! The directory either lives on the host (a [`TempDir`]) or inside a guest
//! environment, in which case only the guest-side path is known here and the
//! owning execution strategy removes it.

use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use tempfile::TempDir;

use crate::error::{Error, Result};

/// Prefix of every workspace directory name.
pub const WORKSPACE_PREFIX: &str = "boardsim-";

/// An exclusively owned run directory.
#[derive(Debug)]
pub struct Workspace {
    /// Root as seen by the toolchain.
    root: String,
    /// Backing host directory; `None` for guest workspaces.
    host_dir: Option<TempDir>,
    /// File names staged so far, in staging order.
    staged: Vec<String>,
}

impl Workspace {
    /// Create a fresh host-side workspace under the system temp directory.
    pub fn create_host() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir()
            .map_err(|e| Error::Staging {
                path: std::env::temp_dir(),
                message: format!("cannot create workspace: {}", e),
            })?;
        Ok(Self {
            root: dir.path().to_string_lossy().into_owned(),
            host_dir: Some(dir),
            staged: Vec::new(),
        })
    }

    /// Wrap a directory that already exists inside a guest environment.
    pub fn guest(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            host_dir: None,
            staged: Vec::new(),
        }
    }

    /// Root path as the toolchain sees it.
    pub fn root_str(&self) -> &str {
        &self.root
    }

    /// Host path of the workspace, if it lives on the host.
    pub fn host_path(&self) -> Option<&Path> {
        self.host_dir.as_ref().map(TempDir::path)
    }

    /// Names of the files staged into the workspace.
    pub fn staged(&self) -> &[String] {
        &self.staged
    }

    /// Path of `relative` inside the workspace, in the toolchain's terms.
    pub fn join(&self, relative: &str) -> String {
        format!("{}/{}", self.root.trim_end_matches(['/', '\\']), relative)
    }

    /// File name a source will be staged under.
    ///
    /// Two sources with the same name would overwrite each other, so the
    /// whole batch is rejected up front.
    pub fn staged_names(files: &[PathBuf]) -> Result<Vec<String>> {
        let mut seen = FxHashSet::default();
        files
            .iter()
            .map(|file| {
                let name = file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| Error::Staging {
                        path: file.clone(),
                        message: "not a file path".to_string(),
                    })?;
                if !seen.insert(name.clone()) {
                    return Err(Error::Staging {
                        path: file.clone(),
                        message: format!("another input is also named {}", name),
                    });
                }
                Ok(name)
            })
            .collect()
    }

    /// Copy a host file into a host workspace.
    pub(crate) fn copy_in(&mut self, source: &Path, name: &str) -> Result<()> {
        let Some(dir) = self.host_dir.as_ref() else {
            return Err(Error::Staging {
                path: source.to_path_buf(),
                message: "workspace is not on the host".to_string(),
            });
        };
        fs::copy(source, dir.path().join(name)).map_err(|e| Error::Staging {
            path: source.to_path_buf(),
            message: e.to_string(),
        })?;
        self.record_staged(name);
        Ok(())
    }

    pub(crate) fn record_staged(&mut self, name: &str) {
        self.staged.push(name.to_string());
    }

    /// Remove a host workspace. Guest workspaces are left to their strategy.
    pub(crate) fn remove_host_dir(&mut self) -> Result<()> {
        if let Some(dir) = self.host_dir.take() {
            let path = dir.path().to_path_buf();
            dir.close()?;
            tracing::debug!("Removed workspace {}", path.display());
        }
        Ok(())
    }
}

/// Regular files directly inside a template directory, sorted by name.
pub(crate) fn template_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| Error::Staging {
        path: dir.to_path_buf(),
        message: format!("cannot read template directory: {}", e),
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_workspaces_are_unique() {
        let a = Workspace::create_host().expect("Failed to create workspace");
        let b = Workspace::create_host().expect("Failed to create workspace");

        assert_ne!(a.root_str(), b.root_str());
        let name = a.host_path().unwrap().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(WORKSPACE_PREFIX));
    }

    #[test]
    fn test_copy_in_and_remove() {
        let src = TempDir::new().expect("Failed to create temp dir");
        let file = src.path().join("top.v");
        fs::write(&file, "module top; endmodule").expect("Failed to write source");

        let mut ws = Workspace::create_host().expect("Failed to create workspace");
        ws.copy_in(&file, "top.v").unwrap();

        let root = ws.host_path().unwrap().to_path_buf();
        assert!(root.join("top.v").exists());
        assert_eq!(ws.staged(), ["top.v"]);

        ws.remove_host_dir().unwrap();
        assert!(!root.exists());
        assert!(ws.host_path().is_none());
    }

    #[test]
    fn test_dropping_host_workspace_removes_it() {
        let ws = Workspace::create_host().expect("Failed to create workspace");
        let root = ws.host_path().unwrap().to_path_buf();
        drop(ws);
        assert!(!root.exists());
    }

    #[test]
    fn test_staged_names_rejects_duplicates() {
        let files = vec![PathBuf::from("a/top.v"), PathBuf::from("b/top.v")];
        assert!(matches!(
            Workspace::staged_names(&files),
            Err(Error::Staging { .. })
        ));

        let files = vec![PathBuf::from("a/top.v"), PathBuf::from("b/alu.v")];
        assert_eq!(Workspace::staged_names(&files).unwrap(), ["top.v", "alu.v"]);
    }

    #[test]
    fn test_guest_join() {
        let ws = Workspace::guest("/tmp/boardsim-1234/");
        assert_eq!(ws.join("obj_dir/Vtop"), "/tmp/boardsim-1234/obj_dir/Vtop");
        assert!(ws.host_path().is_none());
    }

    #[test]
    fn test_template_files_sorted() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(dir.path().join("b.cpp"), "").unwrap();
        fs::write(dir.path().join("CMakeLists.txt"), "").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let files = template_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["CMakeLists.txt", "b.cpp"]);
    }
}
