//! Diagnostics forwarding and cancellation for toolchain runs.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Which child stream a diagnostic line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => f.write_str("stdout"),
            OutputStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// Receiver for toolchain output, called once per line as it arrives.
///
/// Lines from stdout and stderr are delivered from different threads.
pub trait DiagnosticSink: Send + Sync {
    fn line(&self, stream: OutputStream, line: &str);
}

impl<F> DiagnosticSink for F
where
    F: Fn(OutputStream, &str) + Send + Sync,
{
    fn line(&self, stream: OutputStream, line: &str) {
        self(stream, line)
    }
}

/// Sink that forwards every line to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn line(&self, stream: OutputStream, line: &str) {
        match stream {
            OutputStream::Stdout => tracing::info!(target: "boardsim::toolchain", "{}", line),
            OutputStream::Stderr => tracing::warn!(target: "boardsim::toolchain", "{}", line),
        }
    }
}

/// Sink that keeps every line in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    lines: Mutex<Vec<(OutputStream, String)>>,
}

impl CollectingSink {
    pub fn lines(&self) -> Vec<(OutputStream, String)> {
        self.lines.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// All lines joined with newlines, regardless of stream.
    pub fn text(&self) -> String {
        self.lines()
            .into_iter()
            .map(|(_, line)| line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DiagnosticSink for CollectingSink {
    fn line(&self, stream: OutputStream, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((stream, line.to_string()));
    }
}

/// Handle for cancelling an in-flight compile.
///
/// `AbortHandle` can be cloned and shared across threads; any clone can
/// trigger the abort. Aborting kills the toolchain process that is currently
/// running, so a teardown never has to wait for a long build.
///
/// # Example
///
/// ```
/// use boardsim_core::compile::AbortHandle;
///
/// let handle = AbortHandle::new();
/// let clone = handle.clone();
/// assert!(!handle.is_aborted());
///
/// clone.abort();
/// assert!(handle.is_aborted());
/// ```
#[derive(Clone, Default)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
    /// Pid of the toolchain step currently running.
    active: Arc<Mutex<Option<u32>>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Request abort and kill the running toolchain step, if any.
    pub fn abort(&self) {
        if self.aborted.swap(true, Ordering::SeqCst) {
            return;
        }
        let active = *self.active.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(pid) = active {
            tracing::info!("Aborting compile, killing toolchain process {}", pid);
            crate::supervisor::kill_tree(pid);
        }
    }

    /// Clear the abort flag before reuse.
    pub fn reset(&self) {
        self.aborted.store(false, Ordering::SeqCst);
    }

    pub(crate) fn track(&self, pid: u32) {
        *self.active.lock().unwrap_or_else(|p| p.into_inner()) = Some(pid);
        // abort may have raced with spawn
        if self.is_aborted() {
            crate::supervisor::kill_tree(pid);
        }
    }

    pub(crate) fn untrack(&self) {
        *self.active.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortHandle")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

/// What a toolchain run reports to and listens for.
#[derive(Clone, Copy)]
pub struct CompileContext<'a> {
    pub sink: &'a dyn DiagnosticSink,
    pub abort: &'a AbortHandle,
}

impl<'a> CompileContext<'a> {
    pub fn new(sink: &'a dyn DiagnosticSink, abort: &'a AbortHandle) -> Self {
        Self { sink, abort }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = |stream: OutputStream, line: &str| {
            seen.lock().unwrap().push(format!("{stream}: {line}"));
        };
        sink.line(OutputStream::Stderr, "warning");
        assert_eq!(seen.lock().unwrap().as_slice(), ["stderr: warning"]);
    }

    #[test]
    fn test_collecting_sink_text() {
        let sink = CollectingSink::default();
        sink.line(OutputStream::Stdout, "a");
        sink.line(OutputStream::Stderr, "b");
        assert_eq!(sink.text(), "a\nb");
    }

    #[test]
    fn test_abort_reset() {
        let handle = AbortHandle::new();
        handle.abort();
        assert!(handle.is_aborted());
        handle.reset();
        assert!(!handle.is_aborted());
    }

    #[cfg(unix)]
    #[test]
    fn test_abort_kills_process_without_own_group() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let handle = AbortHandle::new();
        handle.track(child.id());

        handle.abort();
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_abort_kills_whole_process_group() {
        let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let mut cmd = std::process::Command::new("sh");
        cmd.args(["-c", "sleep 30 & echo $! > grandchild.pid; wait"])
            .current_dir(dir.path());
        crate::supervisor::own_process_group(&mut cmd);
        let mut child = cmd.spawn().unwrap();

        let pid_file = dir.path().join("grandchild.pid");
        let grandchild = crate::supervisor::tests::wait_for_pid_file(&pid_file);

        let handle = AbortHandle::new();
        handle.track(child.id());
        handle.abort();

        assert!(!child.wait().unwrap().success());
        crate::supervisor::tests::assert_gone(grandchild);
    }
}
