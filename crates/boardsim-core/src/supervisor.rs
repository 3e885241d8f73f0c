//! Supervision of the running simulator process.
//!
//! [`SimProcess`] owns the child handle. Termination is idempotent and
//! bounded: a polite request first, a forced kill once the grace period runs
//! out, and the child is always reaped.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Interval between exit checks while waiting out the grace period.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Handle to a launched simulator.
pub struct SimProcess {
    child: Child,
    /// Binary path as passed to the launcher, for messages.
    binary: String,
    /// Set once terminate has run; later calls are no-ops.
    terminated: bool,
}

impl SimProcess {
    /// Spawn the simulator from a fully prepared command.
    pub(crate) fn spawn(mut cmd: Command, binary: impl Into<String>) -> Result<Self> {
        let binary = binary.into();
        own_process_group(&mut cmd);
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Launch {
                binary: binary.clone().into(),
                message: e.to_string(),
            })?;

        if let Some(stdout) = child.stdout.take() {
            forward_output(stdout, "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(stderr, "stderr");
        }

        tracing::info!("Simulator {} started with pid {}", binary, child.id());

        Ok(Self {
            child,
            binary,
            terminated: false,
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Check if the process is still running.
    pub fn is_alive(&mut self) -> bool {
        if self.terminated {
            return false;
        }
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Exit status, if the process has exited.
    pub fn try_status(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    /// Stop the process within `grace` plus the time a forced kill takes.
    ///
    /// The whole process group is signalled, so anything the simulator
    /// spawned goes with it. Safe to call repeatedly and after the process
    /// exited on its own. Until the child has been reaped, a failed call
    /// leaves the process eligible for another attempt.
    pub fn terminate(&mut self, grace: Duration) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        let pid = self.pid();

        if let Some(status) = self.child.try_wait()? {
            // leader is gone, stragglers in its group may not be
            kill_tree(pid);
            self.terminated = true;
            tracing::info!("Simulator {} already exited ({})", self.binary, status);
            return Ok(());
        }

        if request_stop(pid) {
            let deadline = Instant::now() + grace;
            loop {
                if let Some(status) = self.child.try_wait()? {
                    kill_tree(pid);
                    self.terminated = true;
                    tracing::info!("Simulator {} stopped ({})", self.binary, status);
                    return Ok(());
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                std::thread::sleep(POLL_INTERVAL.min(deadline - now));
            }
            tracing::warn!(
                "Simulator {} ignored termination request for {:?}, killing",
                self.binary,
                grace
            );
        }

        kill_tree(pid);
        if let Err(e) = self.child.kill() {
            tracing::debug!("Direct kill of simulator {} failed: {}", self.binary, e);
        }
        let status = self.child.wait()?;
        self.terminated = true;
        tracing::info!("Simulator {} killed ({})", self.binary, status);
        Ok(())
    }
}

impl std::fmt::Debug for SimProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimProcess")
            .field("pid", &self.child.id())
            .field("binary", &self.binary)
            .field("terminated", &self.terminated)
            .finish()
    }
}

impl Drop for SimProcess {
    fn drop(&mut self) {
        // Drop skips the grace period; orderly shutdown goes through terminate
        let _ = self.terminate(Duration::ZERO);
    }
}

/// Whether a process with this pid exists (zombies included).
#[cfg(unix)]
pub fn process_exists(pid: u32) -> bool {
    // SAFETY: signal 0 performs only the existence and permission check.
    let rc = unsafe { libc::kill(pid as i32, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Give the child its own process group, led by the child itself.
///
/// Toolchain steps and simulators are spawned this way so that
/// [`kill_tree`] reaches every process they start.
pub(crate) fn own_process_group(cmd: &mut Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    #[cfg(not(unix))]
    {
        let _ = cmd;
    }
}

/// Forcibly kill `pid` and every process in the group it leads.
pub(crate) fn kill_tree(pid: u32) {
    #[cfg(unix)]
    {
        // a process spawned without its own group is killed on its own
        if !signal_group(pid, libc::SIGKILL) {
            // SAFETY: kill(2) has no memory-safety preconditions.
            unsafe {
                libc::kill(pid as i32, libc::SIGKILL);
            }
        }
    }

    #[cfg(windows)]
    {
        let _ = Command::new("taskkill")
            .args(["/F", "/T", "/PID", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}

/// Ask the process group to exit. Returns false when there is no polite way.
fn request_stop(pid: u32) -> bool {
    #[cfg(unix)]
    {
        signal_group(pid, libc::SIGTERM)
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

#[cfg(unix)]
fn signal_group(pgid: u32, signal: libc::c_int) -> bool {
    // SAFETY: kill(2) has no memory-safety preconditions.
    unsafe { libc::kill(-(pgid as i32), signal) == 0 }
}

fn forward_output<R: Read + Send + 'static>(reader: R, stream: &'static str) {
    let spawned = std::thread::Builder::new()
        .name(format!("sim-{}", stream))
        .spawn(move || {
            let reader = BufReader::new(reader);
            for line in reader.lines() {
                match line {
                    Ok(line) => tracing::info!(target: "boardsim::simulator", "[{}] {}", stream, line),
                    Err(_) => break,
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!("Cannot forward simulator {}: {}", stream, e);
    }
}
