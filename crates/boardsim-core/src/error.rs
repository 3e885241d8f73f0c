//! Error types for boardsim-core.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::compile::BuildStep;
use crate::ipc::ProtocolError;
use crate::session::SessionState;

/// Result type for boardsim-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in boardsim-core.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Workspace creation or file staging failed.
    #[error("failed to stage {}: {message}", path.display())]
    Staging { path: PathBuf, message: String },

    /// A toolchain step exited unsuccessfully.
    #[error("{step} step failed{}:\n{output}", code.map(|c| format!(" with exit code {}", c)).unwrap_or_default())]
    Compile {
        step: BuildStep,
        code: Option<i32>,
        output: String,
    },

    /// The simulator binary could not be started.
    #[error("failed to launch {}: {message}", binary.display())]
    Launch { binary: PathBuf, message: String },

    /// The datagram socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Malformed datagram payload.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Operation not valid in the current session state.
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// Compilation was aborted by a teardown request.
    #[error("compilation aborted")]
    Aborted,

    /// No async runtime available for the datagram channel.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error ends the current run.
    ///
    /// Protocol errors are recovered locally by the channel.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Protocol(_))
    }

    /// Render the error with a short recovery hint for terminal output.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Error::Staging { .. } => Some("check that the input files exist and the temp directory is writable"),
            Error::Compile { step: BuildStep::Configure, .. } => {
                Some("check the configure command and the project template (is cmake installed?)")
            }
            Error::Compile { step: BuildStep::Build, .. } => Some("fix the diagnostics above and start again"),
            Error::Launch { .. } => Some("check that the build step produces the configured binary"),
            Error::Bind { .. } => Some("another simulator session may still be running; stop it or change the port"),
            Error::Runtime(_) => Some("the datagram channel must be opened inside a Tokio runtime"),
            Error::Config(_) => Some("fix the configuration file or remove it to use defaults"),
            _ => None,
        };
        match hint {
            Some(hint) => format!("{}\n  hint: {}", self, hint),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_display_includes_code_and_output() {
        let err = Error::Compile {
            step: BuildStep::Build,
            code: Some(1),
            output: "syntax error".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("build step failed with exit code 1"));
        assert!(text.contains("syntax error"));
    }

    #[test]
    fn test_protocol_errors_are_not_fatal() {
        let err = Error::Protocol(ProtocolError::Empty);
        assert!(!err.is_fatal());
        assert!(Error::Aborted.is_fatal());
    }

    #[test]
    fn test_with_hint() {
        let err = Error::Bind {
            addr: "127.0.0.1:40100".parse().unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(err.with_hint().contains("hint:"));
        assert_eq!(Error::Aborted.with_hint(), "compilation aborted");
    }
}
