//! Compilation of a simulation inside a staged workspace.
//!
//! This module provides:
//! - Toolchain configuration (configure + build commands, binary location)
//! - Step execution with line-by-line diagnostics forwarding
//! - Cancellation of an in-flight compile
//!
//! # Architecture
//!
//! ```text
//! Workspace (staged sources)
//!     │
//!     ├── configure: cmake -DSIM_DELAY=.. -DIT_PER_CYCLE=.. .
//!     │       └── stdout/stderr ──► DiagnosticSink
//!     │
//!     └── build: make                (only if configure succeeded)
//!             └── stdout/stderr ──► DiagnosticSink
//!                     │
//!                     └── obj_dir/Vtop
//! ```

mod context;
mod toolchain;

pub use context::{
    AbortHandle, CollectingSink, CompileContext, DiagnosticSink, OutputStream, TracingSink,
};
pub(crate) use toolchain::run_step;
pub use toolchain::{BuildStep, BuildVars, CommandSpec, SimParams, ToolchainConfig};
