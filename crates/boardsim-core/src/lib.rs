//! Core engine for boardsim, a front end for compiled FPGA board simulators.
//!
//! This crate provides:
//! - Execution strategies for native and WSL hosts
//! - Per-run workspaces and toolchain invocation
//! - Supervision of the simulator process
//! - The UDP datagram channel and its text codec
//! - Seven-segment and LED display decoding
//! - The session state machine tying it all together

pub mod compile;
pub mod config;
pub mod display;
pub mod error;
pub mod ipc;
pub mod session;
pub mod strategy;
pub mod supervisor;
pub mod workspace;

pub use compile::{
    AbortHandle, BuildStep, CollectingSink, CommandSpec, CompileContext, DiagnosticSink,
    OutputStream, SimParams, ToolchainConfig, TracingSink,
};
pub use config::{BoardsimConfig, ChannelConfig};
pub use display::{BoardLayout, DigitCell, DisplayFrame, decode_digit};
pub use error::{Error, Result};
pub use ipc::{BoardEvent, DatagramChannel, InputState, OutputState, ProtocolError};
pub use session::{Runner, Session, SessionState};
pub use strategy::{Backend, ExecutionStrategy, NativeStrategy, WslStrategy, detect};
pub use supervisor::SimProcess;
pub use workspace::Workspace;
