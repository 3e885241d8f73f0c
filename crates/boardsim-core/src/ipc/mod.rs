//! Datagram communication with a running simulator.
//!
//! This module provides the text wire format and the UDP channel that
//! carries it while a simulation runs.

mod channel;
pub mod protocol;

pub use channel::{BoardEvent, DatagramChannel};
pub use protocol::{InputState, OutputState, ProtocolError};
