//! UDP channel between the front end and a running simulator.
//!
//! Outbound traffic is call-triggered: [`DatagramChannel::set_input_state`]
//! overwrites a single pending slot and [`DatagramChannel::send_pending`]
//! transmits whatever the slot holds. Inbound datagrams are decoded on a Tokio
//! task and surfaced as [`BoardEvent`]s in arrival order.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ChannelConfig;
use crate::error::{Error, Result};

use super::protocol::{InputState, MAX_DATAGRAM_LEN, OutputState, ProtocolError};

/// Capacity of the event queue towards the front end.
/// When the consumer falls this far behind, newer events are dropped; the
/// latest state is still available through [`DatagramChannel::last_output`].
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notification delivered to the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardEvent {
    /// A datagram decoded into a complete output state.
    OutputStateReceived(OutputState),
}

/// State shared between the channel handle and its receive task.
#[derive(Default)]
struct Inbound {
    last_output: Mutex<Option<OutputState>>,
    protocol_errors: AtomicU64,
}

impl Inbound {
    /// Decode one datagram. Only a successful decode replaces the last state.
    fn accept(&self, payload: &[u8]) -> std::result::Result<OutputState, ProtocolError> {
        match OutputState::decode(payload) {
            Ok(state) => {
                *lock(&self.last_output) = Some(state);
                Ok(state)
            }
            Err(e) => {
                self.protocol_errors.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }
}

/// Bound UDP endpoint exchanging state with one simulator process.
pub struct DatagramChannel {
    /// Blocking-API handle on the same socket, so sends never wait for the
    /// reactor to report writability.
    sender: std::net::UdpSocket,
    local_addr: SocketAddr,
    peer: SocketAddr,
    pending: Mutex<Option<InputState>>,
    inbound: Arc<Inbound>,
    recv_task: Option<JoinHandle<()>>,
}

impl DatagramChannel {
    /// Bind the local endpoint and start listening.
    ///
    /// Must be called from within a Tokio runtime. The returned receiver
    /// yields one event per valid datagram.
    pub fn open(config: &ChannelConfig) -> Result<(Self, mpsc::Receiver<BoardEvent>)> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Runtime(e.to_string()))?;

        let std_socket = std::net::UdpSocket::bind(config.bind).map_err(|source| Error::Bind {
            addr: config.bind,
            source,
        })?;
        std_socket.set_nonblocking(true)?;
        let local_addr = std_socket.local_addr()?;
        let sender = std_socket.try_clone()?;

        let socket = {
            let _guard = handle.enter();
            Arc::new(UdpSocket::from_std(std_socket)?)
        };

        let inbound = Arc::new(Inbound::default());
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let recv_task = handle.spawn(recv_loop(socket, inbound.clone(), tx));

        tracing::info!("Datagram channel listening on {} (simulator at {})", local_addr, config.peer);

        Ok((
            Self {
                sender,
                local_addr,
                peer: config.peer,
                pending: Mutex::new(None),
                inbound,
                recv_task: Some(recv_task),
            },
            rx,
        ))
    }

    /// Address the channel is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address outbound datagrams go to.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Replace the pending input state. Earlier unsent values are discarded.
    pub fn set_input_state(&self, state: InputState) {
        *lock(&self.pending) = Some(state);
    }

    /// Send the pending input state, if any.
    ///
    /// Returns `true` when a datagram was transmitted and `false` when
    /// nothing was pending. The slot is empty afterwards, so a second call
    /// without a new `set_input_state` sends nothing. If the send fails the
    /// value stays pending for the next call.
    pub fn send_pending(&self) -> Result<bool> {
        let mut pending = lock(&self.pending);
        let Some(state) = *pending else {
            return Ok(false);
        };

        let payload = state.encode();
        self.sender.send_to(payload.as_bytes(), self.peer)?;
        *pending = None;
        tracing::debug!("Sent input state {:?} to {}", payload, self.peer);
        Ok(true)
    }

    /// Most recent successfully decoded output state.
    pub fn last_output(&self) -> Option<OutputState> {
        *lock(&self.inbound.last_output)
    }

    /// Number of inbound datagrams rejected as malformed.
    pub fn protocol_errors(&self) -> u64 {
        self.inbound.protocol_errors.load(Ordering::Relaxed)
    }

    /// Stop listening and release the socket without waiting for traffic.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(task) = self.recv_task.take() {
            task.abort();
            tracing::debug!("Datagram channel on {} closed", self.local_addr);
        }
    }
}

impl Drop for DatagramChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn recv_loop(socket: Arc<UdpSocket>, inbound: Arc<Inbound>, tx: mpsc::Sender<BoardEvent>) {
    let mut buf = [0u8; MAX_DATAGRAM_LEN];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            // ICMP port-unreachable from an earlier send surfaces here on some
            // platforms; the socket itself is still fine.
            Err(e) if matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused) => {
                tracing::debug!("Ignoring transient receive error: {}", e);
                continue;
            }
            Err(e) => {
                tracing::warn!("Datagram receive failed, channel stops listening: {}", e);
                break;
            }
        };

        match inbound.accept(&buf[..len]) {
            Ok(state) => {
                tracing::trace!("Received {:?} from {}", state, from);
                if let Err(mpsc::error::TrySendError::Full(_)) =
                    tx.try_send(BoardEvent::OutputStateReceived(state))
                {
                    tracing::debug!("Event queue full, dropping display update");
                }
            }
            Err(e) => {
                tracing::warn!("Discarding datagram from {}: {}", from, e);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
