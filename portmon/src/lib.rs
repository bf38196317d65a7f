//! Point-to-point data monitor.
//!
//! portmon opens one channel (a serial port, a UDP socket, or a single-peer
//! TCP server), reports every chunk it receives, and sends operator commands
//! back over the same channel.
//!
//! - [`transport`]: the three channel kinds behind one contract
//! - [`session`]: the receive loop for one open transport
//! - [`controller`]: the start/stop/send state machine consumers drive
//! - [`event`]: what consumers are told
//! - [`display`]: line formatting and capture files for the binary

pub mod config;
pub mod controller;
pub mod display;
pub mod error;
pub mod event;
pub mod session;
pub mod tracing;
pub mod transport;

pub use config::{ControllerConfig, TransportConfig};
pub use controller::{Controller, ControllerState};
pub use error::{Error, Result, SendError, StartError, TransportError};
pub use event::{LifecycleEvent, MonitorEvent, Observer};
pub use transport::{Chunk, TransportMode};
