//! Switch-link access and device discovery for the test-bench multiplexer
//!
//! One serial port carries both the switch protocol and the traffic of
//! whichever channel is currently selected. This crate owns that port:
//! [`MuxLink`] serializes switch exchanges on it, [`discover`] finds which
//! of the machine's serial ports the mux is on, and [`PortScanner`] does the
//! raw enumeration.

pub mod discover;
pub mod error;
pub mod link;
pub mod scanner;

pub use discover::discover;
pub use error::LinkError;
pub use link::{
    validate_reply, LinkConfig, LinkStream, MuxLink, CHANNEL_BASE, MAX_CHANNEL, MODE_AUTO,
    MODE_MANUAL, REPLY_LEN,
};
pub use scanner::{PortScanner, ScannerConfig, SerialPortInfo};
