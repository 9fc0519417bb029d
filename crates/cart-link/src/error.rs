//! Error types for the switch link

use thiserror::Error;

/// Errors that can occur on the switch link
#[derive(Debug, Error)]
pub enum LinkError {
    /// Requested channel outside the selectable range
    #[error("channel {0} is out of range (expected 0..=8)")]
    InvalidChannel(u8),

    /// No serial transport is bound to the link
    #[error("no transport bound to the switch link")]
    NoTransport,

    /// The switch did not reply within the exchange deadline
    #[error("timed out waiting for switch reply")]
    ReplyTimeout,

    /// The switch replied, but the echo or mode marker did not validate
    #[error("switch rejected command 0x{sent:02X} (reply {reply:02X?})")]
    SwitchRejected {
        /// Command byte that was sent
        sent: u8,
        /// The raw 4-byte reply
        reply: [u8; 4],
    },

    /// Failed to enumerate serial ports
    #[error("failed to enumerate ports: {0}")]
    EnumerationFailed(String),

    /// No port answered the discovery probe
    #[error("no multiplexer found on any serial port")]
    NoDeviceFound,

    /// I/O error on the transport (the link tears itself down)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port error
    #[error("serial port error: {0}")]
    SerialPort(#[from] serialport::Error),
}
