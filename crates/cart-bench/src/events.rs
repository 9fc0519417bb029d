//! Unified event stream for the bench
//!
//! Everything observable (link lifecycle, channel activity, campaign
//! progress, errors) is emitted through one unbounded channel. Emission never
//! blocks: a slow or absent subscriber must not stall a hardware operation.

use tokio::sync::mpsc;

use crate::campaign::{CampaignStatus, ProgressReport};
use crate::state::{ChannelId, TestOutcome};

/// Unified event enum for all bench activity
#[derive(Debug, Clone)]
pub enum BenchEvent {
    // -------------------------------------------------------------------------
    // Link lifecycle events
    // -------------------------------------------------------------------------
    /// The switch link bound a serial port
    LinkConnected {
        /// Port the multiplexer was found on
        port: String,
    },

    /// The switch link lost or released its port
    LinkDisconnected,

    // -------------------------------------------------------------------------
    // Channel lifecycle events
    // -------------------------------------------------------------------------
    /// A channel's bench hardware came up
    ChannelConnected {
        /// The channel
        channel: ChannelId,
        /// Hardware identification string
        hardware: String,
    },

    /// A channel's bench hardware went away or was released
    ChannelDisconnected {
        /// The channel
        channel: ChannelId,
    },

    /// Cartridge detection changed on a channel
    CartChanged {
        /// The channel
        channel: ChannelId,
        /// Physical slot (1..=4)
        slot: usize,
        /// Whether a cartridge is now present
        present: bool,
    },

    /// A channel's in-progress marker flipped
    InProgressChanged {
        /// The channel
        channel: ChannelId,
        /// New marker value
        in_progress: bool,
    },

    /// A channel's rollup outcome changed
    ChannelOutcomeChanged {
        /// The channel
        channel: ChannelId,
        /// New rollup outcome
        outcome: TestOutcome,
    },

    // -------------------------------------------------------------------------
    // Operation events
    // -------------------------------------------------------------------------
    /// A full channel scan finished
    ScanFinished {
        /// Channels whose hardware answered
        connected: Vec<ChannelId>,
    },

    /// Campaign progress after a channel-slot unit completed
    CampaignProgress(ProgressReport),

    /// A campaign ran to completion or was cancelled
    CampaignFinished {
        /// Terminal status
        status: CampaignStatus,
    },

    /// An error occurred somewhere in the engine
    Error {
        /// Source of the error (e.g., "Link", "Registry", "Campaign")
        source: String,
        /// Error message
        message: String,
    },
}

impl BenchEvent {
    /// Check if this is a link lifecycle event
    pub fn is_link_lifecycle(&self) -> bool {
        matches!(
            self,
            BenchEvent::LinkConnected { .. } | BenchEvent::LinkDisconnected
        )
    }

    /// Check if this is a channel lifecycle event
    pub fn is_channel_lifecycle(&self) -> bool {
        matches!(
            self,
            BenchEvent::ChannelConnected { .. } | BenchEvent::ChannelDisconnected { .. }
        )
    }

    /// Check if this is a campaign event
    pub fn is_campaign(&self) -> bool {
        matches!(
            self,
            BenchEvent::CampaignProgress(_) | BenchEvent::CampaignFinished { .. }
        )
    }

    /// Get the channel if this event is associated with a specific one
    pub fn channel(&self) -> Option<ChannelId> {
        match self {
            BenchEvent::ChannelConnected { channel, .. }
            | BenchEvent::ChannelDisconnected { channel }
            | BenchEvent::CartChanged { channel, .. }
            | BenchEvent::InProgressChanged { channel, .. }
            | BenchEvent::ChannelOutcomeChanged { channel, .. } => Some(*channel),
            BenchEvent::CampaignProgress(report) => Some(report.channel),
            _ => None,
        }
    }
}

/// Non-blocking event emitter
///
/// Wraps an unbounded sender; a dropped receiver turns emission into a no-op
/// so headless use (tests, CLI without a monitor) costs nothing.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<BenchEvent>,
}

impl EventSender {
    /// Create a sender/receiver pair.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BenchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit an event. Never blocks, never fails.
    pub fn emit(&self, event: BenchEvent) {
        let _ = self.tx.send(event);
    }

    /// Emit an error event.
    pub fn emit_error(&self, source: &str, message: impl ToString) {
        self.emit(BenchEvent::Error {
            source: source.to_string(),
            message: message.to_string(),
        });
    }
}
