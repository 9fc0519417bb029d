//! Channel activation state machine
//!
//! One manager per channel. A manager only talks to its probe while the
//! registry has the mux routed to its channel; the registry's `&mut` access
//! keeps at most one manager mid-transition at a time, so the manager itself
//! carries no locking.

use tracing::{debug, info, warn};

use crate::error::BenchError;
use crate::events::{BenchEvent, EventSender};
use crate::probe::CartProbe;
use crate::state::{ChannelId, ChannelState, ConnectionStatus};

/// Activation phase of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Inactive,
    Activating,
    Active,
    Deactivating,
}

/// Owns one channel's state and its hardware probe
pub struct ChannelManager {
    state: ChannelState,
    phase: Phase,
    probe: Box<dyn CartProbe>,
    events: EventSender,
}

impl ChannelManager {
    pub fn new(channel: ChannelId, probe: Box<dyn CartProbe>, events: EventSender) -> Self {
        Self {
            state: ChannelState::new(channel),
            phase: Phase::Inactive,
            probe,
            events,
        }
    }

    /// Current activation phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the channel is fully activated.
    pub fn is_active(&self) -> bool {
        self.phase == Phase::Active
    }

    /// Read access to the channel state.
    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    /// Snapshot of the channel state for observers.
    pub fn snapshot(&self) -> ChannelState {
        self.state.clone()
    }

    /// Mutable access for registry-internal bookkeeping (selection,
    /// in-progress markers, recorded outcomes).
    pub(crate) fn state_mut(&mut self) -> &mut ChannelState {
        &mut self.state
    }

    pub(crate) fn probe_mut(&mut self) -> &mut dyn CartProbe {
        &mut *self.probe
    }

    /// Bring the channel up: connect the probe, then detect cartridges.
    ///
    /// Idempotent when already `Active`. Any failure reverts the channel to
    /// `Inactive`/`Disconnected` and returns the error; a partial activation
    /// never sticks.
    pub async fn activate(&mut self) -> Result<(), BenchError> {
        if self.phase == Phase::Active {
            debug!("channel {} already active", self.state.channel);
            return Ok(());
        }

        self.phase = Phase::Activating;
        self.state.soft_reset();
        self.state.connection = ConnectionStatus::Connecting;

        let info = match self.probe.connect().await {
            Ok(info) => info,
            Err(e) => {
                warn!("channel {} hardware connect failed: {}", self.state.channel, e);
                self.phase = Phase::Inactive;
                self.state.connection = ConnectionStatus::Disconnected;
                return Err(e.into());
            }
        };

        info!("channel {} hardware: {}", self.state.channel, info.model);
        self.state.hardware = Some(info.model.clone());
        self.state.connection = ConnectionStatus::Connected;

        let detects = match self.probe.detect_carts().await {
            Ok(d) => d,
            Err(e) => {
                warn!(
                    "channel {} cart detection failed: {}",
                    self.state.channel, e
                );
                self.probe.disconnect().await;
                self.phase = Phase::Inactive;
                self.state.soft_reset();
                return Err(e.into());
            }
        };

        for (i, detect) in detects.iter().enumerate() {
            let slot = i + 1;
            let was_present = self.state.slots[slot].cart_present;
            self.state.slots[slot].cart_present = detect.present;
            self.state.slots[slot].cart_type = detect.cart_type.clone();
            if was_present != detect.present {
                self.events.emit(BenchEvent::CartChanged {
                    channel: self.state.channel,
                    slot,
                    present: detect.present,
                });
            }
        }

        self.phase = Phase::Active;
        self.events.emit(BenchEvent::ChannelConnected {
            channel: self.state.channel,
            hardware: info.model,
        });
        Ok(())
    }

    /// Bring the channel down.
    ///
    /// Idempotent when already `Inactive`. With `preserve_discovered` the
    /// detection results and `Connected` status stay visible (scan keeps its
    /// findings on display); without it the channel soft-resets.
    pub async fn deactivate(&mut self, preserve_discovered: bool) {
        if self.phase == Phase::Inactive {
            debug!("channel {} already inactive", self.state.channel);
            return;
        }

        self.phase = Phase::Deactivating;
        self.probe.disconnect().await;

        if !preserve_discovered {
            self.state.soft_reset();
            self.events.emit(BenchEvent::ChannelDisconnected {
                channel: self.state.channel,
            });
        }
        self.phase = Phase::Inactive;
        debug!(
            "channel {} deactivated (preserve={})",
            self.state.channel, preserve_discovered
        );
    }
}

impl std::fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelManager")
            .field("channel", &self.state.channel)
            .field("phase", &self.phase)
            .field("connection", &self.state.connection)
            .finish()
    }
}
