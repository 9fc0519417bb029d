//! Channel registry: arbitration of the single mux
//!
//! The registry owns the switch link and all eight channel managers. Every
//! path that touches the mux goes through here, and the `&mut self` receivers
//! are what enforce the one-channel-at-a-time rule: there is no second route
//! to the hardware.

use std::time::Duration;

use cart_link::MuxLink;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::BenchError;
use crate::events::{BenchEvent, EventSender};
use crate::manager::ChannelManager;
use crate::probe::{CartProbe, PerfCheck};
use crate::state::{ChannelId, ChannelState, TestOutcome, SLOT_COUNT};

/// Registry timing configuration (milliseconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Wait after a successful switch before probing the channel
    pub stabilize_ms: u64,
    /// Wait after switching everything off
    pub off_settle_ms: u64,
    /// Wait between channels during a full scan
    pub scan_settle_ms: u64,
    /// Wait after power-cycling a channel before retrying activation
    pub retry_delay_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            stabilize_ms: 2000,
            off_settle_ms: 500,
            scan_settle_ms: 700,
            retry_delay_ms: 1000,
        }
    }
}

/// Owns the mux link and all eight channel managers
pub struct ChannelRegistry {
    link: MuxLink,
    managers: [ChannelManager; ChannelId::COUNT],
    config: RegistryConfig,
    events: EventSender,
}

impl ChannelRegistry {
    /// Build the registry, creating one manager per channel with a probe from
    /// the factory.
    pub fn new(
        link: MuxLink,
        config: RegistryConfig,
        events: EventSender,
        mut make_probe: impl FnMut(ChannelId) -> Box<dyn CartProbe>,
    ) -> Self {
        let managers = std::array::from_fn(|i| {
            let channel = ChannelId::new((i + 1) as u8).expect("index in range");
            ChannelManager::new(channel, make_probe(channel), events.clone())
        });
        Self {
            link,
            managers,
            config,
            events,
        }
    }

    /// The registry's event sender, for wiring further emitters.
    pub fn events(&self) -> &EventSender {
        &self.events
    }

    /// The timing configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The mux link, for discovery and rebinding.
    pub fn link_mut(&mut self) -> &mut MuxLink {
        &mut self.link
    }

    /// Snapshot of one channel's state.
    pub fn channel_state(&self, ch: ChannelId) -> ChannelState {
        self.managers[ch.index()].snapshot()
    }

    /// The channel that is currently active, if any.
    pub fn active_channel(&self) -> Option<ChannelId> {
        self.managers
            .iter()
            .find(|m| m.is_active())
            .map(|m| m.state().channel)
    }

    /// Mark which slots of a channel take part in the next campaign.
    pub fn set_selection(&mut self, ch: ChannelId, slots: &[usize]) {
        let state = self.managers[ch.index()].state_mut();
        state.selected = !slots.is_empty();
        for (i, slot) in state.slots.iter_mut().enumerate() {
            slot.selected = slots.contains(&i);
        }
    }

    /// Flip a channel's in-progress marker, emitting the change.
    pub fn set_in_progress(&mut self, ch: ChannelId, in_progress: bool) {
        let state = self.managers[ch.index()].state_mut();
        if state.in_progress != in_progress {
            state.in_progress = in_progress;
            self.events.emit(BenchEvent::InProgressChanged {
                channel: ch,
                in_progress,
            });
        }
    }

    /// Switch the mux to a channel and activate its hardware.
    ///
    /// Any other active manager is deactivated first (its discovered data is
    /// preserved), so at most one channel is active system-wide. Returns
    /// false on any failure, leaving the target channel untouched.
    pub async fn switch_and_activate(&mut self, ch: ChannelId) -> bool {
        if let Some(active) = self.active_channel() {
            if active != ch {
                debug!("deactivating channel {} before switching to {}", active, ch);
                self.managers[active.index()].deactivate(true).await;
            }
        }

        if let Err(e) = self.link.select_channel(ch.get()).await {
            warn!("switch to channel {} failed: {}", ch, e);
            self.events.emit_error("Link", e);
            if !self.link.is_connected() {
                self.events.emit(BenchEvent::LinkDisconnected);
            }
            return false;
        }

        tokio::time::sleep(Duration::from_millis(self.config.stabilize_ms)).await;

        match self.managers[ch.index()].activate().await {
            Ok(()) => true,
            Err(e) => {
                debug!("channel {} activation failed: {}", ch, e);
                false
            }
        }
    }

    /// Power-cycle a channel and retry activation once.
    ///
    /// Switch off, settle, switch back, wait, activate. Used by both the
    /// reestablish path and callers that want a single recovery attempt.
    async fn recycle_and_retry(&mut self, ch: ChannelId) -> bool {
        debug!("recycling channel {}", ch);
        self.switch_off().await;
        tokio::time::sleep(Duration::from_millis(self.config.off_settle_ms)).await;

        if let Err(e) = self.link.select_channel(ch.get()).await {
            warn!("switch to channel {} failed on retry: {}", ch, e);
            self.events.emit_error("Link", e);
            return false;
        }

        tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
        self.managers[ch.index()].activate().await.is_ok()
    }

    /// Probe every channel in order, recording which ones answer.
    ///
    /// A channel that fails to come up is logged and skipped; the scan always
    /// visits all eight. Discovered hardware and cartridge data stay visible
    /// after the channel is released.
    pub async fn scan_all(&mut self) {
        info!("scanning all channels");
        self.switch_off().await;
        tokio::time::sleep(Duration::from_millis(self.config.off_settle_ms)).await;

        let mut connected = Vec::new();
        for ch in ChannelId::all() {
            self.set_in_progress(ch, true);

            if self.switch_and_activate(ch).await {
                connected.push(ch);
                self.managers[ch.index()].deactivate(true).await;
            } else {
                debug!("channel {} did not respond during scan", ch);
            }

            self.set_in_progress(ch, false);
            self.switch_off().await;
            tokio::time::sleep(Duration::from_millis(self.config.scan_settle_ms)).await;
        }

        info!("scan finished: {} channel(s) responded", connected.len());
        self.events.emit(BenchEvent::ScanFinished { connected });
    }

    /// Bring a channel up for use, retrying once through a power cycle.
    ///
    /// With `require_cart`, additionally verify that at least one selected
    /// physical slot holds a cartridge; a missing cartridge is reported
    /// without tearing the fresh connection down.
    pub async fn reestablish(&mut self, ch: ChannelId, require_cart: bool) -> Result<(), BenchError> {
        let up = self.switch_and_activate(ch).await || self.recycle_and_retry(ch).await;
        if !up {
            return Err(BenchError::HardwareNotDetected(ch.get()));
        }

        if require_cart && !self.managers[ch.index()].state().has_selected_cart() {
            return Err(BenchError::CartRequiredButAbsent(ch.get()));
        }
        Ok(())
    }

    /// Run one performance check on a slot of the active channel, recording
    /// the outcome in the slot state.
    pub async fn run_check(
        &mut self,
        ch: ChannelId,
        slot: usize,
        with_cart: bool,
    ) -> Result<PerfCheck, BenchError> {
        if slot >= SLOT_COUNT {
            return Err(BenchError::InvalidSlot(slot));
        }
        let manager = &mut self.managers[ch.index()];
        if !manager.is_active() {
            return Err(BenchError::HardwareNotDetected(ch.get()));
        }
        if !with_cart && slot != 0 && manager.state().slots[slot].cart_present {
            return Err(BenchError::CartPresentButNotRequired {
                channel: ch.get(),
                slot,
            });
        }

        let cart_type = manager.state().slots[slot].cart_type.clone();
        let check = manager
            .probe_mut()
            .run_check(slot, cart_type.as_deref(), with_cart)
            .await?;

        let outcome = if check.passed(with_cart) {
            TestOutcome::Pass
        } else {
            TestOutcome::Fail
        };
        manager.state_mut().slots[slot].outcome = outcome;

        let rollup = manager.state().overall_outcome();
        self.events.emit(BenchEvent::ChannelOutcomeChanged {
            channel: ch,
            outcome: rollup,
        });
        Ok(check)
    }

    /// Record a slot outcome without running hardware (reestablish failures).
    pub fn record_slot_outcome(&mut self, ch: ChannelId, slot: usize, outcome: TestOutcome) {
        if slot >= SLOT_COUNT {
            warn!("ignoring outcome for out-of-range slot {}", slot);
            return;
        }
        self.managers[ch.index()].state_mut().slots[slot].outcome = outcome;
        let rollup = self.managers[ch.index()].state().overall_outcome();
        self.events.emit(BenchEvent::ChannelOutcomeChanged {
            channel: ch,
            outcome: rollup,
        });
    }

    /// Note where a slot's campaign records are being written.
    pub fn set_slot_log_path(&mut self, ch: ChannelId, slot: usize, path: std::path::PathBuf) {
        if slot >= SLOT_COUNT {
            warn!("ignoring log path for out-of-range slot {}", slot);
            return;
        }
        self.managers[ch.index()].state_mut().slots[slot].log_path = Some(path);
    }

    /// Release the active channel, keeping or dropping its discovered data.
    pub async fn release(&mut self, ch: ChannelId, preserve_discovered: bool) {
        self.managers[ch.index()].deactivate(preserve_discovered).await;
    }

    /// Deactivate everything, wipe all channel state, and switch off.
    pub async fn clear_all(&mut self) {
        info!("clearing all channel state");
        for i in 0..ChannelId::COUNT {
            self.managers[i].deactivate(false).await;
            self.managers[i].state_mut().hard_clear();
        }
        self.switch_off().await;
    }

    /// Switch all channels off. Failures are logged, not propagated; the
    /// bench is in an unknown-but-harmless routing state afterwards either
    /// way.
    pub async fn switch_off(&mut self) {
        if let Err(e) = self.link.select_channel(0).await {
            warn!("switch off failed: {}", e);
        }
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("link", &self.link)
            .field("active", &self.active_channel())
            .field("config", &self.config)
            .finish()
    }
}
