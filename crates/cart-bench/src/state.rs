//! Per-channel bench state
//!
//! One `ChannelState` per mux channel, created when the registry comes up and
//! alive until the process exits. The owning manager is the only writer;
//! everything else reads cloned snapshots.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::BenchError;

/// Number of cartridge slots per channel. Slot 0 is the cartless loopback
/// position; slots 1..=4 hold physical cartridges.
pub const SLOT_COUNT: usize = 5;

/// Number of physical cartridge slots (slot 0 excluded).
pub const PHYSICAL_SLOTS: usize = SLOT_COUNT - 1;

/// Cart identifier sentinel for slots the operator has not labelled yet.
pub const DEFAULT_CART_ID: &str = "NOT-SET";

/// A validated mux channel number (1..=8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ChannelId(u8);

impl ChannelId {
    /// Number of selectable channels.
    pub const COUNT: usize = 8;

    /// Construct a channel id, rejecting anything outside 1..=8.
    pub fn new(n: u8) -> Result<Self, BenchError> {
        if (1..=Self::COUNT as u8).contains(&n) {
            Ok(Self(n))
        } else {
            Err(BenchError::InvalidChannel(n))
        }
    }

    /// The raw channel number.
    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based index for array storage.
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    /// Iterate all channels in ascending order.
    pub fn all() -> impl Iterator<Item = ChannelId> {
        (1..=Self::COUNT as u8).map(ChannelId)
    }
}

impl TryFrom<u8> for ChannelId {
    type Error = BenchError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Self::new(n)
    }
}

impl From<ChannelId> for u8 {
    fn from(id: ChannelId) -> u8 {
        id.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection status of a channel's bench hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// Not reachable (or never probed)
    #[default]
    Disconnected,
    /// Probe connect in flight
    Connecting,
    /// Hardware answered and is usable
    Connected,
}

/// Result of a single test, or of a rollup of tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TestOutcome {
    /// Not executed (displayed "N/A")
    #[default]
    NotRun,
    Pass,
    Fail,
}

impl TestOutcome {
    /// Combine two outcomes: any `Fail` fails the rollup, `NotRun` is the
    /// identity, and `Pass` only survives when nothing failed.
    pub fn and(self, other: TestOutcome) -> TestOutcome {
        use TestOutcome::*;
        match (self, other) {
            (Fail, _) | (_, Fail) => Fail,
            (NotRun, o) | (o, NotRun) => o,
            (Pass, Pass) => Pass,
        }
    }

    /// Whether this outcome counts as a pass.
    pub fn is_pass(self) -> bool {
        matches!(self, TestOutcome::Pass)
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TestOutcome::NotRun => "N/A",
            TestOutcome::Pass => "PASS",
            TestOutcome::Fail => "FAIL",
        };
        f.write_str(s)
    }
}

/// State of one cartridge slot on one channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotState {
    /// Included in the next campaign
    pub selected: bool,
    /// A cartridge was detected in this slot
    pub cart_present: bool,
    /// Detected cartridge type, if any
    pub cart_type: Option<String>,
    /// Operator-entered cartridge identifier
    pub cart_id: String,
    /// Latest rollup outcome for this slot
    pub outcome: TestOutcome,
    /// Journal file this slot's records are written to
    pub log_path: Option<PathBuf>,
}

impl Default for SlotState {
    fn default() -> Self {
        Self {
            selected: false,
            cart_present: false,
            cart_type: None,
            cart_id: DEFAULT_CART_ID.to_string(),
            outcome: TestOutcome::NotRun,
            log_path: None,
        }
    }
}

impl SlotState {
    /// Clear detection-derived fields. The operator-entered `cart_id`
    /// survives unless it is still the untouched sentinel; `log_path` is
    /// assigned once per campaign and must outlive reconnects, so only
    /// [`hard_clear`](Self::hard_clear) drops it.
    pub fn soft_reset(&mut self) {
        self.cart_present = false;
        self.cart_type = None;
        self.outcome = TestOutcome::NotRun;
        if self.cart_id == DEFAULT_CART_ID {
            self.cart_id.clear();
        }
    }

    /// Reset everything, identifiers included.
    pub fn hard_clear(&mut self) {
        *self = Self::default();
    }
}

/// Full state of one mux channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelState {
    /// Which channel this is
    pub channel: ChannelId,
    /// Hardware connection status
    pub connection: ConnectionStatus,
    /// Identification string reported by the hardware probe
    pub hardware: Option<String>,
    /// The five cartridge slots (index 0 = loopback)
    pub slots: [SlotState; SLOT_COUNT],
    /// Included in the next campaign
    pub selected: bool,
    /// An operation is currently running on this channel
    pub in_progress: bool,
}

impl ChannelState {
    pub fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            connection: ConnectionStatus::Disconnected,
            hardware: None,
            slots: std::array::from_fn(|_| SlotState::default()),
            selected: false,
            in_progress: false,
        }
    }

    /// Soft-reset the channel: drop detection results but keep operator
    /// selections and non-sentinel cart identifiers. The `in_progress`
    /// marker belongs to the registry, which emits an event on every flip,
    /// so it is never touched here.
    pub fn soft_reset(&mut self) {
        self.connection = ConnectionStatus::Disconnected;
        self.hardware = None;
        for slot in &mut self.slots {
            slot.soft_reset();
        }
    }

    /// Reset the channel completely, selections and identifiers included.
    pub fn hard_clear(&mut self) {
        *self = Self::new(self.channel);
    }

    /// AND of outcomes over slots that are selected and cart-present (the
    /// loopback slot qualifies when selected). `NotRun` when no slot counts.
    pub fn overall_outcome(&self) -> TestOutcome {
        self.slots
            .iter()
            .enumerate()
            .filter(|(i, s)| s.selected && (*i == 0 || s.cart_present))
            .fold(TestOutcome::NotRun, |acc, (_, s)| acc.and(s.outcome))
    }

    /// Indices of the selected slots.
    pub fn selected_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.selected)
            .map(|(i, _)| i)
            .collect()
    }

    /// Whether any selected physical slot holds a cartridge.
    pub fn has_selected_cart(&self) -> bool {
        self.slots
            .iter()
            .skip(1)
            .any(|s| s.selected && s.cart_present)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_rejects_out_of_range() {
        assert!(ChannelId::new(0).is_err());
        assert!(ChannelId::new(9).is_err());
        assert_eq!(ChannelId::new(8).unwrap().get(), 8);
        assert_eq!(ChannelId::all().count(), 8);
    }

    #[test]
    fn slot_array_has_five_slots() {
        let state = ChannelState::new(ChannelId::new(1).unwrap());
        assert_eq!(state.slots.len(), SLOT_COUNT);
        assert_eq!(SLOT_COUNT, 5);
    }

    #[test]
    fn outcome_and_is_fail_dominant() {
        use TestOutcome::*;
        assert_eq!(Pass.and(Fail), Fail);
        assert_eq!(Fail.and(NotRun), Fail);
        assert_eq!(NotRun.and(Pass), Pass);
        assert_eq!(NotRun.and(NotRun), NotRun);
        assert_eq!(Pass.and(Pass), Pass);
    }

    #[test]
    fn soft_reset_keeps_operator_cart_id_and_log_path() {
        let mut slot = SlotState {
            cart_id: "CART-0042".to_string(),
            cart_present: true,
            outcome: TestOutcome::Pass,
            log_path: Some(PathBuf::from("campaign_ch1_slot1.jsonl")),
            ..Default::default()
        };
        slot.soft_reset();
        assert_eq!(slot.cart_id, "CART-0042");
        assert!(!slot.cart_present);
        assert_eq!(slot.outcome, TestOutcome::NotRun);
        // The journal path is fixed for the campaign's lifetime
        assert!(slot.log_path.is_some());
    }

    #[test]
    fn soft_reset_clears_sentinel_cart_id() {
        let mut slot = SlotState::default();
        assert_eq!(slot.cart_id, DEFAULT_CART_ID);
        slot.soft_reset();
        assert!(slot.cart_id.is_empty());
    }

    #[test]
    fn hard_clear_restores_sentinel_and_drops_log_path() {
        let mut slot = SlotState {
            cart_id: "CART-7".to_string(),
            log_path: Some(PathBuf::from("campaign_ch1_slot1.jsonl")),
            ..Default::default()
        };
        slot.hard_clear();
        assert_eq!(slot.cart_id, DEFAULT_CART_ID);
        assert!(slot.log_path.is_none());
    }

    #[test]
    fn overall_outcome_ignores_unselected_and_cartless() {
        let mut state = ChannelState::new(ChannelId::new(2).unwrap());
        assert_eq!(state.overall_outcome(), TestOutcome::NotRun);

        // Selected physical slot without a cart does not count
        state.slots[1].selected = true;
        state.slots[1].outcome = TestOutcome::Fail;
        assert_eq!(state.overall_outcome(), TestOutcome::NotRun);

        state.slots[1].cart_present = true;
        assert_eq!(state.overall_outcome(), TestOutcome::Fail);

        state.slots[1].outcome = TestOutcome::Pass;
        state.slots[2].selected = true;
        state.slots[2].cart_present = true;
        state.slots[2].outcome = TestOutcome::Pass;
        assert_eq!(state.overall_outcome(), TestOutcome::Pass);
    }

    #[test]
    fn loopback_slot_counts_without_a_cart() {
        let mut state = ChannelState::new(ChannelId::new(3).unwrap());
        state.slots[0].selected = true;
        state.slots[0].outcome = TestOutcome::Pass;
        assert_eq!(state.overall_outcome(), TestOutcome::Pass);
    }
}
