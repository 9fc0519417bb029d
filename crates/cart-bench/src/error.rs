//! Error types for the bench engine

use thiserror::Error;

/// Errors from the hardware probe collaborator
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The bench hardware did not answer
    #[error("hardware did not respond: {0}")]
    NoResponse(String),

    /// The hardware answered but reported a fault
    #[error("hardware fault: {0}")]
    Fault(String),

    /// Underlying transport failure
    #[error("probe I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the registry and orchestrator
///
/// Hardware-absence conditions are expected outcomes, not faults; callers use
/// the variant to decide whether to retry, skip, or abort.
#[derive(Debug, Error)]
pub enum BenchError {
    /// Channel number outside 1..=8
    #[error("channel {0} is out of range (expected 1..=8)")]
    InvalidChannel(u8),

    /// Slot index outside the five-slot array
    #[error("slot {0} is out of range (expected 0..=4)")]
    InvalidSlot(usize),

    /// Switch link failure
    #[error(transparent)]
    Link(#[from] cart_link::LinkError),

    /// Channel switched but its bench hardware never answered
    #[error("no bench hardware detected on channel {0}")]
    HardwareNotDetected(u8),

    /// The operation needs a cartridge and no selected slot has one
    #[error("channel {0} has no cartridge in any selected slot")]
    CartRequiredButAbsent(u8),

    /// A cartridge is present where the operation requires an empty slot
    #[error("channel {channel} slot {slot} holds a cartridge but the check requires none")]
    CartPresentButNotRequired {
        /// Channel the cartridge was found on
        channel: u8,
        /// Slot holding the unexpected cartridge
        slot: usize,
    },

    /// Probe collaborator failure
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// Result journal I/O failure
    #[error("journal error: {0}")]
    Journal(std::io::Error),
}
