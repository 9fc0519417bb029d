//! Cartridge test-bench engine
//!
//! Channel arbitration over a single serial-attached multiplexer, the
//! per-channel activation state machine, performance-campaign orchestration,
//! and persisted results. Hardware access goes through the [`CartProbe`]
//! trait; `cart-sim` supplies a scriptable implementation for testing.

pub mod actor;
pub mod campaign;
pub mod error;
pub mod events;
pub mod journal;
pub mod manager;
pub mod probe;
pub mod registry;
pub mod state;

pub use actor::{run_bench_actor, BenchCommand};
pub use campaign::{
    run_campaign, CampaignOutcome, CampaignPlan, CampaignStatus, ChannelSelection, ProgressReport,
    ReattemptPolicy, StopPolicy,
};
pub use error::{BenchError, ProbeError};
pub use events::{BenchEvent, EventSender};
pub use journal::{FileJournal, MemoryJournal, ResultJournal, SlotRecord, SlotSummary};
pub use manager::{ChannelManager, Phase};
pub use probe::{CartDetect, CartProbe, HardwareInfo, PerfCheck};
pub use registry::{ChannelRegistry, RegistryConfig};
pub use state::{
    ChannelId, ChannelState, ConnectionStatus, SlotState, TestOutcome, DEFAULT_CART_ID,
    PHYSICAL_SLOTS, SLOT_COUNT,
};
