//! Bench command actor
//!
//! External collaborators (a UI, the CLI) drive the bench through a command
//! channel and observe it through the registry's event stream. All hardware
//! work happens in this actor; there is no second path to the mux.
//!
//! A campaign runs inline in the actor: the mux cannot serve anything else
//! while one is in flight, so queued commands simply wait. Stopping a
//! campaign goes through the cancellation token the caller kept, never
//! through a command.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::campaign::{run_campaign, CampaignOutcome, CampaignPlan};
use crate::error::BenchError;
use crate::journal::ResultJournal;
use crate::registry::ChannelRegistry;
use crate::state::{ChannelId, ChannelState};

/// Commands accepted by the bench actor
pub enum BenchCommand {
    /// Probe all eight channels and record which ones answer
    ScanAll,

    /// Mark which slots of a channel take part in the next campaign
    SetSelection {
        /// The channel
        channel: ChannelId,
        /// Selected slot indices
        slots: Vec<usize>,
    },

    /// Snapshot one channel's state
    QueryChannel {
        /// The channel
        channel: ChannelId,
        /// Where to send the snapshot
        response: oneshot::Sender<ChannelState>,
    },

    /// Run a performance campaign to completion or cancellation
    StartCampaign {
        /// What to run
        plan: CampaignPlan,
        /// Journal the results go to
        journal: Box<dyn ResultJournal>,
        /// Token the caller keeps; cancelling it stops the campaign
        cancel: CancellationToken,
        /// Where to send the final outcome
        outcome: oneshot::Sender<Result<CampaignOutcome, BenchError>>,
    },

    /// Deactivate everything and wipe all channel state
    ClearAll,

    /// Shut the actor down
    Shutdown,
}

impl std::fmt::Debug for BenchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BenchCommand::ScanAll => write!(f, "ScanAll"),
            BenchCommand::SetSelection { channel, slots } => f
                .debug_struct("SetSelection")
                .field("channel", channel)
                .field("slots", slots)
                .finish(),
            BenchCommand::QueryChannel { channel, .. } => f
                .debug_struct("QueryChannel")
                .field("channel", channel)
                .finish_non_exhaustive(),
            BenchCommand::StartCampaign { plan, .. } => f
                .debug_struct("StartCampaign")
                .field("plan", plan)
                .finish_non_exhaustive(),
            BenchCommand::ClearAll => write!(f, "ClearAll"),
            BenchCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Run the bench actor until `Shutdown` or the command channel closes.
///
/// Events flow out through the event sender the registry was built with.
pub async fn run_bench_actor(
    mut registry: ChannelRegistry,
    mut cmd_rx: mpsc::Receiver<BenchCommand>,
) {
    info!("bench actor started");

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            BenchCommand::ScanAll => {
                registry.scan_all().await;
            }

            BenchCommand::SetSelection { channel, slots } => {
                registry.set_selection(channel, &slots);
            }

            BenchCommand::QueryChannel { channel, response } => {
                let _ = response.send(registry.channel_state(channel));
            }

            BenchCommand::StartCampaign {
                plan,
                mut journal,
                cancel,
                outcome,
            } => {
                let result = run_campaign(&mut registry, &plan, journal.as_mut(), &cancel).await;
                if let Err(ref e) = result {
                    warn!("campaign failed: {}", e);
                }
                let _ = outcome.send(result);
            }

            BenchCommand::ClearAll => {
                registry.clear_all().await;
            }

            BenchCommand::Shutdown => {
                info!("bench actor shutting down");
                break;
            }
        }
    }

    registry.switch_off().await;
    info!("bench actor stopped");
}
