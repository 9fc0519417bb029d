//! Performance campaign orchestration
//!
//! A campaign walks the selected channels one at a time (the mux allows
//! nothing else), reestablishes each channel, runs one performance check per
//! selected slot, and persists every record the moment it exists. A channel
//! that cannot be reestablished gets failure records and the campaign moves
//! on; only cancellation or the stop policy ends the run.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::BenchError;
use crate::events::BenchEvent;
use crate::journal::{now_secs, ResultJournal, SlotRecord, SlotSummary};
use crate::probe::PerfCheck;
use crate::registry::ChannelRegistry;
use crate::state::{ChannelId, TestOutcome, SLOT_COUNT};

/// Which slots of a channel take part in a campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSelection {
    /// The channel
    pub channel: ChannelId,
    /// Selected slot indices (0 = loopback)
    pub slots: Vec<usize>,
}

/// When a campaign stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopPolicy {
    /// Run exactly this many iterations
    Iterations(u32),
    /// Run until at least this many seconds have elapsed. The bound is a
    /// floor: the iteration in flight when it passes still completes.
    DurationSecs(u64),
}

/// What to do with a channel that failed reestablishment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReattemptPolicy {
    /// Try the channel again on every subsequent iteration
    #[default]
    EveryIteration,
    /// Skip the channel for the rest of the campaign after its first failure
    SkipAfterFailure,
}

/// Everything a campaign needs to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignPlan {
    /// Channels and slots to test, in execution order
    pub selection: Vec<ChannelSelection>,
    /// Stop condition
    pub stop: StopPolicy,
    /// Run cart checks (erase/write/read) rather than loopback-only
    pub with_cart: bool,
    /// Reestablish-failure handling
    #[serde(default)]
    pub reattempt: ReattemptPolicy,
}

impl CampaignPlan {
    /// Channel-slot units per iteration.
    pub fn units_per_iteration(&self) -> u64 {
        self.selection.iter().map(|s| s.slots.len() as u64).sum()
    }

    /// Total units over the whole campaign, when knowable up front.
    pub fn total_operations(&self) -> Option<u64> {
        match self.stop {
            StopPolicy::Iterations(n) => Some(n as u64 * self.units_per_iteration()),
            StopPolicy::DurationSecs(_) => None,
        }
    }

    /// Reject slot indices outside the five-slot array before anything runs.
    pub fn validate(&self) -> Result<(), BenchError> {
        for sel in &self.selection {
            if let Some(&slot) = sel.slots.iter().find(|&&s| s >= SLOT_COUNT) {
                return Err(BenchError::InvalidSlot(slot));
            }
        }
        Ok(())
    }
}

/// Progress snapshot emitted after every channel-slot unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReport {
    /// Channel the unit ran on
    pub channel: ChannelId,
    /// Units completed so far
    pub completed_operations: u64,
    /// Total units, `None` in duration mode
    pub total_operations: Option<u64>,
    /// 1-based iteration in progress
    pub current_iteration: u32,
    /// Seconds since the campaign started
    pub elapsed_secs: u64,
    /// Outcome of the unit just finished
    pub last_result: TestOutcome,
}

/// How a campaign ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignStatus {
    /// The stop policy was satisfied
    Completed,
    /// The cancellation token fired; gathered results were kept
    Cancelled,
}

/// Full result of a campaign run
#[derive(Debug)]
pub struct CampaignOutcome {
    /// Terminal status
    pub status: CampaignStatus,
    /// Iterations that ran to completion
    pub iterations_completed: u32,
    /// Every record gathered, in execution order
    pub records: Vec<SlotRecord>,
    /// Final per-channel-slot accounting
    pub summaries: Vec<SlotSummary>,
    /// Wall time spent
    pub elapsed: Duration,
}

/// Run a campaign to completion or cancellation.
///
/// Cancellation is sampled at the top of each iteration, at the top of each
/// channel unit, and between a channel's reestablishment and its slot
/// checks; an in-flight hardware call is never interrupted. Whatever was
/// gathered before cancellation is flushed and returned.
pub async fn run_campaign(
    registry: &mut ChannelRegistry,
    plan: &CampaignPlan,
    journal: &mut dyn ResultJournal,
    cancel: &CancellationToken,
) -> Result<CampaignOutcome, BenchError> {
    plan.validate()?;

    let started = Instant::now();
    let total_operations = plan.total_operations();
    let off_settle = Duration::from_millis(registry.config().off_settle_ms);

    info!(
        "campaign starting: {} channel(s), {:?}, with_cart={}",
        plan.selection.len(),
        plan.stop,
        plan.with_cart
    );

    // Journal paths are fixed now and survive unchanged to the end
    for sel in &plan.selection {
        for &slot in &sel.slots {
            if let Some(path) = journal
                .open_unit(sel.channel, slot)
                .map_err(BenchError::Journal)?
            {
                registry.set_slot_log_path(sel.channel, slot, path);
            }
        }
    }

    let mut records: Vec<SlotRecord> = Vec::new();
    let mut iterations_completed: u32 = 0;
    let mut completed_operations: u64 = 0;
    let mut skipped: HashSet<ChannelId> = HashSet::new();
    let mut status = CampaignStatus::Completed;

    'iterations: loop {
        match plan.stop {
            StopPolicy::Iterations(n) => {
                if iterations_completed >= n {
                    break;
                }
            }
            StopPolicy::DurationSecs(secs) => {
                if started.elapsed() >= Duration::from_secs(secs) {
                    break;
                }
            }
        }
        if cancel.is_cancelled() {
            status = CampaignStatus::Cancelled;
            break;
        }

        let iteration = iterations_completed + 1;
        debug!("campaign iteration {} starting", iteration);

        for sel in &plan.selection {
            if cancel.is_cancelled() {
                status = CampaignStatus::Cancelled;
                break 'iterations;
            }
            let ch = sel.channel;
            if skipped.contains(&ch) {
                debug!("channel {} skipped after earlier failure", ch);
                continue;
            }

            registry.set_in_progress(ch, true);

            if let Err(e) = registry.reestablish(ch, plan.with_cart).await {
                warn!(
                    "channel {} unavailable in iteration {}: {}",
                    ch, iteration, e
                );
                registry.events().emit_error("Campaign", &e);
                if plan.reattempt == ReattemptPolicy::SkipAfterFailure {
                    skipped.insert(ch);
                }

                // The channel still gets a record per slot so the accounting
                // shows the failed iteration, not a gap
                for &slot in &sel.slots {
                    let record = SlotRecord {
                        iteration,
                        channel: ch,
                        slot,
                        check: PerfCheck::unreachable(),
                        passed: false,
                        timestamp_secs: now_secs(),
                    };
                    journal.append(&record).map_err(BenchError::Journal)?;
                    registry.record_slot_outcome(ch, slot, TestOutcome::Fail);
                    records.push(record);
                    completed_operations += 1;
                    emit_progress(
                        registry,
                        ch,
                        completed_operations,
                        total_operations,
                        iteration,
                        started,
                        TestOutcome::Fail,
                    );
                }

                registry.set_in_progress(ch, false);
                registry.switch_off().await;
                tokio::time::sleep(off_settle).await;
                continue;
            }

            if cancel.is_cancelled() {
                registry.set_in_progress(ch, false);
                registry.release(ch, true).await;
                status = CampaignStatus::Cancelled;
                break 'iterations;
            }

            for &slot in &sel.slots {
                let (check, passed) = match registry.run_check(ch, slot, plan.with_cart).await {
                    Ok(check) => {
                        let passed = check.passed(plan.with_cart);
                        (check, passed)
                    }
                    Err(e) => {
                        warn!(
                            "check failed on channel {} slot {} iteration {}: {}",
                            ch, slot, iteration, e
                        );
                        registry.events().emit_error("Campaign", &e);
                        registry.record_slot_outcome(ch, slot, TestOutcome::Fail);
                        (PerfCheck::unreachable(), false)
                    }
                };

                let outcome = if passed {
                    TestOutcome::Pass
                } else {
                    TestOutcome::Fail
                };
                let record = SlotRecord {
                    iteration,
                    channel: ch,
                    slot,
                    check,
                    passed,
                    timestamp_secs: now_secs(),
                };
                journal.append(&record).map_err(BenchError::Journal)?;
                records.push(record);
                completed_operations += 1;
                emit_progress(
                    registry,
                    ch,
                    completed_operations,
                    total_operations,
                    iteration,
                    started,
                    outcome,
                );
            }

            registry.set_in_progress(ch, false);
            registry.release(ch, true).await;
            registry.switch_off().await;
            tokio::time::sleep(off_settle).await;
        }

        iterations_completed = iteration;
    }

    journal.flush().map_err(BenchError::Journal)?;

    let elapsed = started.elapsed();
    let summaries = build_summaries(&records, elapsed);
    journal
        .write_summary(&summaries)
        .map_err(BenchError::Journal)?;

    registry.switch_off().await;
    registry.events().emit(BenchEvent::CampaignFinished { status });
    info!(
        "campaign {:?} after {} iteration(s), {} record(s), {:.1}s",
        status,
        iterations_completed,
        records.len(),
        elapsed.as_secs_f64()
    );

    Ok(CampaignOutcome {
        status,
        iterations_completed,
        records,
        summaries,
        elapsed,
    })
}

fn emit_progress(
    registry: &ChannelRegistry,
    channel: ChannelId,
    completed_operations: u64,
    total_operations: Option<u64>,
    current_iteration: u32,
    started: Instant,
    last_result: TestOutcome,
) {
    registry
        .events()
        .emit(BenchEvent::CampaignProgress(ProgressReport {
            channel,
            completed_operations,
            total_operations,
            current_iteration,
            elapsed_secs: started.elapsed().as_secs(),
            last_result,
        }));
}

/// One summary per channel-slot that produced at least one record.
fn build_summaries(records: &[SlotRecord], elapsed: Duration) -> Vec<SlotSummary> {
    let finished_at = now_secs();
    let mut order: Vec<(ChannelId, usize)> = Vec::new();
    for r in records {
        if !order.contains(&(r.channel, r.slot)) {
            order.push((r.channel, r.slot));
        }
    }

    order
        .into_iter()
        .map(|(channel, slot)| {
            let unit: Vec<_> = records
                .iter()
                .filter(|r| r.channel == channel && r.slot == slot)
                .collect();
            let outcome = unit
                .iter()
                .fold(TestOutcome::NotRun, |acc, r| acc.and(r.check.combined()));
            SlotSummary {
                channel,
                slot,
                iterations: unit.len() as u32,
                duration_secs: elapsed.as_secs(),
                outcome,
                finished_at_secs: finished_at,
            }
        })
        .collect()
}
