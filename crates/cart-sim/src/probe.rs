//! Scriptable cartridge probe
//!
//! Stands in for a channel's bench hardware. Tests script the failure
//! behavior per attempt and per slot, and read the call counters to assert
//! how often the engine actually touched the hardware.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cart_bench::{CartDetect, CartProbe, HardwareInfo, PerfCheck, ProbeError, TestOutcome};
use cart_bench::PHYSICAL_SLOTS;
use tracing::debug;

/// Scripted behavior for a simulated channel
#[derive(Debug, Clone)]
pub struct SimProbeConfig {
    /// Whether the channel's hardware answers at all
    pub hardware_present: bool,
    /// Model string reported on connect
    pub model: String,
    /// Cartridge type per physical slot, `None` for an empty slot
    pub carts: [Option<String>; PHYSICAL_SLOTS],
    /// 1-based connect attempts that fail (e.g. `[2]` fails only the second)
    pub failing_connect_attempts: Vec<u32>,
    /// Slots whose performance checks always fail
    pub failing_slots: Vec<usize>,
    /// Wall time each check takes
    pub check_delay_ms: u64,
}

impl Default for SimProbeConfig {
    fn default() -> Self {
        Self {
            hardware_present: true,
            model: "SIM-BENCH".to_string(),
            carts: Default::default(),
            failing_connect_attempts: Vec::new(),
            failing_slots: Vec::new(),
            check_delay_ms: 0,
        }
    }
}

impl SimProbeConfig {
    /// Hardware that answers, with a cartridge of `cart_type` in every slot.
    pub fn fully_loaded(cart_type: &str) -> Self {
        Self {
            carts: std::array::from_fn(|_| Some(cart_type.to_string())),
            ..Default::default()
        }
    }

    /// Hardware that never answers.
    pub fn absent() -> Self {
        Self {
            hardware_present: false,
            ..Default::default()
        }
    }
}

/// Shared call counters, cloned out of a probe before boxing it
#[derive(Debug, Clone, Default)]
pub struct SimProbeCounters {
    /// Successful connects
    pub connects: Arc<AtomicU32>,
    /// Disconnects
    pub disconnects: Arc<AtomicU32>,
    /// Performance checks run
    pub checks: Arc<AtomicU32>,
}

impl SimProbeCounters {
    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> u32 {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn check_count(&self) -> u32 {
        self.checks.load(Ordering::SeqCst)
    }
}

/// Simulated channel hardware probe
#[derive(Debug)]
pub struct SimProbe {
    config: SimProbeConfig,
    counters: SimProbeCounters,
    connect_attempts: u32,
    connected: bool,
}

impl SimProbe {
    pub fn new(config: SimProbeConfig) -> Self {
        Self {
            config,
            counters: SimProbeCounters::default(),
            connect_attempts: 0,
            connected: false,
        }
    }

    /// Handle to the call counters; clone before boxing the probe.
    pub fn counters(&self) -> SimProbeCounters {
        self.counters.clone()
    }
}

#[async_trait]
impl CartProbe for SimProbe {
    async fn connect(&mut self) -> Result<HardwareInfo, ProbeError> {
        self.connect_attempts += 1;

        if !self.config.hardware_present {
            return Err(ProbeError::NoResponse("no hardware on channel".to_string()));
        }
        if self
            .config
            .failing_connect_attempts
            .contains(&self.connect_attempts)
        {
            debug!(
                "sim probe failing scripted connect attempt {}",
                self.connect_attempts
            );
            return Err(ProbeError::NoResponse(format!(
                "scripted failure on attempt {}",
                self.connect_attempts
            )));
        }

        self.connected = true;
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(HardwareInfo {
            model: self.config.model.clone(),
            firmware: Some("1.2.0".to_string()),
        })
    }

    async fn detect_carts(&mut self) -> Result<[CartDetect; PHYSICAL_SLOTS], ProbeError> {
        if !self.connected {
            return Err(ProbeError::Fault("detect before connect".to_string()));
        }
        Ok(std::array::from_fn(|i| CartDetect {
            present: self.config.carts[i].is_some(),
            cart_type: self.config.carts[i].clone(),
        }))
    }

    async fn run_check(
        &mut self,
        slot: usize,
        _cart_type: Option<&str>,
        with_cart: bool,
    ) -> Result<PerfCheck, ProbeError> {
        if !self.connected {
            return Err(ProbeError::Fault("check before connect".to_string()));
        }
        self.counters.checks.fetch_add(1, Ordering::SeqCst);

        if self.config.check_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.check_delay_ms)).await;
        }

        let fail = self.config.failing_slots.contains(&slot);
        let check = if with_cart {
            PerfCheck {
                loopback: TestOutcome::Pass,
                erase: TestOutcome::Pass,
                write: if fail {
                    TestOutcome::Fail
                } else {
                    TestOutcome::Pass
                },
                read: if fail {
                    TestOutcome::NotRun
                } else {
                    TestOutcome::Pass
                },
            }
        } else {
            PerfCheck {
                loopback: if fail {
                    TestOutcome::Fail
                } else {
                    TestOutcome::Pass
                },
                ..Default::default()
            }
        };
        Ok(check)
    }

    async fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }
}
