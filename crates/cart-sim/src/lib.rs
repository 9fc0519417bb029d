//! Simulation layer for the cartridge test bench
//!
//! A virtual multiplexer that speaks the switch wire protocol over in-memory
//! streams and a scriptable cartridge probe, so the whole engine runs and
//! tests without a serial port or bench hardware.

pub mod mux;
pub mod probe;

pub use mux::{run_virtual_mux_task, spawn_virtual_mux, VirtualMux};
pub use probe::{SimProbe, SimProbeConfig, SimProbeCounters};
