//! Sample source for the vigil agent.
//!
//! Each [`Collector`] reads one utilization figure from the host (CPU,
//! memory). [`SystemSampler`] combines them into the single [`Sample`] the
//! delivery engine ships every collection tick.

pub mod cpu;
pub mod memory;

use anyhow::{Context, Result};
use chrono::Utc;
use vigil_common::types::Sample;

use crate::cpu::CpuCollector;
use crate::memory::MemoryCollector;

/// A host utilization probe.
pub trait Collector: Send + Sync {
    /// Returns the collector name (e.g. `"cpu"`), used for logging.
    fn name(&self) -> &str;

    /// Returns the current utilization as a percentage in `[0, 100]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying system API call fails.
    fn collect(&mut self) -> Result<f64>;
}

/// Produces one [`Sample`] per call.
///
/// The agent only ever calls it from its single run task, so implementations
/// need `Send` but not `Sync`.
pub trait SampleSource: Send {
    fn sample(&mut self, agent_id: &str) -> Result<Sample>;
}

/// [`SampleSource`] backed by the CPU and memory collectors.
pub struct SystemSampler {
    cpu: CpuCollector,
    memory: MemoryCollector,
}

impl SystemSampler {
    pub fn new() -> Self {
        Self {
            cpu: CpuCollector::new(),
            memory: MemoryCollector::new(),
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for SystemSampler {
    fn sample(&mut self, agent_id: &str) -> Result<Sample> {
        let cpu = self
            .cpu
            .collect()
            .with_context(|| format!("{} collector failed", self.cpu.name()))?;
        let ram = self
            .memory
            .collect()
            .with_context(|| format!("{} collector failed", self.memory.name()))?;
        Ok(Sample::new(agent_id, Utc::now(), cpu, ram))
    }
}

/// Host name used as the default agent identity.
pub fn host_name() -> Option<String> {
    sysinfo::System::host_name().filter(|name| !name.trim().is_empty())
}

pub(crate) fn clamp_percent(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}
