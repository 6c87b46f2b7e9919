use crate::{clamp_percent, Collector};
use anyhow::Result;
use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};

/// Global CPU usage across all cores.
///
/// sysinfo computes usage as a delta between two refreshes taken at least
/// [`MINIMUM_CPU_UPDATE_INTERVAL`] apart. `new()` blocks for that interval and
/// refreshes twice so the first `collect()` already returns a real reading
/// instead of 0 or 100.
pub struct CpuCollector {
    system: System,
}

impl CpuCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
        system.refresh_cpu_usage();
        Self { system }
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for CpuCollector {
    fn name(&self) -> &str {
        "cpu"
    }

    fn collect(&mut self) -> Result<f64> {
        self.system.refresh_cpu_usage();
        Ok(clamp_percent(self.system.global_cpu_usage() as f64))
    }
}
