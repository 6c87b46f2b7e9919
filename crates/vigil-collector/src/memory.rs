use crate::{clamp_percent, Collector};
use anyhow::{bail, Result};
use sysinfo::System;

/// Used RAM as a share of total RAM.
pub struct MemoryCollector {
    system: System,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for MemoryCollector {
    fn name(&self) -> &str {
        "memory"
    }

    fn collect(&mut self) -> Result<f64> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            bail!("total memory reported as zero");
        }
        let used = self.system.used_memory();
        Ok(clamp_percent(used as f64 / total as f64 * 100.0))
    }
}
