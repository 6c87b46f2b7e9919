//! Sample, deliver, spool on failure, and flush the backlog in order.

use crate::error::{SpoolError, TransportError};
use crate::spool::Spool;
use crate::transport::SampleSink;
use std::sync::Arc;
use std::time::Duration;
use vigil_collector::SampleSource;
use vigil_common::types::Sample;

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// A fresh sample was taken.
    pub sampled: bool,
    /// The fresh sample reached the collector directly.
    pub delivered: bool,
    /// The fresh sample was written to the spool.
    pub spooled: bool,
    /// The fresh sample was refused by the collector and dropped.
    pub rejected: bool,
    /// Spooled samples delivered by the flush that followed.
    pub flushed: usize,
    /// Entries left in the spool at the end of the cycle.
    pub remaining: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub flushed: usize,
    pub rejected: usize,
    pub remaining: usize,
}

enum Attempt {
    Delivered,
    Rejected,
    Transient,
}

pub struct DeliveryEngine {
    agent_id: String,
    source: Box<dyn SampleSource>,
    sink: Arc<dyn SampleSink>,
    spool: Spool,
    request_timeout: Duration,
}

impl DeliveryEngine {
    pub fn new(
        agent_id: impl Into<String>,
        source: Box<dyn SampleSource>,
        sink: Arc<dyn SampleSink>,
        spool: Spool,
        request_timeout: Duration,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            source,
            sink,
            spool,
            request_timeout,
        }
    }

    pub fn spool(&self) -> &Spool {
        &self.spool
    }

    /// Takes one sample and tries to hand it to the collector.
    ///
    /// A sample that cannot be delivered right now is spooled and the backlog
    /// is left alone; a delivered or rejected sample is followed by a flush of
    /// the backlog. Only a spool failure is returned as an error.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, SpoolError> {
        let mut report = CycleReport::default();

        let sample = match self.source.sample(&self.agent_id) {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!(error = %e, "Sampling failed, skipping this cycle");
                report.remaining = self.spool.len();
                return Ok(report);
            }
        };
        report.sampled = true;
        tracing::debug!(cpu = sample.cpu_pct, ram = sample.ram_pct, "Sampled");

        match self.attempt(&sample).await {
            Attempt::Delivered => report.delivered = true,
            Attempt::Rejected => report.rejected = true,
            Attempt::Transient => {
                let entry = self.spool.append(sample)?;
                tracing::debug!(seq = entry.seq, pending = self.spool.len(), "Sample spooled");
                report.spooled = true;
                report.remaining = self.spool.len();
                return Ok(report);
            }
        }

        let flush = self.flush().await?;
        report.flushed = flush.flushed;
        report.remaining = flush.remaining;
        Ok(report)
    }

    /// Sends spooled samples oldest first until the spool is empty or a
    /// delivery fails transiently. Delivered and rejected entries are removed
    /// in one batch at the end; the failed entry and everything after it stay
    /// in place.
    pub async fn flush(&mut self) -> Result<FlushReport, SpoolError> {
        let pending = self.spool.drain();
        if pending.is_empty() {
            return Ok(FlushReport::default());
        }

        let mut done = Vec::with_capacity(pending.len());
        let mut report = FlushReport::default();
        for entry in &pending {
            match self.attempt(&entry.sample).await {
                Attempt::Delivered => {
                    report.flushed += 1;
                    done.push(entry.seq);
                }
                Attempt::Rejected => {
                    report.rejected += 1;
                    done.push(entry.seq);
                }
                Attempt::Transient => break,
            }
        }

        self.spool.remove(&done)?;
        report.remaining = self.spool.len();
        if report.flushed > 0 || report.rejected > 0 {
            tracing::info!(
                flushed = report.flushed,
                rejected = report.rejected,
                remaining = report.remaining,
                "Flushed spooled samples"
            );
        }
        Ok(report)
    }

    async fn attempt(&self, sample: &Sample) -> Attempt {
        let outcome = match tokio::time::timeout(self.request_timeout, self.sink.deliver(sample)).await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Transient(format!(
                "delivery timed out after {:?}",
                self.request_timeout
            ))),
        };
        match outcome {
            Ok(()) => Attempt::Delivered,
            Err(TransportError::Rejected { status, message }) => {
                tracing::error!(
                    status,
                    error = %message,
                    timestamp = %sample.timestamp,
                    "Collector rejected sample, dropping it"
                );
                Attempt::Rejected
            }
            Err(e) => {
                tracing::warn!(error = %e, "Delivery failed, will retry");
                Attempt::Transient
            }
        }
    }
}
