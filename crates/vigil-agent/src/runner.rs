use crate::config::AgentConfig;
use crate::delivery::{CycleReport, DeliveryEngine, FlushReport};
use crate::error::SpoolError;
use crate::poller::{AgentRunState, CommandPoller, Transition};
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};

/// What happened during one scheduler tick.
#[derive(Debug, Default)]
pub struct TickReport {
    pub transition: Option<Transition>,
    pub cycle: Option<CycleReport>,
    /// Set when a stop arrived and the backlog was flushed one last time.
    pub final_flush: Option<FlushReport>,
    /// Set when an idle agent retried its leftover backlog.
    pub idle_flush: Option<FlushReport>,
}

/// Single-task scheduler driving the poller and the delivery engine.
///
/// Each tick polls the control service first, then runs a collection cycle
/// if the agent is active and the cycle is due. The next cycle is scheduled
/// one collection interval after the previous one completed, so slow
/// deliveries never make cycles overlap.
///
/// An idle agent samples nothing, but a non-empty spool is still flushed once
/// per collection interval until it drains.
pub struct Agent {
    state: AgentRunState,
    next_idle_flush_at: Instant,
    poller: CommandPoller,
    engine: DeliveryEngine,
    collection_interval: Duration,
    poll_interval: Duration,
}

impl Agent {
    pub fn new(config: &AgentConfig, poller: CommandPoller, engine: DeliveryEngine) -> Self {
        Self::with_intervals(
            &config.agent_id,
            poller,
            engine,
            config.collection_interval(),
            config.poll_interval(),
        )
    }

    pub fn with_intervals(
        agent_id: &str,
        poller: CommandPoller,
        engine: DeliveryEngine,
        collection_interval: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            state: AgentRunState::idle(agent_id),
            next_idle_flush_at: Instant::now(),
            poller,
            engine,
            collection_interval,
            poll_interval,
        }
    }

    pub fn state(&self) -> &AgentRunState {
        &self.state
    }

    pub fn engine(&self) -> &DeliveryEngine {
        &self.engine
    }

    pub async fn tick(&mut self) -> Result<TickReport, SpoolError> {
        self.tick_at(Instant::now()).await
    }

    pub async fn tick_at(&mut self, now: Instant) -> Result<TickReport, SpoolError> {
        let mut report = TickReport::default();

        let transition = self.poller.poll_and_apply(&mut self.state, now).await;
        report.transition = Some(transition);
        if transition == Transition::Stopped {
            report.final_flush = Some(self.engine.flush().await?);
            self.next_idle_flush_at = now.max(Instant::now()) + self.collection_interval;
            return Ok(report);
        }

        if !self.state.active {
            if !self.engine.spool().is_empty() && now >= self.next_idle_flush_at {
                let flush = self.engine.flush().await?;
                self.next_idle_flush_at = now.max(Instant::now()) + self.collection_interval;
                tracing::debug!(
                    flushed = flush.flushed,
                    remaining = flush.remaining,
                    "Idle backlog flush finished"
                );
                report.idle_flush = Some(flush);
            }
            return Ok(report);
        }

        if now >= self.state.next_collect_at {
            let cycle = self.engine.run_cycle().await?;
            self.state.next_collect_at = now.max(Instant::now()) + self.collection_interval;
            tracing::debug!(
                delivered = cycle.delivered,
                spooled = cycle.spooled,
                flushed = cycle.flushed,
                remaining = cycle.remaining,
                "Collection cycle finished"
            );
            report.cycle = Some(cycle);
        }
        Ok(report)
    }

    /// Runs until `shutdown` resolves or the spool fails.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), SpoolError>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(
            agent_id = %self.state.agent_id,
            poll_interval = ?self.poll_interval,
            collection_interval = ?self.collection_interval,
            pending = self.engine.spool().len(),
            "Agent loop started, waiting for a start command"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await?;
                }
                _ = &mut shutdown => {
                    tracing::info!(pending = self.engine.spool().len(), "Shutting down gracefully");
                    return Ok(());
                }
            }
        }
    }
}
