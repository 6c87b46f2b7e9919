//! Desired-state polling and the agent's local run-state.

use crate::transport::CommandSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use vigil_common::types::DesiredState;

/// What the agent currently believes it should be doing.
#[derive(Debug, Clone)]
pub struct AgentRunState {
    pub agent_id: String,
    pub active: bool,
    /// Earliest instant the next collection cycle may start. Only meaningful
    /// while `active`.
    pub next_collect_at: Instant,
}

impl AgentRunState {
    /// Agents always boot idle and wait for the control service.
    pub fn idle(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            active: false,
            next_collect_at: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    Started,
    Stopped,
}

pub struct CommandPoller {
    source: Arc<dyn CommandSource>,
    poll_timeout: Duration,
}

impl CommandPoller {
    pub fn new(source: Arc<dyn CommandSource>, poll_timeout: Duration) -> Self {
        Self {
            source,
            poll_timeout,
        }
    }

    /// Fetches the desired state. Failures and timeouts yield `None` and are
    /// logged; the caller keeps its last known state.
    pub async fn poll(&self, agent_id: &str) -> Option<DesiredState> {
        match tokio::time::timeout(self.poll_timeout, self.source.fetch_command(agent_id)).await {
            Ok(Ok(state)) => Some(state),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Command poll failed, keeping current state");
                None
            }
            Err(_) => {
                tracing::warn!(
                    timeout = ?self.poll_timeout,
                    "Command poll timed out, keeping current state"
                );
                None
            }
        }
    }

    /// Polls and folds the answer into `state`.
    pub async fn poll_and_apply(&self, state: &mut AgentRunState, now: Instant) -> Transition {
        match self.poll(&state.agent_id).await {
            Some(desired) => apply(state, desired, now),
            None => Transition::None,
        }
    }
}

/// Applies a freshly fetched desired state. Starting schedules an immediate
/// collection; repeated identical answers change nothing.
pub fn apply(state: &mut AgentRunState, desired: DesiredState, now: Instant) -> Transition {
    match (state.active, desired) {
        (false, DesiredState::Run) => {
            state.active = true;
            state.next_collect_at = now;
            tracing::info!(agent_id = %state.agent_id, "Collection started by control service");
            Transition::Started
        }
        (true, DesiredState::Stop) => {
            state.active = false;
            tracing::info!(agent_id = %state.agent_id, "Collection stopped by control service");
            Transition::Stopped
        }
        _ => Transition::None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::TransportError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Clone, Copy, Debug)]
    pub(crate) enum Answer {
        State(DesiredState),
        Fail,
        Hang,
    }

    /// Answers every poll with whatever was last set.
    pub(crate) struct SwitchableSource {
        answer: Mutex<Answer>,
    }

    impl SwitchableSource {
        pub(crate) fn new(answer: Answer) -> Arc<Self> {
            Arc::new(Self {
                answer: Mutex::new(answer),
            })
        }

        pub(crate) fn set(&self, answer: Answer) {
            *self.answer.lock().unwrap() = answer;
        }
    }

    #[async_trait]
    impl CommandSource for SwitchableSource {
        async fn fetch_command(&self, _agent_id: &str) -> Result<DesiredState, TransportError> {
            let answer = *self.answer.lock().unwrap();
            match answer {
                Answer::State(state) => Ok(state),
                Answer::Fail => Err(TransportError::Transient("connection refused".into())),
                Answer::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(DesiredState::Run)
                }
            }
        }
    }

    #[test]
    fn start_schedules_immediate_collection() {
        let mut state = AgentRunState::idle("pc-001");
        let now = Instant::now() + Duration::from_secs(10);
        assert_eq!(apply(&mut state, DesiredState::Run, now), Transition::Started);
        assert!(state.active);
        assert_eq!(state.next_collect_at, now);
    }

    #[test]
    fn repeated_answers_are_idempotent() {
        let mut state = AgentRunState::idle("pc-001");
        let now = Instant::now();
        assert_eq!(apply(&mut state, DesiredState::Stop, now), Transition::None);
        apply(&mut state, DesiredState::Run, now);
        let later = now + Duration::from_secs(5);
        assert_eq!(apply(&mut state, DesiredState::Run, later), Transition::None);
        // A repeated start must not pull the schedule forward
        assert_eq!(state.next_collect_at, now);
        assert_eq!(apply(&mut state, DesiredState::Stop, later), Transition::Stopped);
        assert!(!state.active);
    }

    #[tokio::test]
    async fn failed_poll_keeps_state() {
        let source = SwitchableSource::new(Answer::State(DesiredState::Run));
        let poller = CommandPoller::new(source.clone(), Duration::from_millis(100));
        let mut state = AgentRunState::idle("pc-001");

        assert_eq!(
            poller.poll_and_apply(&mut state, Instant::now()).await,
            Transition::Started
        );
        source.set(Answer::Fail);
        assert_eq!(
            poller.poll_and_apply(&mut state, Instant::now()).await,
            Transition::None
        );
        assert!(state.active);

        source.set(Answer::Hang);
        assert_eq!(poller.poll(&state.agent_id).await, None);
        assert!(state.active);
    }
}
