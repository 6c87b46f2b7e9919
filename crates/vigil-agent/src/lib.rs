//! vigil agent: samples host utilization, ships it to the collector, and
//! spools whatever cannot be delivered yet.
//!
//! The run loop ([`runner::Agent`]) polls the control service on a short
//! interval and only samples while the operator has the agent started.

pub mod config;
pub mod delivery;
pub mod error;
pub mod poller;
pub mod runner;
pub mod spool;
pub mod transport;
