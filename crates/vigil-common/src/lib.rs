//! Types shared by the vigil agent, server and storage crates.

pub mod types;
pub mod validation;
