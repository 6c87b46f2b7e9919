use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One CPU/RAM measurement taken on an agent host.
///
/// The serialized form is also the `/collect` request body and the payload of
/// a spool line, so field names follow the wire contract (`cpu`, `ram`).
///
/// # Examples
///
/// ```
/// use vigil_common::types::Sample;
///
/// let json = r#"{"agent_id":"pc-001","timestamp":"2024-05-01T10:00:00Z","cpu":12.5,"ram":40.0}"#;
/// let sample: Sample = serde_json::from_str(json).unwrap();
/// assert_eq!(sample.agent_id, "pc-001");
/// assert_eq!(sample.cpu_pct, 12.5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Sample {
    /// Agent identity. `client_id` is accepted for older agents.
    #[serde(alias = "client_id")]
    pub agent_id: String,
    /// Sampling instant. Timestamps without an offset are read as UTC.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "cpu")]
    pub cpu_pct: f64,
    #[serde(rename = "ram")]
    pub ram_pct: f64,
}

impl Sample {
    pub fn new(agent_id: impl Into<String>, timestamp: DateTime<Utc>, cpu_pct: f64, ram_pct: f64) -> Self {
        Self {
            agent_id: agent_id.into(),
            timestamp,
            cpu_pct,
            ram_pct,
        }
    }
}

/// Parses RFC 3339 timestamps, falling back to naive ISO 8601 (`2024-05-01T10:00:00.123456`)
/// interpreted as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

/// Run-state an operator wants an agent to be in.
///
/// On the wire `Run` is `"start"` and `Stop` is `"stop"`.
///
/// # Examples
///
/// ```
/// use vigil_common::types::DesiredState;
///
/// let state: DesiredState = "START".parse().unwrap();
/// assert_eq!(state, DesiredState::Run);
/// assert_eq!(DesiredState::Stop.to_string(), "stop");
/// assert!("pause".parse::<DesiredState>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
pub enum DesiredState {
    #[serde(rename = "start", alias = "run")]
    Run,
    #[serde(rename = "stop")]
    Stop,
}

impl DesiredState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DesiredState::Run => "start",
            DesiredState::Stop => "stop",
        }
    }
}

impl std::fmt::Display for DesiredState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DesiredState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "start" | "run" => Ok(DesiredState::Run),
            "stop" => Ok(DesiredState::Stop),
            _ => Err(format!("unknown command: {s}")),
        }
    }
}

/// The single current command stored for an agent identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub agent_id: String,
    pub desired_state: DesiredState,
    /// `None` when no command was ever written for this identity.
    pub updated_at: Option<DateTime<Utc>>,
}

impl CommandRecord {
    /// Identities nobody has issued a command for stay stopped.
    pub const DEFAULT_STATE: DesiredState = DesiredState::Stop;

    pub fn default_for(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            desired_state: Self::DEFAULT_STATE,
            updated_at: None,
        }
    }
}

/// Agent as last seen by the ingestion path.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AgentRecord {
    pub agent_id: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

// ---- wire types ----

/// `GET /command/{agent_id}` response body.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CommandResponse {
    pub command: DesiredState,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<CommandRecord> for CommandResponse {
    fn from(record: CommandRecord) -> Self {
        Self {
            command: record.desired_state,
            updated_at: record.updated_at,
        }
    }
}

/// `POST /command/{agent_id}` request body. The command is kept as a raw
/// string so an unknown value maps to a validation error instead of a
/// deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SetCommandRequest {
    pub command: String,
}

/// `POST /command/{agent_id}` response body.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SetCommandResponse {
    pub status: String,
    pub agent_id: String,
    pub command: DesiredState,
}

/// Generic `{"status": "ok"}` acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// One row of `GET /metrics/{agent_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    pub cpu: f64,
    pub ram: f64,
}

impl From<&Sample> for MetricPoint {
    fn from(sample: &Sample) -> Self {
        Self {
            timestamp: sample.timestamp,
            cpu: sample.cpu_pct,
            ram: sample.ram_pct,
        }
    }
}
