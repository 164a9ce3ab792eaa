//! Shared types between the crawl telemetry client and its consumers
//!
//! These types mirror the crawler backend's JSON resources:
//! - Frames pushed over the per-run event stream
//! - Run and page resources returned by the pull endpoints
//!
//! Serializable with serde for JSON over SSE/HTTP

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Core Types
// ============================================================================

/// Opaque identifier of one crawl run, as minted by the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The producer encodes empty lists as `null`.
///
/// A missing or `null` list becomes empty; any other non-list value is still
/// rejected by the inner `Vec` deserializer.
pub fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A missing or `null` object becomes its default.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Gauge readings (queue depths, in-flight counts, latencies) arrive as any
/// JSON number. Non-negative finite values are rounded to the nearest
/// integer; negative or non-finite values are rejected.
pub fn gauge<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct GaugeVisitor;

    impl<'de> serde::de::Visitor<'de> for GaugeVisitor {
        type Value = u64;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("a non-negative number")
        }

        fn visit_u64<E: serde::de::Error>(self, value: u64) -> Result<u64, E> {
            Ok(value)
        }

        fn visit_i64<E: serde::de::Error>(self, value: i64) -> Result<u64, E> {
            u64::try_from(value)
                .map_err(|_| E::invalid_value(serde::de::Unexpected::Signed(value), &self))
        }

        fn visit_f64<E: serde::de::Error>(self, value: f64) -> Result<u64, E> {
            if value.is_finite() && value >= 0.0 && value <= u64::MAX as f64 {
                Ok(value.round() as u64)
            } else {
                Err(E::invalid_value(serde::de::Unexpected::Float(value), &self))
            }
        }
    }

    deserializer.deserialize_any(GaugeVisitor)
}

// ============================================================================
// Telemetry Frames
// ============================================================================

/// Name of the server-sent event carrying a [`Frame`]
pub const FRAME_EVENT: &str = "frame";

/// One telemetry snapshot pushed by the crawler.
///
/// Graph fields are a delta; error and host lists replace the previous ones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    pub ts: DateTime<Utc>,
    pub throughput: Throughput,
    pub queues: QueueDepths,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub errors: Vec<ErrorCount>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub hosts: Vec<HostTelemetry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub graph_delta: GraphDelta,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Throughput {
    pub pages_per_sec: f64,
}

/// Occupancy of the three pipeline stages
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct QueueDepths {
    #[serde(deserialize_with = "gauge")]
    pub frontier: u64,
    #[serde(deserialize_with = "gauge")]
    pub fetch: u64,
    #[serde(deserialize_with = "gauge")]
    pub parse: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorCount {
    pub class: String,
    pub count: u64,
}

/// Per-host health as reported by the crawler
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostTelemetry {
    pub host: String,
    #[serde(deserialize_with = "gauge")]
    pub inflight: u64,
    #[serde(deserialize_with = "gauge")]
    pub p95_ms: u64,
    pub error_rate: f64,
    pub reuse_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robots_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_state: Option<String>,
}

/// Incremental graph observations carried by one frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GraphDelta {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub nodes: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub edges: Vec<EdgeObservation>,
}

/// `[source, destination, count]` on the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "(String, String, u64)", into = "(String, String, u64)")]
pub struct EdgeObservation {
    pub src: String,
    pub dst: String,
    pub count: u64,
}

impl EdgeObservation {
    pub fn new(src: impl Into<String>, dst: impl Into<String>, count: u64) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            count,
        }
    }
}

impl From<(String, String, u64)> for EdgeObservation {
    fn from((src, dst, count): (String, String, u64)) -> Self {
        Self { src, dst, count }
    }
}

impl From<EdgeObservation> for (String, String, u64) {
    fn from(edge: EdgeObservation) -> Self {
        (edge.src, edge.dst, edge.count)
    }
}

// ============================================================================
// Run Resources
// ============================================================================

/// Body of `POST /runs`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CreateRunRequest {
    pub seed_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_budget_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_links_per_page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_concurrency: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_host_concurrency: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Unset means "use the server default"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respect_robots: Option<bool>,
}

impl CreateRunRequest {
    pub fn new(seed_url: impl Into<String>) -> Self {
        Self {
            seed_url: seed_url.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateRunResponse {
    pub id: RunId,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Body of the start/stop actions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunActionResponse {
    pub status: String,
}

/// Why a run is no longer running
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Running,
    Manual,
    MaxPages,
    TimeBudget,
    #[serde(other)]
    Unknown,
}

impl StopReason {
    /// Resolve the reason shown for a run, mirroring the backend's rule that
    /// a running run without a recorded reason is simply "running".
    pub fn effective(raw: &str, status: &str) -> Self {
        match raw {
            "" if status == "running" => Self::Running,
            "" => Self::Unknown,
            "running" => Self::Running,
            "manual" => Self::Manual,
            "max_pages" => Self::MaxPages,
            "time_budget" => Self::TimeBudget,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Manual => "manual",
            Self::MaxPages => "max_pages",
            Self::TimeBudget => "time_budget",
            Self::Unknown => "unknown",
        }
    }
}

/// Where the backend keeps run data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(from = "String", into = "String")]
pub enum StorageMode {
    Postgres,
    /// Also the assumed mode when run metadata cannot be fetched
    #[default]
    Memory,
    Other(String),
}

impl StorageMode {
    pub fn is_durable(&self) -> bool {
        matches!(self, Self::Postgres)
    }
}

impl From<String> for StorageMode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "postgres" => Self::Postgres,
            "memory" => Self::Memory,
            _ => Self::Other(value),
        }
    }
}

impl From<StorageMode> for String {
    fn from(mode: StorageMode) -> Self {
        match mode {
            StorageMode::Postgres => "postgres".to_string(),
            StorageMode::Memory => "memory".to_string(),
            StorageMode::Other(value) => value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RunLimits {
    #[serde(default)]
    pub max_depth: u32,
    #[serde(default)]
    pub max_pages: u32,
    #[serde(default)]
    pub time_budget_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RunSummary {
    #[serde(default)]
    pub pages_fetched: u64,
    #[serde(default)]
    pub pages_failed: u64,
    #[serde(default)]
    pub unique_hosts: u64,
    #[serde(default)]
    pub total_bytes: u64,
    #[serde(default)]
    pub last_fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RunStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages_fetched: Option<u64>,
}

/// Body of `GET /runs/{id}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    pub id: RunId,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub storage_mode: StorageMode,
    #[serde(default)]
    pub stop_reason: String,
    #[serde(default)]
    pub limits: RunLimits,
    #[serde(default)]
    pub summary: Option<RunSummary>,
    #[serde(default)]
    pub stats: RunStats,
}

impl RunRecord {
    pub fn effective_stop_reason(&self) -> StopReason {
        StopReason::effective(&self.stop_reason, &self.status)
    }
}

/// One processed page as listed by `GET /runs/{id}/pages`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageRow {
    pub url: String,
    pub host: String,
    pub depth: u32,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub fetch_ms: u64,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PageList {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub items: Vec<PageRow>,
}

// ============================================================================
// Tests
// ============================================================================
