//! RunViewState - everything a run view knows about one run.
//!
//! Mutated only by the owning actor. Readers get clones.

use chrono::{DateTime, Utc};
use shared_types::{
    ErrorCount, Frame, HostTelemetry, PageRow, RunId, RunRecord, StopReason, StorageMode,
};

use crate::api::ApiError;
use crate::graph::{GraphEdge, GraphState};
use crate::personality::{rank_hosts, HostPersonality, TOP_HOSTS};
use crate::series::{QueuePoint, SeriesSet};

use super::status::{ConnectionStatus, StatusSignal};

#[derive(Debug, Clone, PartialEq)]
pub struct RunViewState {
    run_id: RunId,
    status: ConnectionStatus,
    series: SeriesSet,
    graph: GraphState,
    errors: Vec<ErrorCount>,
    hosts: Vec<HostTelemetry>,
    last_updated: Option<DateTime<Utc>>,
    frames_applied: u64,
    frames_rejected: u64,
    run: Option<RunRecord>,
    storage_mode: StorageMode,
    pages: Vec<PageRow>,
}

impl RunViewState {
    pub fn new(run_id: RunId, series_capacity: usize) -> Self {
        Self {
            run_id,
            status: ConnectionStatus::default(),
            series: SeriesSet::new(series_capacity),
            graph: GraphState::new(),
            errors: Vec::new(),
            hosts: Vec::new(),
            last_updated: None,
            frames_applied: 0,
            frames_rejected: 0,
            run: None,
            storage_mode: StorageMode::Memory,
            pages: Vec::new(),
        }
    }

    // ── Push path ───────────────────────────────────────────────────────────

    /// Merge one decoded frame. Series and graph accrete; errors and hosts
    /// are replaced.
    pub fn apply_frame(&mut self, frame: &Frame) {
        self.series.record(frame);
        self.graph.apply(&frame.graph_delta);
        self.errors = frame.errors.clone();
        self.hosts = frame.hosts.clone();
        self.last_updated = Some(frame.ts);
        self.frames_applied += 1;
    }

    pub fn record_rejected_frame(&mut self) {
        self.frames_rejected += 1;
    }

    /// Feed the status machine. Returns `(from, to)` when the status moved.
    pub fn signal(&mut self, signal: StatusSignal) -> Option<(ConnectionStatus, ConnectionStatus)> {
        let from = self.status;
        let to = from.next(signal);
        if from == to {
            return None;
        }
        self.status = to;
        Some((from, to))
    }

    // ── Poll path ───────────────────────────────────────────────────────────

    /// Returns `true` when the run slot was replaced. A failed fetch keeps
    /// the previous record but stops claiming durable storage.
    pub fn apply_run_poll(&mut self, result: Result<RunRecord, ApiError>) -> bool {
        match result {
            Ok(record) => {
                self.storage_mode = record.storage_mode.clone();
                self.run = Some(record);
                true
            }
            Err(_) => {
                self.storage_mode = StorageMode::Memory;
                false
            }
        }
    }

    /// Returns `true` when the pages slot was replaced.
    pub fn apply_pages_poll(&mut self, result: Result<Vec<PageRow>, ApiError>) -> bool {
        match result {
            Ok(pages) => {
                self.pages = pages;
                true
            }
            Err(_) => false,
        }
    }

    // ── Readers ─────────────────────────────────────────────────────────────

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn series(&self) -> &SeriesSet {
        &self.series
    }

    pub fn graph(&self) -> &GraphState {
        &self.graph
    }

    pub fn errors(&self) -> &[ErrorCount] {
        &self.errors
    }

    pub fn hosts(&self) -> &[HostTelemetry] {
        &self.hosts
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn frames_applied(&self) -> u64 {
        self.frames_applied
    }

    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected
    }

    pub fn run(&self) -> Option<&RunRecord> {
        self.run.as_ref()
    }

    pub fn storage_mode(&self) -> &StorageMode {
        &self.storage_mode
    }

    pub fn pages(&self) -> &[PageRow] {
        &self.pages
    }

    // ── Projections ─────────────────────────────────────────────────────────

    pub fn throughput(&self) -> Vec<f64> {
        self.series.throughput.to_vec()
    }

    /// Frontier/fetch/parse aligned per frame, oldest first.
    pub fn queue_series(&self) -> Vec<QueuePoint> {
        self.series.queue_points()
    }

    /// Top hosts from the latest frame, labelled and ranked.
    pub fn host_personalities(&self) -> Vec<HostPersonality> {
        rank_hosts(&self.hosts, TOP_HOSTS)
    }

    pub fn nodes(&self) -> Vec<String> {
        self.graph.nodes().map(ToString::to_string).collect()
    }

    pub fn edges(&self) -> Vec<GraphEdge> {
        self.graph.edges()
    }

    pub fn effective_stop_reason(&self) -> Option<StopReason> {
        self.run.as_ref().map(RunRecord::effective_stop_reason)
    }

    pub fn storage_is_durable(&self) -> bool {
        self.storage_mode.is_durable()
    }
}
