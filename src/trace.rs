//! Request-scoped tracing
//!
//! Each request carries one [`RequestTrace`]: an opaque correlation id
//! plus append-only per-stage timers and degradation notes. The trace is
//! cheaply cloneable so the orchestrator can still read timings gathered
//! so far after a stage future is cancelled at the global deadline. No
//! process-wide logger state is involved.

use std::sync::{Arc, Mutex};
use std::time::Instant;
use uuid::Uuid;

use crate::types::DebugInfo;

#[derive(Debug, Default)]
struct TraceInner {
    bm25_time_ms: u64,
    dense_time_ms: u64,
    rerank_time_ms: u64,
    generation_time_ms: u64,
    degradations: Vec<String>,
    citations_incomplete: bool,
}

/// Shared, request-scoped timing accumulator.
#[derive(Debug, Clone)]
pub struct RequestTrace {
    trace_id: String,
    started: Instant,
    inner: Arc<Mutex<TraceInner>>,
}

impl RequestTrace {
    pub fn new() -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            started: Instant::now(),
            inner: Arc::new(Mutex::new(TraceInner::default())),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Wall-clock ms since the request was received.
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn record_bm25(&self, ms: u64) {
        self.inner.lock().unwrap().bm25_time_ms = ms;
    }

    pub fn record_dense(&self, ms: u64) {
        self.inner.lock().unwrap().dense_time_ms = ms;
    }

    pub fn record_rerank(&self, ms: u64) {
        self.inner.lock().unwrap().rerank_time_ms = ms;
    }

    pub fn record_generation(&self, ms: u64) {
        self.inner.lock().unwrap().generation_time_ms = ms;
    }

    /// Append a degradation note (rerank fallback, extractive fallback,
    /// single-source retrieval, dropped citation markers).
    pub fn note_degradation(&self, reason: impl Into<String>) {
        self.inner.lock().unwrap().degradations.push(reason.into());
    }

    pub fn flag_citations_incomplete(&self) {
        self.inner.lock().unwrap().citations_incomplete = true;
    }

    /// Snapshot into the caller-facing debug payload.
    pub fn debug_info(&self, confidence_score: f32) -> DebugInfo {
        let inner = self.inner.lock().unwrap();
        DebugInfo {
            trace_id: self.trace_id.clone(),
            bm25_time_ms: inner.bm25_time_ms,
            dense_time_ms: inner.dense_time_ms,
            rerank_time_ms: inner.rerank_time_ms,
            generation_time_ms: inner.generation_time_ms,
            total_time_ms: self.elapsed_ms(),
            confidence_score,
            degradations: inner.degradations.clone(),
            citations_incomplete: inner.citations_incomplete,
        }
    }
}

impl Default for RequestTrace {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer for one stage, read back into the trace on completion.
pub struct StageTimer(Instant);

impl StageTimer {
    pub fn start() -> Self {
        Self(Instant::now())
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.0.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_ids_are_unique() {
        let a = RequestTrace::new();
        let b = RequestTrace::new();
        assert_ne!(a.trace_id(), b.trace_id());
    }

    #[test]
    fn test_timings_survive_clone() {
        let trace = RequestTrace::new();
        let cloned = trace.clone();
        cloned.record_bm25(42);
        cloned.note_degradation("vector backend failed");

        let debug = trace.debug_info(0.5);
        assert_eq!(debug.bm25_time_ms, 42);
        assert_eq!(debug.degradations.len(), 1);
        assert_eq!(debug.confidence_score, 0.5);
    }

    #[test]
    fn test_citations_incomplete_flag() {
        let trace = RequestTrace::new();
        assert!(!trace.debug_info(0.0).citations_incomplete);
        trace.flag_citations_incomplete();
        assert!(trace.debug_info(0.0).citations_incomplete);
    }
}
