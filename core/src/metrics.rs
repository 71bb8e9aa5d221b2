//! Process-wide commit counters, plus the per-compiler [`CommitStats`].

use std::sync::{Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::util::fast_map::{FastHashMap, fast_hash_map_new};

struct CommitMetrics {
    environments: u64,
    functions: u64,
    failed_functions: u64,
    lir_instrs: u64,
    words: u64,
    widened_jumps: u64,
    failures_by_reason: FastHashMap<&'static str, u64>,
}

impl Default for CommitMetrics {
    fn default() -> Self {
        Self {
            environments: 0,
            functions: 0,
            failed_functions: 0,
            lir_instrs: 0,
            words: 0,
            widened_jumps: 0,
            failures_by_reason: fast_hash_map_new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitReasonEntry {
    pub reason: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitMetricsSnapshot {
    pub environments: u64,
    pub functions: u64,
    pub failed_functions: u64,
    pub lir_instrs: u64,
    pub words: u64,
    pub widened_jumps: u64,
    pub failure_reasons: Vec<CommitReasonEntry>,
}

/// Counters of one [`LirCompiler`](crate::lir::LirCompiler).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitStats {
    pub functions: u64,
    pub failed_functions: u64,
    pub lir_instrs: u64,
    pub words: u64,
    pub widened_jumps: u64,
    /// Offset computations, restarts after a widening included.
    pub layout_passes: u64,
    pub max_frame_size: u32,
}

static METRICS: Lazy<Mutex<CommitMetrics>> = Lazy::new(|| Mutex::new(CommitMetrics::default()));

fn metrics() -> MutexGuard<'static, CommitMetrics> {
    METRICS.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn record_function(lir_instrs: usize, words: usize, widened_jumps: u64) {
    let mut guard = metrics();
    guard.functions += 1;
    guard.lir_instrs += lir_instrs as u64;
    guard.words += words as u64;
    guard.widened_jumps += widened_jumps;
}

/// A queued function that could not be committed.
pub(crate) fn record_failure(reason: &'static str) {
    let mut guard = metrics();
    guard.failed_functions += 1;
    *guard.failures_by_reason.entry(reason).or_default() += 1;
}

/// A commit rejected after all of its functions were committed.
pub(crate) fn record_rejection(reason: &'static str) {
    *metrics().failures_by_reason.entry(reason).or_default() += 1;
}

pub(crate) fn record_environment() {
    metrics().environments += 1;
}

pub fn commit_metrics_snapshot() -> CommitMetricsSnapshot {
    let guard = metrics();
    let mut failure_reasons: Vec<CommitReasonEntry> = guard
        .failures_by_reason
        .iter()
        .map(|(reason, count)| CommitReasonEntry {
            reason: (*reason).to_string(),
            count: *count,
        })
        .collect();
    failure_reasons.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.reason.cmp(&b.reason)));

    CommitMetricsSnapshot {
        environments: guard.environments,
        functions: guard.functions,
        failed_functions: guard.failed_functions,
        lir_instrs: guard.lir_instrs,
        words: guard.words,
        widened_jumps: guard.widened_jumps,
        failure_reasons,
    }
}

pub fn commit_metrics_reset() {
    *metrics() = CommitMetrics::default();
}
