//! Rolling request metrics for the `/stats` report and periodic logs.
//!
//! Counters only grow. Response times are kept for the most recent
//! [`SAMPLE_CAPACITY`] requests and the average is recomputed from exactly
//! those samples on every update.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
    time::{Duration, Instant},
};

use serde::Serialize;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::info;

use crate::Result;

pub const SAMPLE_CAPACITY: usize = 100;

#[derive(Debug, Default)]
struct MetricsState {
    total_requests: u64,
    cache_hits: u64,
    rate_limit_hits: u64,
    errors: u64,
    samples_ms: VecDeque<f64>,
    average_ms: f64,
}

#[derive(Debug)]
pub struct MetricsCollector {
    started_at: Instant,
    state: Mutex<MetricsState>,
}

/// Read-only view of the collector at one point in time.
#[derive(Clone, Debug, Serialize)]
pub struct MetricsSnapshot {
    pub captured_at: String,
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_hit_rate: f64,
    pub rate_limit_hits: u64,
    pub errors: u64,
    pub average_response_ms: f64,
    pub sample_count: usize,
    pub uptime: Duration,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            state: Mutex::new(MetricsState::default()),
        }
    }

    pub fn record_request(&self, elapsed: Duration) {
        let mut st = self.lock();
        st.total_requests += 1;
        st.samples_ms.push_back(elapsed.as_secs_f64() * 1000.0);
        while st.samples_ms.len() > SAMPLE_CAPACITY {
            st.samples_ms.pop_front();
        }
        st.average_ms = st.samples_ms.iter().sum::<f64>() / st.samples_ms.len() as f64;
    }

    pub fn record_cache_hit(&self) {
        self.lock().cache_hits += 1;
    }

    pub fn record_rate_limit_hit(&self) {
        self.lock().rate_limit_hits += 1;
    }

    pub fn record_error(&self) {
        self.lock().errors += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let st = self.lock();
        MetricsSnapshot {
            captured_at: chrono::Utc::now().to_rfc3339(),
            total_requests: st.total_requests,
            cache_hits: st.cache_hits,
            cache_hit_rate: st.cache_hits as f64 / st.total_requests.max(1) as f64,
            rate_limit_hits: st.rate_limit_hits,
            errors: st.errors,
            average_response_ms: st.average_ms,
            sample_count: st.samples_ms.len(),
            uptime: self.started_at.elapsed(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MetricsState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ============== Host process usage ==============

/// Resource usage of this process, sampled from the host.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct ProcessUsage {
    /// Resident memory in bytes, if the host exposes it.
    pub memory_bytes: Option<u64>,
}

impl ProcessUsage {
    /// Blocking: refreshes this process's entry in the host process table.
    /// Prefer [`ProcessUsage::sample`] from async code.
    pub fn sample_blocking() -> Self {
        let pid = Pid::from_u32(std::process::id());
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        Self {
            memory_bytes: sys.process(pid).map(|p| p.memory()),
        }
    }

    pub async fn sample() -> Self {
        tokio::task::spawn_blocking(Self::sample_blocking)
            .await
            .unwrap_or_default()
    }
}

// ============== Reporting ==============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsReport {
    total_requests: u64,
    cache_hit_rate: String,
    rate_limit_hits: u64,
    errors: u64,
    average_response_time: String,
    memory_usage: String,
    uptime: String,
}

impl MetricsSnapshot {
    /// Emit the snapshot to the log sink as structured fields.
    pub fn log(&self, context: &str, process: &ProcessUsage) {
        info!(
            context,
            total_requests = self.total_requests,
            cache_hit_rate = %format!("{:.2}%", self.cache_hit_rate * 100.0),
            rate_limit_hits = self.rate_limit_hits,
            errors = self.errors,
            average_response_ms = %format!("{:.2}", self.average_response_ms),
            memory_bytes = process.memory_bytes,
            uptime_secs = self.uptime.as_secs(),
            "performance metrics"
        );
    }

    /// Operator-facing report (the `/stats` reply).
    pub fn to_report(&self, process: &ProcessUsage) -> Result<String> {
        let report = StatsReport {
            total_requests: self.total_requests,
            cache_hit_rate: format!("{:.2}%", self.cache_hit_rate * 100.0),
            rate_limit_hits: self.rate_limit_hits,
            errors: self.errors,
            average_response_time: format!("{:.2}ms", self.average_response_ms),
            memory_usage: match process.memory_bytes {
                Some(b) => format!("{:.2} MB", b as f64 / 1024.0 / 1024.0),
                None => "n/a".to_string(),
            },
            uptime: format!("{:.2} minutes", self.uptime.as_secs_f64() / 60.0),
        };
        Ok(format!(
            "Performance Stats:\n{}",
            serde_json::to_string_pretty(&report)?
        ))
    }
}
