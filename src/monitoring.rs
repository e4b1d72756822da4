//! Request outcome recording.
//!
//! Keeps a bounded, in-memory history of handled requests for the status
//! endpoint and the periodic stats log. Nothing here influences whether a
//! request succeeds.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// One handled request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    /// Wall-clock time the request finished (RFC 3339).
    pub timestamp: String,
    /// Client identifier, usually the remote address.
    pub client_id: String,
    /// Request path or method.
    pub endpoint: String,
    /// HTTP status sent back.
    pub status: u16,
    /// Whether the caller presented a valid key.
    pub authenticated: bool,
    /// Handling time in milliseconds.
    pub duration_ms: f64,
}

/// Summary of recorded traffic.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonitorStats {
    /// Whether recording is enabled.
    pub monitoring_enabled: bool,
    /// Seconds since the monitor was created.
    pub uptime_secs: u64,
    /// Number of records currently held.
    pub request_count: usize,
    /// Records with a status of 400 or above.
    pub error_count: usize,
    /// Records per second of uptime.
    pub request_rate: f64,
    /// Resident memory of this process in MiB, if it could be read.
    pub memory_usage_mb: Option<f64>,
}

/// Bounded request log.
#[derive(Debug)]
pub struct Monitor {
    enabled: bool,
    max_records: usize,
    started: Instant,
    records: Mutex<VecDeque<RequestRecord>>,
}

impl Monitor {
    /// Creates a monitor that keeps at most `max_records` entries.
    #[must_use]
    pub fn new(enabled: bool, max_records: usize) -> Self {
        Self {
            enabled,
            max_records,
            started: Instant::now(),
            records: Mutex::new(VecDeque::new()),
        }
    }

    /// Whether recording is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Time since the monitor was created.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Records a handled request and logs it.
    pub fn record(
        &self,
        client_id: &str,
        endpoint: &str,
        status: u16,
        authenticated: bool,
        duration: Duration,
    ) {
        if !self.enabled {
            return;
        }

        let duration_ms = duration.as_secs_f64() * 1000.0;
        if status < 400 {
            tracing::info!(client_id, endpoint, status, authenticated, duration_ms, "Request handled");
        } else {
            tracing::warn!(client_id, endpoint, status, authenticated, duration_ms, "Request rejected");
        }

        let mut records = self.lock();
        records.push_back(RequestRecord {
            timestamp: chrono::Utc::now().to_rfc3339(),
            client_id: client_id.to_string(),
            endpoint: endpoint.to_string(),
            status,
            authenticated,
            duration_ms,
        });
        while records.len() > self.max_records {
            records.pop_front();
        }
    }

    /// Summary statistics over the held records.
    #[must_use]
    pub fn stats(&self) -> MonitorStats {
        let uptime = self.uptime();
        let memory_usage_mb = process_memory_mb();
        let records = self.lock();
        let request_count = records.len();
        let error_count = records.iter().filter(|r| r.status >= 400).count();
        let secs = uptime.as_secs_f64();
        #[allow(clippy::cast_precision_loss)] // record counts are far below 2^52
        let request_rate = if secs > 0.0 {
            (request_count as f64 / secs * 100.0).round() / 100.0
        } else {
            0.0
        };

        MonitorStats {
            monitoring_enabled: self.enabled,
            uptime_secs: uptime.as_secs(),
            request_count,
            error_count,
            request_rate,
            memory_usage_mb,
        }
    }

    /// Logs a one-line summary of [`Monitor::stats`].
    pub fn log_stats(&self) {
        let stats = self.stats();
        tracing::info!(
            uptime_secs = stats.uptime_secs,
            requests = stats.request_count,
            errors = stats.error_count,
            request_rate = stats.request_rate,
            memory_mb = stats.memory_usage_mb.unwrap_or(0.0),
            "Server stats"
        );
    }

    /// Most recent failed requests, newest first.
    #[must_use]
    pub fn recent_errors(&self, limit: usize) -> Vec<RequestRecord> {
        self.lock()
            .iter()
            .rev()
            .filter(|r| r.status >= 400)
            .take(limit)
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<RequestRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[allow(clippy::cast_precision_loss)] // displayed rounded to two places
fn process_memory_mb() -> Option<f64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_memory(),
    );
    sys.process(pid)
        .map(|process| (process.memory() as f64 / BYTES_PER_MIB * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_counts() {
        let monitor = Monitor::new(true, 10);
        monitor.record("1.2.3.4", "/mcp", 200, true, Duration::from_millis(3));
        monitor.record("1.2.3.4", "/mcp", 401, false, Duration::from_millis(1));

        let stats = monitor.stats();
        assert!(stats.monitoring_enabled);
        assert_eq!(stats.request_count, 2);
        assert_eq!(stats.error_count, 1);
    }

    #[test]
    fn stats_report_process_memory() {
        let monitor = Monitor::new(true, 10);
        let memory = monitor.stats().memory_usage_mb.unwrap();
        assert!(memory > 0.0);

        let json = serde_json::to_value(monitor.stats()).unwrap();
        assert!(json["memory_usage_mb"].is_number());

        monitor.log_stats();
    }

    #[test]
    fn history_is_bounded() {
        let monitor = Monitor::new(true, 3);
        for status in [200, 201, 202, 203, 204] {
            monitor.record("c", "/mcp", status, true, Duration::ZERO);
        }
        assert_eq!(monitor.stats().request_count, 3);
    }

    #[test]
    fn recent_errors_newest_first() {
        let monitor = Monitor::new(true, 10);
        monitor.record("c", "/a", 401, false, Duration::ZERO);
        monitor.record("c", "/b", 200, true, Duration::ZERO);
        monitor.record("c", "/c", 429, false, Duration::ZERO);

        let errors = monitor.recent_errors(5);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].endpoint, "/c");
        assert_eq!(errors[1].endpoint, "/a");

        assert_eq!(monitor.recent_errors(1).len(), 1);
    }

    #[test]
    fn disabled_monitor_records_nothing() {
        let monitor = Monitor::new(false, 10);
        monitor.record("c", "/mcp", 500, true, Duration::ZERO);
        let stats = monitor.stats();
        assert!(!stats.monitoring_enabled);
        assert_eq!(stats.request_count, 0);
        assert!(monitor.recent_errors(10).is_empty());
    }
}
