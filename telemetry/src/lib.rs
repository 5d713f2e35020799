//! Bounded operation telemetry for AI calls.
//!
//! Every AI call is recorded in two phases: [`OperationTracker::start`]
//! appends a placeholder record immediately (so in-flight calls are
//! observable) and [`OperationTracker::complete`] fills in the outcome.
//! Records live in a fixed-capacity ring buffer that evicts the oldest
//! entry when full; aggregates are computed on demand from the buffer.
//!
//! Only content fingerprints and length-based token estimates are stored,
//! never the content itself. Token and cost figures are approximate by
//! contract; a real tokenizer can be injected upstream without changing
//! this crate's interface.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use uuid::Uuid;

/// Default maximum number of records kept in the ring buffer.
pub const DEFAULT_CAPACITY: usize = 500;

/// Error messages are truncated to this length before storage.
const ERROR_MESSAGE_MAX: usize = 500;

/// Hex characters kept from the SHA-256 digest of recorded content.
const FINGERPRINT_LEN: usize = 16;

/// Fallback per-million-token rates (input, output) for unlisted models.
const DEFAULT_RATE: (f64, f64) = (3.0, 15.0);

/// Number of recent errors included in a [`UsageSummary`].
const RECENT_ERROR_COUNT: usize = 10;

/// Outcome of a tracked operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Started but not yet completed.
    Pending,
    Success,
    Error,
}

/// One tracked AI operation.
///
/// Appended as a placeholder on `start` and filled in on `complete`.
/// `input_hash`/`output_hash` are content fingerprints, not content.
#[derive(Debug, Clone, Serialize)]
pub struct OperationRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    /// Operation tag, e.g. "stream_chat" or "vision_analysis".
    pub operation: String,
    pub input_hash: String,
    pub output_hash: Option<String>,
    pub input_tokens_est: u64,
    pub output_tokens_est: u64,
    pub cost_est_usd: f64,
    pub latency_ms: u64,
    pub status: OperationStatus,
    pub error_message: Option<String>,
    /// Free-text origin tag supplied by the caller.
    pub caller: String,
    pub metadata: Option<serde_json::Value>,
}

/// Handle returned by [`OperationTracker::start`], passed back to
/// [`OperationTracker::complete`].
#[derive(Debug, Clone)]
pub struct OperationHandle {
    pub id: String,
    /// Monotonic start time; latency is measured against this, not the
    /// wall-clock record timestamp.
    pub started: Instant,
}

/// Per-model (input, output) USD rates per million tokens.
///
/// Built-in rates cover the catalog models; config may override per model.
/// Unlisted models fall back to [`DEFAULT_RATE`].
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    overrides: BTreeMap<String, (f64, f64)>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the rate for one model.
    pub fn set(&mut self, model: &str, input_rate: f64, output_rate: f64) {
        self.overrides
            .insert(model.to_string(), (input_rate, output_rate));
    }

    /// Resolves the (input, output) rate for a model.
    pub fn rate_for(&self, model: &str) -> (f64, f64) {
        if let Some(rate) = self.overrides.get(model) {
            return *rate;
        }
        builtin_rate(model).unwrap_or(DEFAULT_RATE)
    }
}

/// Built-in per-million-token rates. Pricing drifts; config overrides win
/// over this table.
fn builtin_rate(model: &str) -> Option<(f64, f64)> {
    match model {
        "claude-sonnet-4-5" => Some((3.0, 15.0)),
        "claude-haiku-4-5" => Some((1.0, 5.0)),
        "gpt-4o" => Some((2.5, 10.0)),
        "gpt-4o-mini" => Some((0.15, 0.6)),
        // Self-hosted models carry a nominal amortized-compute rate so cost
        // stays comparable across the fleet.
        _ if model.starts_with("ollama-") => Some((0.05, 0.05)),
        "chambers-mini" => Some((0.05, 0.05)),
        _ => None,
    }
}

/// Length-based token estimate: `ceil(len / 4)`, 0 for empty content.
pub fn estimate_tokens(content: &str) -> u64 {
    (content.len() as u64).div_ceil(4)
}

/// Fixed-length content fingerprint (truncated SHA-256 hex).
///
/// Collision-resistant enough for dedup and debugging; not an identity.
pub fn fingerprint(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut hex = String::with_capacity(FINGERPRINT_LEN);
    for byte in digest.iter().take(FINGERPRINT_LEN / 2) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

fn truncate_message(message: &str) -> String {
    if message.len() <= ERROR_MESSAGE_MAX {
        return message.to_string();
    }
    let mut end = ERROR_MESSAGE_MAX;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &message[..end])
}

/// Aggregate figures for one model or one operation tag.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OpAggregate {
    pub calls: usize,
    pub cost_usd: f64,
    pub mean_latency_ms: f64,
    pub errors: usize,
}

/// One entry in the recent-error list of a [`UsageSummary`].
#[derive(Debug, Clone, Serialize)]
pub struct RecentError {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub operation: String,
    pub message: String,
}

/// Rolling window figures (last 24 hours, filtered at query time).
#[derive(Debug, Clone, Default, Serialize)]
pub struct WindowStats {
    pub calls: usize,
    pub cost_usd: f64,
}

/// On-demand aggregation over the current buffer contents. Never cached.
#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub total_calls: usize,
    pub total_cost_usd: f64,
    pub mean_latency_ms: f64,
    /// Percentage of completed operations that succeeded. 100 when nothing
    /// has completed yet.
    pub success_rate: f64,
    pub by_model: BTreeMap<String, OpAggregate>,
    pub by_operation: BTreeMap<String, OpAggregate>,
    /// Most recent errors, newest first.
    pub recent_errors: Vec<RecentError>,
    pub last_24h: WindowStats,
}

/// Thread-safe lifecycle recorder for AI operations.
#[derive(Clone)]
pub struct OperationTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    records: Mutex<VecDeque<OperationRecord>>,
    capacity: usize,
    rates: RateTable,
}

impl Default for OperationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationTracker {
    /// Creates a tracker with the default capacity and rate table.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, RateTable::new())
    }

    /// Creates a tracker with an explicit capacity and rate table.
    pub fn with_capacity(capacity: usize, rates: RateTable) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                records: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                rates,
            }),
        }
    }

    /// Starts tracking an operation and appends a placeholder record.
    ///
    /// The record is visible to [`Self::query`] immediately, before the
    /// operation completes.
    pub fn start(
        &self,
        provider: &str,
        model: &str,
        operation: &str,
        input: &str,
        caller: &str,
        metadata: Option<serde_json::Value>,
    ) -> OperationHandle {
        let id = Uuid::new_v4().to_string();
        let record = OperationRecord {
            id: id.clone(),
            timestamp: Utc::now(),
            provider: provider.to_string(),
            model: model.to_string(),
            operation: operation.to_string(),
            input_hash: fingerprint(input),
            output_hash: None,
            input_tokens_est: estimate_tokens(input),
            output_tokens_est: 0,
            cost_est_usd: 0.0,
            latency_ms: 0,
            status: OperationStatus::Pending,
            error_message: None,
            caller: caller.to_string(),
            metadata,
        };

        let mut records = self.lock();
        records.push_back(record);
        while records.len() > self.inner.capacity {
            records.pop_front();
        }

        OperationHandle {
            id,
            started: Instant::now(),
        }
    }

    /// Completes a tracked operation.
    ///
    /// If the record has already been evicted this is a silent no-op:
    /// telemetry under sustained overload is lossy by choice.
    pub fn complete(
        &self,
        handle: &OperationHandle,
        output: &str,
        status: OperationStatus,
        error_message: Option<&str>,
    ) {
        let latency_ms = handle.started.elapsed().as_millis() as u64;
        let output_tokens = estimate_tokens(output);
        let output_hash = fingerprint(output);

        let mut records = self.lock();
        let Some(record) = records.iter_mut().find(|r| r.id == handle.id) else {
            tracing::debug!(id = %handle.id, "operation record evicted before completion");
            return;
        };

        let (input_rate, output_rate) = self.inner.rates.rate_for(&record.model);
        record.output_hash = Some(output_hash);
        record.output_tokens_est = output_tokens;
        record.latency_ms = latency_ms;
        record.cost_est_usd = (record.input_tokens_est as f64 * input_rate
            + output_tokens as f64 * output_rate)
            / 1_000_000.0;
        record.status = status;
        record.error_message = error_message.map(truncate_message);
    }

    /// Returns up to `limit` records, newest first, skipping `offset`.
    /// A non-positive `limit` returns an empty list.
    pub fn query(&self, limit: isize, offset: usize) -> Vec<OperationRecord> {
        if limit <= 0 {
            return Vec::new();
        }
        let records = self.lock();
        records
            .iter()
            .rev()
            .skip(offset)
            .take(limit as usize)
            .cloned()
            .collect()
    }

    /// Number of records currently buffered.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Computes aggregates over the current buffer. Not cached.
    pub fn summarize(&self) -> UsageSummary {
        #[derive(Default)]
        struct Acc {
            calls: usize,
            cost_usd: f64,
            latency_sum: u64,
            completed: usize,
            errors: usize,
        }

        impl Acc {
            fn push(&mut self, record: &OperationRecord) {
                self.calls += 1;
                self.cost_usd += record.cost_est_usd;
                match record.status {
                    OperationStatus::Success => {
                        self.completed += 1;
                        self.latency_sum += record.latency_ms;
                    }
                    OperationStatus::Error => {
                        self.completed += 1;
                        self.latency_sum += record.latency_ms;
                        self.errors += 1;
                    }
                    OperationStatus::Pending => {}
                }
            }

            fn finish(self) -> OpAggregate {
                OpAggregate {
                    calls: self.calls,
                    cost_usd: self.cost_usd,
                    mean_latency_ms: if self.completed > 0 {
                        self.latency_sum as f64 / self.completed as f64
                    } else {
                        0.0
                    },
                    errors: self.errors,
                }
            }
        }

        let records = self.lock();

        let total_calls = records.len();
        let mut totals = Acc::default();
        let mut by_model: BTreeMap<String, Acc> = BTreeMap::new();
        let mut by_operation: BTreeMap<String, Acc> = BTreeMap::new();
        let mut window = WindowStats::default();

        let cutoff = Utc::now() - Duration::hours(24);

        for record in records.iter() {
            totals.push(record);
            by_model.entry(record.model.clone()).or_default().push(record);
            by_operation
                .entry(record.operation.clone())
                .or_default()
                .push(record);

            if record.timestamp >= cutoff {
                window.calls += 1;
                window.cost_usd += record.cost_est_usd;
            }
        }

        let recent_errors = records
            .iter()
            .rev()
            .filter(|r| r.status == OperationStatus::Error)
            .take(RECENT_ERROR_COUNT)
            .map(|r| RecentError {
                timestamp: r.timestamp,
                model: r.model.clone(),
                operation: r.operation.clone(),
                message: r.error_message.clone().unwrap_or_default(),
            })
            .collect();

        let success_rate = if totals.completed > 0 {
            (totals.completed - totals.errors) as f64 / totals.completed as f64 * 100.0
        } else {
            100.0
        };
        let mean_latency_ms = if totals.completed > 0 {
            totals.latency_sum as f64 / totals.completed as f64
        } else {
            0.0
        };

        UsageSummary {
            total_calls,
            total_cost_usd: totals.cost_usd,
            mean_latency_ms,
            success_rate,
            by_model: by_model.into_iter().map(|(k, v)| (k, v.finish())).collect(),
            by_operation: by_operation
                .into_iter()
                .map(|(k, v)| (k, v.finish()))
                .collect(),
            recent_errors,
            last_24h: window,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<OperationRecord>> {
        match self.inner.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
