use ahash::AHashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

// ---------------------------------------------------------------------------
// Metric names
// ---------------------------------------------------------------------------

/// Finished clones, labelled `status` = `completed` | `failed`.
pub const CLONES_TOTAL: &str = "gitfleet_clones_total";
/// Clones currently holding a worker slot.
pub const CLONES_IN_FLIGHT: &str = "gitfleet_clones_in_flight";
/// Wall time of each clone attempt.
pub const CLONE_DURATION_SECONDS: &str = "gitfleet_clone_duration_seconds";
/// Blamed files, labelled `status` = `ok` | `error`.
pub const BLAME_FILES_TOTAL: &str = "gitfleet_blame_files_total";
/// Extracted commits.
pub const COMMITS_EXTRACTED_TOTAL: &str = "gitfleet_commits_extracted_total";
/// Selections that found every token exhausted, labelled `provider`.
pub const TOKEN_EXHAUSTED_TOTAL: &str = "gitfleet_token_exhausted_total";
/// Tokens dropped after the provider refused them, labelled `provider`.
pub const TOKEN_REJECTED_TOTAL: &str = "gitfleet_token_rejected_total";

// ---------------------------------------------------------------------------
// Histogram
// ---------------------------------------------------------------------------

/// A histogram that tracks the distribution of observed values across buckets.
#[derive(Debug)]
pub struct Histogram {
    pub buckets: Vec<f64>,
    pub counts: Vec<AtomicU64>,
    pub sum: AtomicU64,
    pub count: AtomicU64,
}

impl Histogram {
    pub fn new(buckets: Vec<f64>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        // f64 sum stored as bits.
        let _ = self
            .sum
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some((f64::from_bits(current) + value).to_bits())
            });
        for (i, boundary) in self.buckets.iter().enumerate() {
            if value <= *boundary {
                self.counts[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn get_sum(&self) -> f64 {
        f64::from_bits(self.sum.load(Ordering::Relaxed))
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Clone and blame durations span milliseconds to many minutes.
fn default_duration_buckets() -> Vec<f64> {
    vec![
        0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0,
    ]
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// Sorted key=value pairs distinguishing series of one counter family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Labels(Vec<(String, String)>);

impl Labels {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        let mut v: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        v.sort_by(|a, b| a.0.cmp(&b.0));
        Self(v)
    }

    /// `{key="value",key2="value2"}`, or empty when there are no labels.
    pub fn prometheus_str(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        let inner: Vec<String> = self
            .0
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v.replace('\\', "\\\\").replace('"', "\\\"")))
            .collect();
        format!("{{{}}}", inner.join(","))
    }
}

// ---------------------------------------------------------------------------
// MetricsCollector
// ---------------------------------------------------------------------------

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Counters, gauges and histograms behind interior mutability. Registration
/// takes a write lock once per series; updates are atomic.
#[derive(Debug)]
pub struct MetricsCollector {
    counters: RwLock<AHashMap<(String, Labels), AtomicU64>>,
    gauges: RwLock<AHashMap<String, AtomicI64>>,
    histograms: RwLock<AHashMap<String, Histogram>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(AHashMap::new()),
            gauges: RwLock::new(AHashMap::new()),
            histograms: RwLock::new(AHashMap::new()),
        }
    }

    /// A collector with the fleet series pre-registered so they export as 0.
    pub fn with_defaults() -> Self {
        let collector = Self::new();
        write(&collector.histograms).insert(
            CLONE_DURATION_SECONDS.to_string(),
            Histogram::new(default_duration_buckets()),
        );
        write(&collector.gauges).insert(CLONES_IN_FLIGHT.to_string(), AtomicI64::new(0));
        collector
    }

    // -- Counters -----------------------------------------------------------

    pub fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        self.increment_counter_by(name, labels, 1);
    }

    pub fn increment_counter_by(&self, name: &str, labels: &[(&str, &str)], amount: u64) {
        let key = (name.to_string(), Labels::new(labels));
        {
            let map = read(&self.counters);
            if let Some(c) = map.get(&key) {
                c.fetch_add(amount, Ordering::Relaxed);
                return;
            }
        }
        write(&self.counters)
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(amount, Ordering::Relaxed);
    }

    pub fn get_counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = (name.to_string(), Labels::new(labels));
        read(&self.counters)
            .get(&key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    // -- Gauges -------------------------------------------------------------

    pub fn set_gauge(&self, name: &str, value: i64) {
        self.with_gauge(name, |g| g.store(value, Ordering::Relaxed));
    }

    /// Add `delta` (possibly negative) to a gauge.
    pub fn add_gauge(&self, name: &str, delta: i64) {
        self.with_gauge(name, |g| {
            g.fetch_add(delta, Ordering::Relaxed);
        });
    }

    fn with_gauge(&self, name: &str, f: impl FnOnce(&AtomicI64)) {
        {
            let map = read(&self.gauges);
            if let Some(g) = map.get(name) {
                f(g);
                return;
            }
        }
        let mut map = write(&self.gauges);
        f(map
            .entry(name.to_string())
            .or_insert_with(|| AtomicI64::new(0)));
    }

    pub fn get_gauge(&self, name: &str) -> i64 {
        read(&self.gauges)
            .get(name)
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    // -- Histograms ---------------------------------------------------------

    /// Record a value. Unknown histograms get the default duration buckets.
    pub fn record_histogram(&self, name: &str, value: f64) {
        {
            let map = read(&self.histograms);
            if let Some(h) = map.get(name) {
                h.observe(value);
                return;
            }
        }
        write(&self.histograms)
            .entry(name.to_string())
            .or_insert_with(|| Histogram::new(default_duration_buckets()))
            .observe(value);
    }

    pub fn histogram_count(&self, name: &str) -> u64 {
        read(&self.histograms)
            .get(name)
            .map(Histogram::get_count)
            .unwrap_or(0)
    }

    // -- Export --------------------------------------------------------------

    /// Export all metrics in Prometheus text exposition format.
    pub fn export_prometheus(&self) -> String {
        let mut out = String::new();

        {
            let map = read(&self.counters);
            let mut grouped: AHashMap<&str, Vec<(&Labels, u64)>> = AHashMap::new();
            for ((name, labels), val) in map.iter() {
                grouped
                    .entry(name.as_str())
                    .or_default()
                    .push((labels, val.load(Ordering::Relaxed)));
            }
            let mut names: Vec<&str> = grouped.keys().copied().collect();
            names.sort_unstable();
            for name in names {
                out.push_str(&format!("# TYPE {} counter\n", name));
                let mut entries = grouped[name].clone();
                entries.sort_by_key(|(labels, _)| labels.prometheus_str());
                for (labels, value) in entries {
                    out.push_str(&format!("{}{} {}\n", name, labels.prometheus_str(), value));
                }
            }
        }

        {
            let map = read(&self.gauges);
            let mut names: Vec<&String> = map.keys().collect();
            names.sort();
            for name in names {
                let val = map[name].load(Ordering::Relaxed);
                out.push_str(&format!("# TYPE {} gauge\n{} {}\n", name, name, val));
            }
        }

        {
            let map = read(&self.histograms);
            let mut names: Vec<&String> = map.keys().collect();
            names.sort();
            for name in names {
                let h = &map[name];
                out.push_str(&format!("# TYPE {} histogram\n", name));
                // observe() already counts a value in every bucket it fits.
                for (i, boundary) in h.buckets.iter().enumerate() {
                    out.push_str(&format!(
                        "{}_bucket{{le=\"{}\"}} {}\n",
                        name,
                        boundary,
                        h.counts[i].load(Ordering::Relaxed)
                    ));
                }
                out.push_str(&format!("{}_bucket{{le=\"+Inf\"}} {}\n", name, h.get_count()));
                out.push_str(&format!("{}_sum {}\n", name, h.get_sum()));
                out.push_str(&format!("{}_count {}\n", name, h.get_count()));
            }
        }

        out
    }

    /// Export all metrics as a JSON value.
    pub fn export_json(&self) -> serde_json::Value {
        let mut counters_json = serde_json::Map::new();
        for ((name, labels), val) in read(&self.counters).iter() {
            counters_json.insert(
                format!("{}{}", name, labels.prometheus_str()),
                serde_json::json!(val.load(Ordering::Relaxed)),
            );
        }

        let mut gauges_json = serde_json::Map::new();
        for (name, val) in read(&self.gauges).iter() {
            gauges_json.insert(name.clone(), serde_json::json!(val.load(Ordering::Relaxed)));
        }

        let mut histograms_json = serde_json::Map::new();
        for (name, h) in read(&self.histograms).iter() {
            histograms_json.insert(
                name.clone(),
                serde_json::json!({ "sum": h.get_sum(), "count": h.get_count() }),
            );
        }

        serde_json::json!({
            "counters": counters_json,
            "gauges": gauges_json,
            "histograms": histograms_json,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ---------------------------------------------------------------------------
// Global singleton
// ---------------------------------------------------------------------------

/// Process-wide collector shared by every crate in the workspace.
pub fn global_metrics() -> &'static MetricsCollector {
    use std::sync::OnceLock;
    static INSTANCE: OnceLock<MetricsCollector> = OnceLock::new();
    INSTANCE.get_or_init(MetricsCollector::with_defaults)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_increment() {
        let m = MetricsCollector::new();
        m.increment_counter(CLONES_TOTAL, &[("status", "completed")]);
        m.increment_counter(CLONES_TOTAL, &[("status", "completed")]);
        m.increment_counter(CLONES_TOTAL, &[("status", "failed")]);

        assert_eq!(m.get_counter(CLONES_TOTAL, &[("status", "completed")]), 2);
        assert_eq!(m.get_counter(CLONES_TOTAL, &[("status", "failed")]), 1);
        assert_eq!(m.get_counter(CLONES_TOTAL, &[("status", "queued")]), 0);
    }

    #[test]
    fn test_gauge_add_and_set() {
        let m = MetricsCollector::new();
        m.add_gauge(CLONES_IN_FLIGHT, 3);
        m.add_gauge(CLONES_IN_FLIGHT, -1);
        assert_eq!(m.get_gauge(CLONES_IN_FLIGHT), 2);
        m.set_gauge(CLONES_IN_FLIGHT, 0);
        assert_eq!(m.get_gauge(CLONES_IN_FLIGHT), 0);
    }

    #[test]
    fn test_histogram_buckets_are_cumulative() {
        let h = Histogram::new(vec![1.0, 10.0]);
        h.observe(0.5);
        h.observe(5.0);
        h.observe(50.0);
        assert_eq!(h.counts[0].load(Ordering::Relaxed), 1);
        assert_eq!(h.counts[1].load(Ordering::Relaxed), 2);
        assert_eq!(h.get_count(), 3);
        assert!((h.get_sum() - 55.5).abs() < 1e-9);
    }

    #[test]
    fn test_prometheus_export() {
        let m = MetricsCollector::with_defaults();
        m.increment_counter(TOKEN_EXHAUSTED_TOTAL, &[("provider", "GitHub")]);
        m.record_histogram(CLONE_DURATION_SECONDS, 0.2);

        let text = m.export_prometheus();
        assert!(text.contains("# TYPE gitfleet_token_exhausted_total counter"));
        assert!(text.contains("gitfleet_token_exhausted_total{provider=\"GitHub\"} 1"));
        assert!(text.contains("# TYPE gitfleet_clones_in_flight gauge"));
        assert!(text.contains("gitfleet_clone_duration_seconds_bucket{le=\"0.5\"} 1"));
        assert!(text.contains("gitfleet_clone_duration_seconds_count 1"));
    }

    #[test]
    fn test_label_values_are_escaped() {
        let labels = Labels::new(&[("path", "a\"b")]);
        assert_eq!(labels.prometheus_str(), "{path=\"a\\\"b\"}");
    }

    #[test]
    fn test_json_export_shape() {
        let m = MetricsCollector::new();
        m.increment_counter(BLAME_FILES_TOTAL, &[("status", "ok")]);
        let json = m.export_json();
        assert_eq!(json["counters"]["gitfleet_blame_files_total{status=\"ok\"}"], 1);
    }
}
