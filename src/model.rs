// Domain and wire types shared across the orchestrator
//
// These are the shapes that cross component boundaries: samples flowing from
// health checkers into the aggregator, summaries flowing into the store and
// back out through /stats, and the registration payloads exchanged with
// sidecars. Field names match the JSON contract exactly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of resource metrics reported by sidecars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricId {
    Cpu,
    Mem,
    Threads,
    NumGoroutines,
}

impl MetricId {
    /// All metrics, in the order rollup passes iterate them.
    pub const ALL: [MetricId; 4] = [
        MetricId::Cpu,
        MetricId::Mem,
        MetricId::Threads,
        MetricId::NumGoroutines,
    ];

    /// Stable string form used in the store and in query parameters.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricId::Cpu => "cpu",
            MetricId::Mem => "mem",
            MetricId::Threads => "threads",
            MetricId::NumGoroutines => "num_goroutines",
        }
    }
}

impl FromStr for MetricId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(MetricId::Cpu),
            "mem" => Ok(MetricId::Mem),
            "threads" => Ok(MetricId::Threads),
            "num_goroutines" => Ok(MetricId::NumGoroutines),
            _ => Err(()),
        }
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one polled endpoint.
///
/// Equality is over all three fields, but the registry treats
/// `(service_name, control_address)` as the identity: at most one live
/// health checker exists per pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registrant {
    pub control_address: String,
    pub data_address: String,
    pub service_name: String,
}

impl Registrant {
    pub fn new(service_name: &str, control_address: &str, data_address: &str) -> Self {
        Self {
            control_address: control_address.to_string(),
            data_address: data_address.to_string(),
            service_name: service_name.to_string(),
        }
    }
}

impl fmt::Display for Registrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] control={} data={}",
            self.service_name, self.control_address, self.data_address
        )
    }
}

/// One raw telemetry reading, immutable once emitted.
#[derive(Debug, Clone)]
pub struct Sample {
    pub metric_id: MetricId,
    pub ts: DateTime<Utc>,
    pub service_id: String,
    pub value: f64,
}

/// Min/max/mean accumulator for one (service, metric) key.
///
/// The same struct serves as the in-memory running summary and as the
/// persisted row; `count` is in-memory bookkeeping only and is never written
/// to the store (rows scanned back carry `val = 0`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub metric_id: MetricId,
    #[serde(rename = "time")]
    pub ts: DateTime<Utc>,
    pub service_id: String,
    pub max: f64,
    pub min: f64,
    pub avg: f64,
    #[serde(rename = "val")]
    pub count: u64,
}

impl Summary {
    /// Seed a summary from its first value. The timestamp anchors the bucket
    /// and is never updated by later folds.
    pub fn seed(metric_id: MetricId, service_id: &str, ts: DateTime<Utc>, value: f64) -> Self {
        Self {
            metric_id,
            ts,
            service_id: service_id.to_string(),
            max: value,
            min: value,
            avg: value,
            count: 1,
        }
    }

    /// Fold one more observation into the summary.
    ///
    /// `value` feeds the running mean; `min`/`max` are merged separately so
    /// the rollup engine can fold pre-aggregated rows (avg as the value, the
    /// row's own min/max as the extremes). Raw samples pass the same number
    /// for all three.
    pub fn fold(&mut self, value: f64, min: f64, max: f64) {
        self.avg = (value + self.count as f64 * self.avg) / (self.count as f64 + 1.0);
        self.count += 1;
        if self.min > min {
            self.min = min;
        }
        if self.max < max {
            self.max = max;
        }
    }
}

/// One entry in a sidecar's health reply: every resource metric at a single
/// instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostStats {
    #[serde(rename = "time")]
    pub ts: DateTime<Utc>,
    pub service_id: String,
    pub cpu: f64,
    pub mem: f64,
    pub threads: f64,
    pub num_goroutines: f64,
}

impl HostStats {
    /// Expand into one sample per metric id.
    pub fn samples(&self) -> Vec<Sample> {
        MetricId::ALL
            .iter()
            .map(|&metric_id| Sample {
                metric_id,
                ts: self.ts,
                service_id: self.service_id.clone(),
                value: match metric_id {
                    MetricId::Cpu => self.cpu,
                    MetricId::Mem => self.mem,
                    MetricId::Threads => self.threads,
                    MetricId::NumGoroutines => self.num_goroutines,
                },
            })
            .collect()
    }
}

/// Body returned by `GET {control_address}/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatReply {
    pub stats: Vec<HostStats>,
}

/// Body of `POST /register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub control_address: String,
    pub data_address: String,
    pub service_name: String,
}

/// Body of the `/register` response. `code` is 0 on success, 1 on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub code: u8,
    pub err_message: String,
}

impl RegisterResponse {
    pub fn success() -> Self {
        Self {
            code: 0,
            err_message: String::new(),
        }
    }

    pub fn failed(message: &str) -> Self {
        Self {
            code: 1,
            err_message: message.to_string(),
        }
    }
}

/// Body of `GET /services`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfos {
    pub services: Vec<ServiceInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service_name: String,
    pub registrants: Vec<Registrant>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn metric_id_string_forms_round_trip() {
        for metric in MetricId::ALL {
            assert_eq!(MetricId::from_str(metric.as_str()), Ok(metric));
            // serde uses the same snake_case names as as_str()
            let json = serde_json::to_string(&metric).unwrap();
            assert_eq!(json, format!("\"{}\"", metric.as_str()));
        }
        assert!(MetricId::from_str("disk").is_err());
    }

    #[test]
    fn registrant_json_preserves_all_fields() {
        let registrant = Registrant::new("echo", "http://127.0.0.1:9001", "http://127.0.0.1:10010");
        let json = serde_json::to_string(&registrant).unwrap();
        let parsed: Registrant = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, registrant);
        assert!(json.contains("\"control_address\":\"http://127.0.0.1:9001\""));
        assert!(json.contains("\"service_name\":\"echo\""));
    }

    #[test]
    fn fold_tracks_true_mean_and_extremes() {
        let ts = Utc.timestamp_opt(1_000, 0).unwrap();
        let mut summary = Summary::seed(MetricId::Cpu, "s", ts, 10.0);
        for v in [20.0, 30.0, 40.0] {
            summary.fold(v, v, v);
        }
        assert_eq!(summary.count, 4);
        assert_eq!(summary.min, 10.0);
        assert_eq!(summary.max, 40.0);
        assert!((summary.avg - 25.0).abs() < 1e-9);
        assert!(summary.min <= summary.avg && summary.avg <= summary.max);
        // the timestamp anchors the first sample and never moves
        assert_eq!(summary.ts, ts);
    }

    #[test]
    fn fold_merges_pre_aggregated_extremes() {
        let ts = Utc.timestamp_opt(0, 0).unwrap();
        let mut summary = Summary::seed(MetricId::Mem, "s", ts, 15.0);
        summary.min = 15.0;
        summary.max = 15.0;
        // a row with avg=25 but wider extremes
        summary.fold(25.0, 5.0, 90.0);
        assert_eq!(summary.min, 5.0);
        assert_eq!(summary.max, 90.0);
        assert!((summary.avg - 20.0).abs() < 1e-9);
    }

    #[test]
    fn host_stats_expand_to_one_sample_per_metric() {
        let stats = HostStats {
            ts: Utc.timestamp_opt(100, 0).unwrap(),
            service_id: "echo-1".to_string(),
            cpu: 1.0,
            mem: 2.0,
            threads: 3.0,
            num_goroutines: 4.0,
        };
        let samples = stats.samples();
        assert_eq!(samples.len(), 4);
        let cpu = samples
            .iter()
            .find(|s| s.metric_id == MetricId::Cpu)
            .unwrap();
        assert_eq!(cpu.value, 1.0);
        assert_eq!(cpu.service_id, "echo-1");
        let goroutines = samples
            .iter()
            .find(|s| s.metric_id == MetricId::NumGoroutines)
            .unwrap();
        assert_eq!(goroutines.value, 4.0);
    }

    #[test]
    fn heartbeat_reply_decodes_sidecar_shape() {
        let body = r#"{"stats":[{"time":"2024-03-01T12:00:00Z","service_id":"echo-1",
            "cpu":12.5,"mem":80.0,"threads":14.0,"num_goroutines":42.0}]}"#;
        let reply: HeartbeatReply = serde_json::from_str(body).unwrap();
        assert_eq!(reply.stats.len(), 1);
        assert_eq!(reply.stats[0].cpu, 12.5);
    }

    #[test]
    fn summary_serializes_with_wire_field_names() {
        let summary = Summary::seed(
            MetricId::Cpu,
            "s",
            Utc.timestamp_opt(120, 0).unwrap(),
            25.0,
        );
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"metric_id\":\"cpu\""));
        assert!(json.contains("\"time\":"));
        assert!(json.contains("\"val\":1"));
        assert!(json.contains("\"avg\":25.0"));
    }
}
