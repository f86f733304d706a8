//! Bounded store of finalized summaries and raised alerts.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::alerts::QualityAlert;
use super::monitor::QualitySummary;

/// Aggregate view over the retained history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityAggregate {
    /// Distinct calls with at least one retained summary
    pub calls: usize,
    pub summaries: usize,
    pub mean_mos: f64,
    pub min_mos: f64,
    /// Percentage of those calls with any retained alert
    pub percent_calls_with_alerts: f64,
}

#[derive(Debug, Clone)]
pub struct QualityHistory {
    summaries: VecDeque<QualitySummary>,
    alerts: VecDeque<QualityAlert>,
    capacity: usize,
    alert_capacity: usize,
}

impl QualityHistory {
    pub fn new(capacity: usize, alert_capacity: usize) -> Self {
        Self {
            summaries: VecDeque::new(),
            alerts: VecDeque::new(),
            capacity: capacity.max(1),
            alert_capacity: alert_capacity.max(1),
        }
    }

    pub fn record_summary(&mut self, summary: QualitySummary) {
        if self.summaries.len() == self.capacity {
            self.summaries.pop_front();
        }
        self.summaries.push_back(summary);
    }

    pub fn record_alert(&mut self, alert: QualityAlert) {
        if self.alerts.len() == self.alert_capacity {
            self.alerts.pop_front();
        }
        self.alerts.push_back(alert);
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    /// Newest first
    pub fn recent(&self, limit: usize) -> Vec<&QualitySummary> {
        self.summaries.iter().rev().take(limit).collect()
    }

    /// Summaries scoring at least `min_mos`, newest first
    pub fn with_min_score(&self, min_mos: f64) -> Vec<&QualitySummary> {
        self.summaries
            .iter()
            .rev()
            .filter(|s| s.metrics.mos >= min_mos)
            .collect()
    }

    pub fn for_call(&self, call_id: &str) -> Vec<&QualitySummary> {
        self.summaries.iter().filter(|s| s.call_id == call_id).collect()
    }

    /// Newest first
    pub fn recent_alerts(&self, limit: usize) -> Vec<&QualityAlert> {
        self.alerts.iter().rev().take(limit).collect()
    }

    pub fn aggregate(&self) -> QualityAggregate {
        if self.summaries.is_empty() {
            return QualityAggregate::default();
        }
        let calls: HashSet<&str> = self.summaries.iter().map(|s| s.call_id.as_str()).collect();
        let alerted: HashSet<&str> = self.alerts.iter().map(|a| a.call_id.as_str()).collect();
        let with_alerts = calls.iter().filter(|c| alerted.contains(*c)).count();

        let total: f64 = self.summaries.iter().map(|s| s.metrics.mos).sum();
        let min_mos = self
            .summaries
            .iter()
            .map(|s| s.metrics.mos)
            .fold(f64::INFINITY, f64::min);

        QualityAggregate {
            calls: calls.len(),
            summaries: self.summaries.len(),
            mean_mos: total / self.summaries.len() as f64,
            min_mos,
            percent_calls_with_alerts: with_alerts as f64 * 100.0 / calls.len() as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::alerts::QualityThresholds;
    use crate::quality::monitor::QualityMetrics;
    use crate::quality::QualityBand;
    use crate::relay::LegSide;
    use chrono::Utc;

    fn summary(call_id: &str, leg: LegSide, mos: f64) -> QualitySummary {
        let metrics = QualityMetrics {
            packets_received: 10,
            mos,
            ..Default::default()
        };
        QualitySummary {
            call_id: call_id.to_string(),
            leg,
            started_at: Utc::now(),
            ended_at: Utc::now(),
            band: QualityBand::from_mos(mos),
            metrics,
        }
    }

    #[test]
    fn capacity_is_bounded() {
        let mut h = QualityHistory::new(3, 2);
        for i in 0..5 {
            h.record_summary(summary(&format!("call-{}", i), LegSide::A, 4.0));
        }
        assert_eq!(h.len(), 3);
        let recent: Vec<&str> = h.recent(2).iter().map(|s| s.call_id.as_str()).collect();
        assert_eq!(recent, vec!["call-4", "call-3"]);
    }

    #[test]
    fn query_by_score() {
        let mut h = QualityHistory::new(10, 10);
        h.record_summary(summary("a", LegSide::A, 4.4));
        h.record_summary(summary("a", LegSide::B, 3.0));
        h.record_summary(summary("b", LegSide::A, 4.1));
        let good: Vec<f64> = h.with_min_score(4.0).iter().map(|s| s.metrics.mos).collect();
        assert_eq!(good, vec![4.1, 4.4]);
        assert_eq!(h.for_call("a").len(), 2);
    }

    #[test]
    fn aggregate_counts_alerted_calls() {
        let mut h = QualityHistory::new(10, 10);
        h.record_summary(summary("a", LegSide::A, 4.4));
        h.record_summary(summary("a", LegSide::B, 2.0));
        h.record_summary(summary("b", LegSide::A, 4.2));
        let bad = summary("a", LegSide::B, 2.0);
        for alert in QualityThresholds::default().evaluate("a", LegSide::B, &bad.metrics) {
            h.record_alert(alert);
        }
        let agg = h.aggregate();
        assert_eq!(agg.calls, 2);
        assert_eq!(agg.summaries, 3);
        assert!((agg.mean_mos - 3.5333).abs() < 1e-3);
        assert_eq!(agg.min_mos, 2.0);
        assert_eq!(agg.percent_calls_with_alerts, 50.0);
        assert_eq!(h.recent_alerts(5).len(), 1);
    }
}
