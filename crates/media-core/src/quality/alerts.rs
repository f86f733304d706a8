//! Threshold checks over quality metrics. Alerts are records, never actions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use switchboard_infra_common::config::QualitySection;

use super::mos::QualityBand;
use super::monitor::QualityMetrics;
use crate::relay::LegSide;

/// Alert thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    pub min_mos: f64,
    pub max_loss_percent: f64,
    pub max_jitter_ms: f64,
    pub max_latency_ms: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self::from(&QualitySection::default())
    }
}

impl From<&QualitySection> for QualityThresholds {
    fn from(section: &QualitySection) -> Self {
        Self {
            min_mos: section.min_mos,
            max_loss_percent: section.max_loss_percent,
            max_jitter_ms: section.max_jitter_ms,
            max_latency_ms: section.max_latency_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertType {
    LowMos,
    HighPacketLoss,
    HighJitter,
    HighLatency,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertType::LowMos => "low MOS",
            AlertType::HighPacketLoss => "high packet loss",
            AlertType::HighJitter => "high jitter",
            AlertType::HighLatency => "high latency",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// One threshold breach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAlert {
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub call_id: String,
    pub leg: LegSide,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
}

impl QualityThresholds {
    /// Compare metrics against every threshold; one alert per breach.
    ///
    /// A breach of at least twice a ceiling (or a MOS in the bad band) is
    /// critical. Directions that have received nothing are not scored.
    pub fn evaluate(&self, call_id: &str, leg: LegSide, metrics: &QualityMetrics) -> Vec<QualityAlert> {
        let mut alerts = Vec::new();
        if metrics.packets_received == 0 {
            return alerts;
        }
        let now = Utc::now();
        let mut raise = |alert_type: AlertType, severity: AlertSeverity, value: f64, threshold: f64| {
            alerts.push(QualityAlert {
                alert_type,
                severity,
                call_id: call_id.to_string(),
                leg,
                message: format!(
                    "{} on leg {} of call {}: {:.2} (threshold {:.2})",
                    alert_type, leg, call_id, value, threshold
                ),
                value,
                threshold,
                timestamp: now,
            });
        };
        let ceiling = |value: f64, max: f64| {
            if value >= max * 2.0 {
                AlertSeverity::Critical
            } else {
                AlertSeverity::Warning
            }
        };

        if metrics.mos < self.min_mos {
            let severity = if QualityBand::from_mos(metrics.mos) == QualityBand::Bad {
                AlertSeverity::Critical
            } else {
                AlertSeverity::Warning
            };
            raise(AlertType::LowMos, severity, metrics.mos, self.min_mos);
        }
        if metrics.loss_percent > self.max_loss_percent {
            raise(
                AlertType::HighPacketLoss,
                ceiling(metrics.loss_percent, self.max_loss_percent),
                metrics.loss_percent,
                self.max_loss_percent,
            );
        }
        if metrics.jitter_ms > self.max_jitter_ms {
            raise(
                AlertType::HighJitter,
                ceiling(metrics.jitter_ms, self.max_jitter_ms),
                metrics.jitter_ms,
                self.max_jitter_ms,
            );
        }
        if metrics.latency_ms > self.max_latency_ms {
            raise(
                AlertType::HighLatency,
                ceiling(metrics.latency_ms, self.max_latency_ms),
                metrics.latency_ms,
                self.max_latency_ms,
            );
        }
        alerts
    }
}
