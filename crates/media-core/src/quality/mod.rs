//! Call quality: per-direction monitors, MOS scoring, alerts and history.

pub mod alerts;
pub mod history;
pub mod monitor;
pub mod mos;

pub use alerts::{AlertSeverity, AlertType, QualityAlert, QualityThresholds};
pub use history::{QualityAggregate, QualityHistory};
pub use monitor::{QualityMetrics, QualityMonitor, QualitySummary, SampleWindow};
pub use mos::{calculate_mos, mos_from_r, r_factor, QualityBand};
