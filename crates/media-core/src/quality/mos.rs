//! Simplified E-model (ITU-T G.107) scoring.

use std::fmt;

use serde::{Deserialize, Serialize};

/// R-factor with no impairments
pub const R_BASELINE: f64 = 93.2;
/// R-factor points lost per percent of packet loss
pub const LOSS_PENALTY_PER_PERCENT: f64 = 2.5;
/// One-way delay above which a delay penalty applies
pub const DELAY_THRESHOLD_MS: f64 = 160.0;
pub const DELAY_PENALTY_PER_MS: f64 = 0.11;
/// Jitter above which a jitter penalty applies
pub const JITTER_THRESHOLD_MS: f64 = 30.0;
pub const JITTER_PENALTY_PER_MS: f64 = 0.5;

pub fn r_factor(loss_percent: f64, latency_ms: f64, jitter_ms: f64) -> f64 {
    let mut r = R_BASELINE - LOSS_PENALTY_PER_PERCENT * loss_percent.max(0.0);
    if latency_ms > DELAY_THRESHOLD_MS {
        r -= DELAY_PENALTY_PER_MS * (latency_ms - DELAY_THRESHOLD_MS);
    }
    if jitter_ms > JITTER_THRESHOLD_MS {
        r -= JITTER_PENALTY_PER_MS * (jitter_ms - JITTER_THRESHOLD_MS);
    }
    r
}

/// Standard R to MOS mapping, clamped to `[1.0, 5.0]`
pub fn mos_from_r(r: f64) -> f64 {
    if r.is_nan() || r <= 0.0 {
        return 1.0;
    }
    if r >= 100.0 {
        return 4.5;
    }
    let mos = 1.0 + 0.035 * r + 7.0e-6 * r * (r - 60.0) * (100.0 - r);
    mos.clamp(1.0, 5.0)
}

pub fn calculate_mos(loss_percent: f64, latency_ms: f64, jitter_ms: f64) -> f64 {
    mos_from_r(r_factor(loss_percent, latency_ms, jitter_ms))
}

/// Quality band for a MOS score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QualityBand {
    Bad,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl QualityBand {
    pub fn from_mos(mos: f64) -> Self {
        if mos >= 4.3 {
            QualityBand::Excellent
        } else if mos >= 4.0 {
            QualityBand::Good
        } else if mos >= 3.6 {
            QualityBand::Fair
        } else if mos >= 3.1 {
            QualityBand::Poor
        } else {
            QualityBand::Bad
        }
    }
}

impl fmt::Display for QualityBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QualityBand::Excellent => "excellent",
            QualityBand::Good => "good",
            QualityBand::Fair => "fair",
            QualityBand::Poor => "poor",
            QualityBand::Bad => "bad",
        };
        f.write_str(s)
    }
}
