//! In-band dual-tone detection.
//!
//! Each frame is run through a Goertzel filter at the eight keypad
//! frequencies. A digit is reported only when the frame is loud enough,
//! the strongest row and column both clear the threshold, and each of them
//! beats every other candidate in its group by the dominance ratio.
//! Detections are debounced across frames so a held key yields one digit.

use std::f64::consts::PI;

use super::DtmfDigit;

pub const ROW_FREQUENCIES: [f64; 4] = [697.0, 770.0, 852.0, 941.0];
pub const COLUMN_FREQUENCIES: [f64; 4] = [1209.0, 1336.0, 1477.0, 1633.0];

const KEYPAD: [[DtmfDigit; 4]; 4] = [
    [DtmfDigit::Digit1, DtmfDigit::Digit2, DtmfDigit::Digit3, DtmfDigit::A],
    [DtmfDigit::Digit4, DtmfDigit::Digit5, DtmfDigit::Digit6, DtmfDigit::B],
    [DtmfDigit::Digit7, DtmfDigit::Digit8, DtmfDigit::Digit9, DtmfDigit::C],
    [DtmfDigit::Star, DtmfDigit::Digit0, DtmfDigit::Pound, DtmfDigit::D],
];

/// Detector tuning
#[derive(Debug, Clone)]
pub struct ToneDetectorConfig {
    pub sample_rate: u32,
    /// Samples per analysis frame (160 = 20 ms at 8 kHz)
    pub frame_size: usize,
    /// Minimum normalized magnitude for the row and column tones
    pub threshold: f64,
    /// Frames quieter than this peak amplitude are treated as silence
    pub energy_floor: i16,
    /// Winner must exceed every other tone in its group by this factor
    pub dominance: f64,
    /// Consecutive frames a digit must persist before it is reported
    pub min_on_frames: u32,
    /// Consecutive non-matching frames that end a press
    pub min_off_frames: u32,
}

impl Default for ToneDetectorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 8000,
            frame_size: 160,
            threshold: 0.02,
            energy_floor: 200,
            dominance: 2.0,
            min_on_frames: 2,
            min_off_frames: 2,
        }
    }
}

/// Goertzel magnitude of `samples` at `frequency`
pub fn goertzel_magnitude(samples: &[i16], frequency: f64, sample_rate: u32) -> f64 {
    let coeff = 2.0 * (2.0 * PI * frequency / sample_rate as f64).cos();
    let (mut s1, mut s2) = (0.0f64, 0.0f64);
    for &x in samples {
        let s0 = x as f64 + coeff * s1 - s2;
        s2 = s1;
        s1 = s0;
    }
    (s1 * s1 + s2 * s2 - coeff * s1 * s2).max(0.0).sqrt()
}

/// Index of the dominant tone in a group, if it clears threshold and ratio
fn dominant(magnitudes: &[f64; 4], threshold: f64, dominance: f64) -> Option<usize> {
    let (best, &peak) = magnitudes
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))?;
    if peak < threshold {
        return None;
    }
    let dominates = magnitudes
        .iter()
        .enumerate()
        .all(|(i, &m)| i == best || peak >= dominance * m);
    dominates.then_some(best)
}

/// Frame-based DTMF detector with debounce
#[derive(Debug)]
pub struct ToneDetector {
    config: ToneDetectorConfig,
    pending: Vec<i16>,
    candidate: Option<DtmfDigit>,
    on_frames: u32,
    off_frames: u32,
    reported: bool,
}

impl ToneDetector {
    pub fn new(config: ToneDetectorConfig) -> Self {
        Self {
            pending: Vec::with_capacity(config.frame_size * 2),
            config,
            candidate: None,
            on_frames: 0,
            off_frames: 0,
            reported: false,
        }
    }

    pub fn config(&self) -> &ToneDetectorConfig {
        &self.config
    }

    /// Classify a single frame without touching debounce state
    pub fn analyze_frame(&self, frame: &[i16]) -> Option<DtmfDigit> {
        if frame.is_empty() {
            return None;
        }
        let peak = frame.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
        if peak < self.config.energy_floor.unsigned_abs() {
            return None;
        }

        let scale = 2.0 / (frame.len() as f64 * 32768.0);
        let measure = |freqs: &[f64; 4]| {
            let mut mags = [0.0; 4];
            for (m, f) in mags.iter_mut().zip(freqs) {
                *m = goertzel_magnitude(frame, *f, self.config.sample_rate) * scale;
            }
            mags
        };
        let rows = measure(&ROW_FREQUENCIES);
        let cols = measure(&COLUMN_FREQUENCIES);

        let row = dominant(&rows, self.config.threshold, self.config.dominance)?;
        let col = dominant(&cols, self.config.threshold, self.config.dominance)?;
        Some(KEYPAD[row][col])
    }

    /// Feed audio of any length; returns digits whose presses began here
    pub fn process(&mut self, samples: &[i16]) -> Vec<DtmfDigit> {
        self.pending.extend_from_slice(samples);
        let frame_size = self.config.frame_size.max(1);
        let mut digits = Vec::new();
        let mut offset = 0;
        while self.pending.len() - offset >= frame_size {
            let detected = self.analyze_frame(&self.pending[offset..offset + frame_size]);
            if let Some(digit) = self.step(detected) {
                digits.push(digit);
            }
            offset += frame_size;
        }
        self.pending.drain(..offset);
        digits
    }

    fn step(&mut self, detected: Option<DtmfDigit>) -> Option<DtmfDigit> {
        match detected {
            Some(digit) => {
                self.off_frames = 0;
                if self.candidate == Some(digit) {
                    self.on_frames += 1;
                } else {
                    self.candidate = Some(digit);
                    self.on_frames = 1;
                    self.reported = false;
                }
                if !self.reported && self.on_frames >= self.config.min_on_frames {
                    self.reported = true;
                    return Some(digit);
                }
                None
            }
            None => {
                self.off_frames += 1;
                if self.off_frames >= self.config.min_off_frames {
                    self.candidate = None;
                    self.on_frames = 0;
                    self.reported = false;
                }
                None
            }
        }
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.candidate = None;
        self.on_frames = 0;
        self.off_frames = 0;
        self.reported = false;
    }
}

/// Synthesize a sum of sine tones, each at `amplitude`
pub fn generate_tone(frequencies: &[f64], sample_rate: u32, samples: usize, amplitude: i16) -> Vec<i16> {
    (0..samples)
        .map(|n| {
            let t = n as f64 / sample_rate as f64;
            let v: f64 = frequencies
                .iter()
                .map(|f| amplitude as f64 * (2.0 * PI * f * t).sin())
                .sum();
            v.clamp(i16::MIN as f64, i16::MAX as f64) as i16
        })
        .collect()
}

/// Synthesize the keypad tone pair for `digit`
pub fn generate_dtmf(digit: DtmfDigit, sample_rate: u32, duration_ms: u32, amplitude: i16) -> Vec<i16> {
    let (row, col) = digit.frequencies();
    let samples = (sample_rate as u64 * duration_ms as u64 / 1000) as usize;
    generate_tone(&[row, col], sample_rate, samples, amplitude)
}
