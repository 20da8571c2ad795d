//! Spoof classifiers.
//!
//! The classifiers are stateless: the engine owns the history buffers and
//! lends them out read-only to the dynamics classifier.

use crate::config::LivenessConfig;
use crate::history::HistoryBuffer;
use crate::verdict::{
    Decision, LivenessStatus, REASON_BLINK_FAIL, REASON_COLLECTING, REASON_LIVE,
    REASON_MOVEMENT_FAIL, REASON_REPLAY, REASON_STATIC_IMAGE, REASON_WARMING_UP,
};

/// Single-frame gate for reproductions: a strong off-DC spectrum peak
/// (screen/moiré) or a flat landmark mesh (photo).
#[derive(Debug, Clone)]
pub struct StaticArtifactClassifier {
    fourier_peak_threshold: f64,
    static_z_std_threshold: f64,
}

impl StaticArtifactClassifier {
    pub fn new(config: &LivenessConfig) -> Self {
        Self {
            fourier_peak_threshold: config.fourier_peak_threshold,
            static_z_std_threshold: config.static_z_std_threshold,
        }
    }

    /// `Some(SPOOF)` when an artifact is found, `None` to continue to the
    /// dynamics check. The frequency check runs first.
    pub fn classify(&self, fourier_peak: f64, z_std: f64) -> Option<Decision> {
        tracing::debug!(
            fourier_peak,
            threshold = self.fourier_peak_threshold,
            "static: fourier peak"
        );
        if fourier_peak > self.fourier_peak_threshold {
            tracing::debug!("static: blocked, spectrum peak indicates screen or print");
            return Some(Decision::new(LivenessStatus::Spoof, REASON_REPLAY));
        }

        tracing::debug!(z_std, threshold = self.static_z_std_threshold, "static: depth spread");
        if z_std < self.static_z_std_threshold {
            tracing::debug!("static: blocked, landmark depth too flat");
            return Some(Decision::new(LivenessStatus::Spoof, REASON_STATIC_IMAGE));
        }

        None
    }
}

/// Window statistics reported alongside a dynamics decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicsReading {
    pub ear_std: f64,
    pub head_move_std: f64,
}

/// Blink + head-motion liveness over a full history window.
#[derive(Debug, Clone)]
pub struct DynamicsClassifier {
    history_length: usize,
    ear_std_threshold: f64,
    head_move_std_threshold: f64,
}

impl DynamicsClassifier {
    pub fn new(config: &LivenessConfig) -> Self {
        Self {
            history_length: config.history_length,
            ear_std_threshold: config.ear_std_threshold,
            head_move_std_threshold: config.head_move_std_threshold,
        }
    }

    pub fn classify(
        &self,
        ear_history: &HistoryBuffer,
        head_history: &HistoryBuffer,
    ) -> (Decision, DynamicsReading) {
        if ear_history.len() < self.history_length {
            let reading = DynamicsReading {
                ear_std: 0.0,
                head_move_std: 0.0,
            };
            return (
                Decision::new(LivenessStatus::Analyzing, REASON_COLLECTING),
                reading,
            );
        }

        let reading = DynamicsReading {
            ear_std: ear_history.std_dev(),
            head_move_std: head_history.std_dev(),
        };
        let blinking = reading.ear_std > self.ear_std_threshold;
        let moving = reading.head_move_std > self.head_move_std_threshold;

        tracing::debug!(
            ear_std = reading.ear_std,
            threshold = self.ear_std_threshold,
            blinking,
            "dynamics: eye aspect ratio"
        );
        tracing::debug!(
            head_move_std = reading.head_move_std,
            threshold = self.head_move_std_threshold,
            moving,
            "dynamics: head depth"
        );

        if blinking && moving {
            return (Decision::new(LivenessStatus::Real, REASON_LIVE), reading);
        }

        let mut failures = Vec::with_capacity(2);
        if !blinking {
            failures.push(REASON_BLINK_FAIL);
        }
        if !moving {
            failures.push(REASON_MOVEMENT_FAIL);
        }
        let reason = failures.join(" ");
        tracing::debug!(reason = %reason, "dynamics: liveness check failed");

        (Decision::new(LivenessStatus::Spoof, reason), reading)
    }
}

/// Frames with a face required before the depth/texture vote runs.
pub const DEPTH_WARMUP_FRAMES: u64 = 5;
/// The motion indicator only votes once the background model has settled.
pub const MOTION_MIN_FRAMES: u64 = 10;

const TEXTURE_STD_MIN: f64 = 15.0;
const FREQ_STD_MIN: f64 = 8.0;
const EDGE_DENSITY_MIN: f64 = 0.05;
const CONTOUR_COMPLEXITY_MIN: f64 = 0.1;
const MOTION_RATIO_RANGE: (f64, f64) = (0.001, 0.1);
const REAL_VOTE_SHARE: f64 = 0.6;
const INTENSITY_STD_MIN: f64 = 20.0;

/// Frame-level measurements the depth/texture vote reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureIndicators {
    pub texture_std: f64,
    pub freq_std: f64,
    pub edge_density: f64,
    pub contour_complexity: f64,
    pub motion_ratio: f64,
}

/// Majority vote over texture, frequency, edge and motion indicators, for
/// sessions without usable landmark dynamics.
#[derive(Debug, Clone, Default)]
pub struct DepthTextureClassifier;

impl DepthTextureClassifier {
    /// `frame_count` counts frames since reset, including this one.
    pub fn classify(&self, indicators: &TextureIndicators, frame_count: u64) -> Decision {
        if let Some(decision) = self.warming_up(frame_count) {
            return decision;
        }

        let mut votes = vec![
            ("texture", indicators.texture_std > TEXTURE_STD_MIN),
            ("frequency", indicators.freq_std > FREQ_STD_MIN),
            (
                "edges",
                indicators.edge_density > EDGE_DENSITY_MIN
                    && indicators.contour_complexity > CONTOUR_COMPLEXITY_MIN,
            ),
        ];
        if frame_count > MOTION_MIN_FRAMES {
            let (low, high) = MOTION_RATIO_RANGE;
            votes.push((
                "motion",
                indicators.motion_ratio > low && indicators.motion_ratio < high,
            ));
        }

        let real_votes = votes.iter().filter(|(_, passed)| *passed).count();
        let confidence = real_votes as f64 / votes.len() as f64;
        tracing::debug!(
            ?indicators,
            ?votes,
            real_votes,
            total = votes.len(),
            confidence,
            "depth/texture vote"
        );

        let status = if confidence >= REAL_VOTE_SHARE {
            LivenessStatus::Real
        } else {
            LivenessStatus::Spoof
        };
        let reason = format!("{real_votes}/{} depth indicators passed", votes.len());
        Decision::new(status, reason).with_confidence(confidence)
    }

    /// ANALYZING until `DEPTH_WARMUP_FRAMES` frames have been seen.
    pub fn warming_up(&self, frame_count: u64) -> Option<Decision> {
        (frame_count < DEPTH_WARMUP_FRAMES)
            .then(|| Decision::new(LivenessStatus::Analyzing, REASON_WARMING_UP))
    }

    /// Degraded-mode decision from raw intensity spread alone. The warm-up
    /// still applies.
    pub fn fallback(&self, intensity_std: f64, frame_count: u64) -> Decision {
        if let Some(decision) = self.warming_up(frame_count) {
            return decision;
        }
        let status = if intensity_std > INTENSITY_STD_MIN {
            LivenessStatus::Real
        } else {
            LivenessStatus::Spoof
        };
        Decision::new(
            status,
            format!("Degraded check: intensity std {intensity_std:.1}"),
        )
    }
}
