use serde::Serialize;

use crate::frame::BoundingBox;
use crate::landmarks::LandmarkSet;
use crate::signals::SignalSnapshot;

pub const REASON_NO_FACE: &str = "No face detected";
pub const REASON_REPLAY: &str = "Image/Video Not Allowed";
pub const REASON_STATIC_IMAGE: &str = "Static Image Not Allowed";
pub const REASON_COLLECTING: &str = "Collecting Liveness Data";
pub const REASON_LIVE: &str = "Live Person Authenticated";
pub const REASON_BLINK_FAIL: &str = "Blink fail.";
pub const REASON_MOVEMENT_FAIL: &str = "Movement fail.";
pub const REASON_WARMING_UP: &str = "Warming up";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LivenessStatus {
    Analyzing,
    NoFace,
    Real,
    Spoof,
    Error,
}

impl std::fmt::Display for LivenessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LivenessStatus::Analyzing => "ANALYZING",
            LivenessStatus::NoFace => "NO_FACE",
            LivenessStatus::Real => "REAL",
            LivenessStatus::Spoof => "SPOOF",
            LivenessStatus::Error => "ERROR",
        })
    }
}

/// A classifier's answer before the engine attaches measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub status: LivenessStatus,
    pub reason: String,
    /// Vote share, only for the depth/texture strategy.
    pub confidence: Option<f64>,
}

impl Decision {
    pub fn new(status: LivenessStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Per-frame engine output. Produced once, consumed by the caller, never
/// stored by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub status: LivenessStatus,
    pub reason: String,
    pub confidence: Option<f64>,
    pub signals: SignalSnapshot,
    /// Landmark extrema, for cropping the face before embedding extraction.
    pub face_location: Option<BoundingBox>,
    /// Frames with a face since the last reset, including this one.
    pub frames_since_reset: u64,
}

/// Verdict plus the landmarks it was computed from.
#[derive(Debug, Clone)]
pub struct Analysis<'a> {
    pub verdict: Verdict,
    pub landmarks: Option<&'a LandmarkSet>,
}
