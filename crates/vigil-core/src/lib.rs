//! vigil-core: liveness and presentation-attack detection.
//!
//! Consumes one camera frame at a time, with that frame's facial landmarks
//! when an extractor is available, and emits a verdict (ANALYZING, NO_FACE,
//! REAL, SPOOF, ERROR) with a reason and the raw measurements behind it.
//! Face detection, landmark extraction and embedding generation are
//! supplied by the caller.

pub mod classifier;
pub mod config;
pub mod engine;
pub mod frame;
pub mod history;
pub mod landmarks;
pub mod matcher;
pub mod motion;
pub mod signals;
pub mod spectrum;
pub mod verdict;

pub use config::{ConfigError, LivenessConfig, Strategy};
pub use engine::LivenessEngine;
pub use frame::{BoundingBox, Frame, FrameError};
pub use landmarks::{LandmarkExtractor, LandmarkSet, Point3};
pub use matcher::{DistanceMatcher, Embedding, MatchResult};
pub use signals::{ExtractionError, SignalSnapshot};
pub use verdict::{Analysis, LivenessStatus, Verdict};
