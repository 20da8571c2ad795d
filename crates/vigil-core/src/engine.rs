//! Per-session liveness engine: runs the extractors and classifiers for
//! each frame and owns the only cross-frame state.
//!
//! One engine serves one camera session. It is driven synchronously, one
//! `analyze` call per frame; `reset` may be called between any two frames.

use crate::classifier::{
    DepthTextureClassifier, DynamicsClassifier, StaticArtifactClassifier, TextureIndicators,
};
use crate::config::{ConfigError, LivenessConfig, Strategy};
use crate::frame::Frame;
use crate::history::HistoryBuffer;
use crate::landmarks::{LandmarkSet, NOSE_TIP};
use crate::motion::BackgroundModel;
use crate::signals::{
    edge_stats, intensity_std, texture_stats, ExtractionError, Extracted, SignalSnapshot,
};
use crate::spectrum::SpectrumAnalyzer;
use crate::verdict::{Analysis, Decision, LivenessStatus, Verdict, REASON_NO_FACE};

/// Temporal state accumulated since the last reset.
#[derive(Debug, Clone)]
pub struct EngineState {
    ear_history: HistoryBuffer,
    head_history: HistoryBuffer,
    background: BackgroundModel,
    frames_since_reset: u64,
    last_status: Option<LivenessStatus>,
}

impl EngineState {
    fn new(history_length: usize) -> Self {
        Self {
            ear_history: HistoryBuffer::new(history_length),
            head_history: HistoryBuffer::new(history_length),
            background: BackgroundModel::new(),
            frames_since_reset: 0,
            last_status: None,
        }
    }

    fn clear(&mut self) {
        self.ear_history.clear();
        self.head_history.clear();
        self.background.reset();
        self.frames_since_reset = 0;
        self.last_status = None;
    }

    /// Mean eye-aspect-ratio per frame, oldest first.
    pub fn ear_history(&self) -> &HistoryBuffer {
        &self.ear_history
    }

    /// Nose-tip depth per frame, oldest first.
    pub fn head_history(&self) -> &HistoryBuffer {
        &self.head_history
    }

    pub fn background(&self) -> &BackgroundModel {
        &self.background
    }

    pub fn frames_since_reset(&self) -> u64 {
        self.frames_since_reset
    }
}

pub struct LivenessEngine {
    config: LivenessConfig,
    static_artifacts: StaticArtifactClassifier,
    dynamics: DynamicsClassifier,
    depth_texture: DepthTextureClassifier,
    spectrum: SpectrumAnalyzer,
    state: EngineState,
}

impl LivenessEngine {
    /// Build an engine. Fails on a configuration the engine cannot honour,
    /// such as an empty history window.
    pub fn new(config: LivenessConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        tracing::debug!(?config, "liveness engine configured");
        Ok(Self {
            static_artifacts: StaticArtifactClassifier::new(&config),
            dynamics: DynamicsClassifier::new(&config),
            depth_texture: DepthTextureClassifier,
            spectrum: SpectrumAnalyzer::new(),
            state: EngineState::new(config.history_length),
            config,
        })
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Forget all temporal state: both history windows, the background
    /// model and the frame counter. Configuration is kept.
    pub fn reset(&mut self) {
        self.state.clear();
    }

    /// Evaluate one frame.
    ///
    /// `Some(set)` is the landmark extractor's output for this frame, empty
    /// when no face is visible. `None` means no extractor is available: the
    /// depth/texture strategy then analyzes the whole frame, while the
    /// landmark strategy has nothing to work with and reports NO_FACE.
    ///
    /// Never fails: extraction problems surface as a degraded decision or an
    /// ERROR verdict.
    pub fn analyze<'a>(
        &mut self,
        frame: &Frame,
        landmarks: Option<&'a LandmarkSet>,
    ) -> Analysis<'a> {
        match landmarks {
            Some(set) if set.is_empty() => return self.no_face(),
            None if self.config.strategy == Strategy::Landmarks => {
                tracing::debug!("landmark strategy called without landmarks");
                return self.no_face();
            }
            _ => {}
        }

        self.state.frames_since_reset += 1;
        let face_location = landmarks.and_then(|set| set.bounding_box(frame));
        let mut signals = SignalSnapshot::default();

        let decision = if frame.is_empty() {
            tracing::warn!("empty frame, cannot extract signals");
            Decision::new(
                LivenessStatus::Error,
                ExtractionError::EmptyFrame.to_string(),
            )
        } else {
            match (self.config.strategy, landmarks) {
                (Strategy::Landmarks, Some(set)) => self.landmark_path(frame, set, &mut signals),
                _ => self.depth_texture_path(frame, &mut signals),
            }
        };

        self.log_transition(&decision);

        Analysis {
            verdict: Verdict {
                status: decision.status,
                reason: decision.reason,
                confidence: decision.confidence,
                signals,
                face_location,
                frames_since_reset: self.state.frames_since_reset,
            },
            landmarks,
        }
    }

    fn no_face<'a>(&mut self) -> Analysis<'a> {
        if self.state.frames_since_reset > 0 {
            tracing::info!(
                frames = self.state.frames_since_reset,
                "face lost, clearing liveness history"
            );
        }
        self.state.clear();
        Analysis {
            verdict: Verdict {
                status: LivenessStatus::NoFace,
                reason: REASON_NO_FACE.to_string(),
                confidence: None,
                signals: SignalSnapshot::default(),
                face_location: None,
                frames_since_reset: 0,
            },
            landmarks: None,
        }
    }

    /// Static artifacts first, then blink/motion dynamics.
    fn landmark_path(
        &mut self,
        frame: &Frame,
        landmarks: &LandmarkSet,
        signals: &mut SignalSnapshot,
    ) -> Decision {
        let crop = landmarks
            .padded_box(frame, self.config.crop_padding)
            .ok_or(ExtractionError::EmptyCrop);
        let peak = Extracted::from_result(
            crop.and_then(|region| {
                self.spectrum
                    .peak_after_dc(&frame.gray_crop(&region), self.config.dc_mask_radius)
            }),
            0.0,
        );
        if let Some(cause) = peak.cause() {
            tracing::warn!(error = %cause, "fourier peak unavailable, using 0");
        }
        let z_std = landmarks.depth_std();
        signals.fourier_peak = Some(peak.value());
        signals.z_std = Some(z_std);

        if let Some(decision) = self.static_artifacts.classify(peak.value(), z_std) {
            return decision;
        }

        // Read both samples before touching either window so a bad mesh
        // leaves the history untouched.
        let samples = landmarks
            .mean_ear()
            .and_then(|ear| Ok((ear, landmarks.point(NOSE_TIP)?.z)));
        let (ear, nose_z) = match samples {
            Ok(samples) => samples,
            Err(e) => {
                tracing::warn!(error = %e, points = landmarks.len(), "landmark set unusable");
                return Decision::new(LivenessStatus::Error, e.to_string());
            }
        };
        signals.ear_mean = Some(ear);
        self.state.ear_history.push(ear);
        self.state.head_history.push(nose_z);

        let (decision, reading) = self
            .dynamics
            .classify(&self.state.ear_history, &self.state.head_history);
        signals.ear_std = Some(reading.ear_std);
        signals.head_move_std = Some(reading.head_move_std);
        decision
    }

    /// Whole-frame texture/frequency/edge/motion vote.
    fn depth_texture_path(&mut self, frame: &Frame, signals: &mut SignalSnapshot) -> Decision {
        let gray = frame.gray();

        // The background model learns on every frame, warm-up included.
        let motion = Extracted::from_result(self.state.background.apply(gray), 0.0);
        let texture = Extracted::from_result(texture_stats(gray), (0.0, 0.0));
        let freq = Extracted::from_result(self.spectrum.spectrum_std(gray), 0.0);
        let edges = Extracted::from_result(edge_stats(gray), (0.0, 0.0));

        let degraded = [motion.cause(), texture.cause(), freq.cause(), edges.cause()]
            .into_iter()
            .flatten()
            .next()
            .cloned();
        if let Some(cause) = degraded {
            tracing::warn!(
                error = %cause,
                "depth/texture extraction failed, using intensity fallback"
            );
            return match intensity_std(gray) {
                Ok(std) => {
                    signals.intensity_std = Some(std);
                    self.depth_texture
                        .fallback(std, self.state.frames_since_reset)
                }
                Err(e) => Decision::new(LivenessStatus::Error, e.to_string()),
            };
        }

        let (texture_std, texture_mean) = texture.value();
        let (edge_density, contour_complexity) = edges.value();
        let indicators = TextureIndicators {
            texture_std,
            freq_std: freq.value(),
            edge_density,
            contour_complexity,
            motion_ratio: motion.value(),
        };
        signals.texture_std = Some(texture_std);
        signals.texture_mean = Some(texture_mean);
        signals.freq_std = Some(indicators.freq_std);
        signals.edge_density = Some(edge_density);
        signals.contour_complexity = Some(contour_complexity);
        signals.motion_ratio = Some(indicators.motion_ratio);

        self.depth_texture
            .classify(&indicators, self.state.frames_since_reset)
    }

    fn log_transition(&mut self, decision: &Decision) {
        if self.state.last_status == Some(decision.status) {
            return;
        }
        match decision.status {
            LivenessStatus::Real | LivenessStatus::Spoof => tracing::info!(
                status = %decision.status,
                reason = %decision.reason,
                frame = self.state.frames_since_reset,
                "liveness verdict changed"
            ),
            _ => tracing::debug!(
                status = %decision.status,
                reason = %decision.reason,
                "liveness status changed"
            ),
        }
        self.state.last_status = Some(decision.status);
    }
}
