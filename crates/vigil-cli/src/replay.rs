//! Offline replay of a recorded session: image files plus an optional JSONL
//! landmark track, one engine, one JSON verdict per frame on stdout.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use vigil_core::{
    Frame, LandmarkExtractor, LandmarkSet, LivenessConfig, LivenessEngine, LivenessStatus,
    Strategy, Verdict,
};

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Landmarks recorded one frame per line. `[]` means no face.
pub struct JsonlLandmarks<R> {
    reader: R,
    line_no: usize,
}

impl<R: BufRead> JsonlLandmarks<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, line_no: 0 }
    }
}

impl<R: BufRead> LandmarkExtractor for JsonlLandmarks<R> {
    fn extract(&mut self, _frame: &Frame) -> LandmarkSet {
        let mut line = String::new();
        self.line_no += 1;
        match self.reader.read_line(&mut line) {
            Ok(0) => {
                tracing::warn!(
                    line = self.line_no,
                    "landmark track exhausted, treating frame as faceless"
                );
                LandmarkSet::empty()
            }
            Ok(_) => match serde_json::from_str::<LandmarkSet>(line.trim()) {
                Ok(set) => set,
                Err(e) => {
                    tracing::warn!(line = self.line_no, error = %e, "bad landmark line");
                    LandmarkSet::empty()
                }
            },
            Err(e) => {
                tracing::warn!(line = self.line_no, error = %e, "failed to read landmark track");
                LandmarkSet::empty()
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct FrameRecord<'a> {
    frame: &'a str,
    verdict: &'a Verdict,
}

/// Per-status tally over a replay.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReplaySummary {
    pub frames: usize,
    pub analyzing: usize,
    pub no_face: usize,
    pub real: usize,
    pub spoof: usize,
    pub error: usize,
}

impl ReplaySummary {
    fn record(&mut self, status: LivenessStatus) {
        self.frames += 1;
        match status {
            LivenessStatus::Analyzing => self.analyzing += 1,
            LivenessStatus::NoFace => self.no_face += 1,
            LivenessStatus::Real => self.real += 1,
            LivenessStatus::Spoof => self.spoof += 1,
            LivenessStatus::Error => self.error += 1,
        }
    }
}

/// Image files in `dir` with a known extension, sorted by file name.
pub fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read frame directory {}", dir.display()))?
    {
        let path = entry?.path();
        let known = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if known && path.is_file() {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

/// Run every frame in `frames_dir` through one engine, writing a JSON line
/// per frame to `out`.
pub fn run(
    mut config: LivenessConfig,
    frames_dir: &Path,
    landmarks: Option<&Path>,
    out: &mut impl Write,
) -> Result<ReplaySummary> {
    let mut extractor: Option<Box<dyn LandmarkExtractor>> = match landmarks {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("failed to open landmark track {}", path.display()))?;
            let track: Box<dyn LandmarkExtractor> =
                Box::new(JsonlLandmarks::new(std::io::BufReader::new(file)));
            Some(track)
        }
        None => {
            if config.strategy != Strategy::DepthTexture {
                tracing::info!("no landmark track, using depth/texture strategy");
                config.strategy = Strategy::DepthTexture;
            }
            None
        }
    };

    let frames = list_frames(frames_dir)?;
    if frames.is_empty() {
        tracing::warn!(dir = %frames_dir.display(), "no frames found");
    }

    let mut engine = LivenessEngine::new(config).context("invalid liveness configuration")?;
    replay_frames(
        &mut engine,
        extractor
            .as_deref_mut()
            .map(|e| e as &mut dyn LandmarkExtractor),
        &frames,
        out,
    )
}

fn replay_frames(
    engine: &mut LivenessEngine,
    mut extractor: Option<&mut dyn LandmarkExtractor>,
    frames: &[PathBuf],
    out: &mut impl Write,
) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();
    for path in frames {
        let frame = Frame::open(path)
            .with_context(|| format!("failed to decode frame {}", path.display()))?;
        let landmarks = extractor.as_mut().map(|e| e.extract(&frame));
        let analysis = engine.analyze(&frame, landmarks.as_ref());

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let record = FrameRecord {
            frame: &name,
            verdict: &analysis.verdict,
        };
        serde_json::to_writer(&mut *out, &record)?;
        writeln!(out)?;
        summary.record(analysis.verdict.status);
    }

    tracing::info!(
        frames = summary.frames,
        real = summary.real,
        spoof = summary.spoof,
        analyzing = summary.analyzing,
        no_face = summary.no_face,
        error = summary.error,
        "replay finished"
    );
    Ok(summary)
}
