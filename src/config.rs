use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::counter::{CountLine, CrossingCounter, Point};
use crate::error::ConfigError;

/// Offset of the default lines from the horizontal center, and their inset
/// from the top and bottom of the frame.
pub const DEFAULT_LINE_OFFSET: f32 = 50.0;

/// Class labels the original traffic counter paid attention to.
pub const TRAFFIC_CLASSES: [&str; 10] = [
    "person", "bicycle", "car", "motorbike", "bus", "truck", "dog", "horse", "cat", "bird",
];

/// A configured count line as it appears in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineConfig {
    pub name: String,
    pub start: [f32; 2],
    pub end: [f32; 2],
    /// Falls back to `Config::line_margin`
    #[serde(default)]
    pub margin: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum IoU for a solved track/detection pair to count as a match
    pub min_iou: f32,
    /// Consecutive hits before a tentative track is confirmed
    pub min_hits: u32,
    /// Missed frames a track survives before eviction
    pub max_age: u32,
    /// Optional hard cap on live tracks
    pub max_tracks: Option<usize>,
    /// Detections below this confidence are ignored
    pub min_confidence: f32,
    /// Class allowlist; empty accepts every label
    pub classes: Vec<String>,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Default tolerance band half-width for lines without their own margin
    pub line_margin: f32,
    /// Count lines; two vertical lines around the frame center when empty
    pub lines: Vec<LineConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            min_iou: 0.3,
            min_hits: 3,
            max_age: 20,
            max_tracks: None,
            min_confidence: 0.0,
            classes: Vec::new(),
            frame_width: 1280,
            frame_height: 720,
            line_margin: 20.0,
            lines: Vec::new(),
        }
    }
}

impl Config {
    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let cfg: Config = serde_json::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Fail fast on anything the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_iou) {
            return Err(ConfigError::MinIou(self.min_iou));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::MinConfidence(self.min_confidence));
        }
        if self.min_hits == 0 {
            return Err(ConfigError::MinHits);
        }
        if self.max_tracks == Some(0) {
            return Err(ConfigError::MaxTracks);
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(ConfigError::FrameSize {
                width: self.frame_width,
                height: self.frame_height,
            });
        }

        CrossingCounter::new(self.count_lines()?)?;
        Ok(())
    }

    /// Resolve the configured lines, deriving the defaults when none are set.
    pub fn count_lines(&self) -> Result<Vec<CountLine>, ConfigError> {
        if self.lines.is_empty() {
            return self.default_lines();
        }
        Ok(self
            .lines
            .iter()
            .map(|l| {
                CountLine::new(
                    l.name.clone(),
                    Point::new(l.start[0], l.start[1]),
                    Point::new(l.end[0], l.end[1]),
                    l.margin.unwrap_or(self.line_margin),
                )
            })
            .collect())
    }

    /// Two vertical lines 50 units either side of the horizontal center,
    /// from 50 units below the top to 50 units above the bottom.
    pub fn default_lines(&self) -> Result<Vec<CountLine>, ConfigError> {
        let width = self.frame_width as f32;
        let height = self.frame_height as f32;
        if width <= 2.0 * DEFAULT_LINE_OFFSET || height <= 2.0 * DEFAULT_LINE_OFFSET {
            return Err(ConfigError::FrameTooSmall {
                width: self.frame_width,
                height: self.frame_height,
            });
        }

        let cx = width / 2.0;
        let top = DEFAULT_LINE_OFFSET;
        let bottom = height - DEFAULT_LINE_OFFSET;
        Ok(vec![
            CountLine::new(
                "left",
                Point::new(cx - DEFAULT_LINE_OFFSET, top),
                Point::new(cx - DEFAULT_LINE_OFFSET, bottom),
                self.line_margin,
            ),
            CountLine::new(
                "right",
                Point::new(cx + DEFAULT_LINE_OFFSET, top),
                Point::new(cx + DEFAULT_LINE_OFFSET, bottom),
                self.line_margin,
            ),
        ])
    }

    /// Restrict detections to the traffic classes.
    pub fn with_traffic_classes(mut self) -> Self {
        self.classes = TRAFFIC_CLASSES.iter().map(|c| c.to_string()).collect();
        self
    }
}
