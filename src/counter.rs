use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use crate::track::{TrackId, TrackSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Which way an object was moving when it entered a line's band, from the
/// sign of `velocity x (end - start)`. For a line drawn top to bottom in
/// image coordinates, left-to-right motion is `Positive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrossingDirection {
    Positive,
    Negative,
    Stationary,
}

/// Directed segment plus the half-width of its tolerance band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountLine {
    pub name: String,
    pub start: Point,
    pub end: Point,
    pub margin: f32,
}

impl CountLine {
    pub fn new(name: impl Into<String>, start: Point, end: Point, margin: f32) -> Self {
        Self {
            name: name.into(),
            start,
            end,
            margin,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let coords = [self.start.x, self.start.y, self.end.x, self.end.y];
        if !coords.iter().all(|c| c.is_finite()) {
            return Err(ConfigError::NonFiniteLine(self.name.clone()));
        }
        if self.start == self.end {
            return Err(ConfigError::CoincidentEndpoints(self.name.clone()));
        }
        if !(self.margin.is_finite() && self.margin >= 0.0) {
            return Err(ConfigError::LineMargin {
                name: self.name.clone(),
                margin: self.margin,
            });
        }
        Ok(())
    }

    fn direction(&self) -> (f32, f32) {
        (self.end.x - self.start.x, self.end.y - self.start.y)
    }

    /// True if `(x, y)` lies between the endpoints along the line and within
    /// `margin` of it across the line.
    pub fn in_band(&self, x: f32, y: f32) -> bool {
        let (dx, dy) = self.direction();
        let len2 = dx * dx + dy * dy;
        if !(len2 > 0.0) {
            return false;
        }
        let (px, py) = (x - self.start.x, y - self.start.y);

        let along = (px * dx + py * dy) / len2;
        if !(0.0..=1.0).contains(&along) {
            return false;
        }
        let across = (px * dy - py * dx).abs() / len2.sqrt();
        across <= self.margin
    }

    pub fn crossing_direction(&self, velocity: (f32, f32)) -> CrossingDirection {
        let (dx, dy) = self.direction();
        let cross = velocity.0 * dy - velocity.1 * dx;
        if cross > 0.0 {
            CrossingDirection::Positive
        } else if cross < 0.0 {
            CrossingDirection::Negative
        } else {
            CrossingDirection::Stationary
        }
    }
}

/// One-shot notification that a track was counted on a line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossingEvent {
    pub line: String,
    pub track_id: TrackId,
    pub class_label: String,
    pub direction: CrossingDirection,
}

/// Per-line totals as reported to the display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineReport {
    pub name: String,
    pub total: u64,
    pub positive: u64,
    pub negative: u64,
    pub just_crossed: bool,
}

/// A line with its Counted-ID set. The set only grows.
#[derive(Debug, Clone)]
struct LineCounter {
    line: CountLine,
    counted: HashSet<TrackId>,
    total: u64,
    positive: u64,
    negative: u64,
    just_crossed: bool,
}

impl LineCounter {
    fn new(line: CountLine) -> Self {
        Self {
            line,
            counted: HashSet::new(),
            total: 0,
            positive: 0,
            negative: 0,
            just_crossed: false,
        }
    }

    fn report(&self) -> LineReport {
        LineReport {
            name: self.line.name.clone(),
            total: self.total,
            positive: self.positive,
            negative: self.negative,
            just_crossed: self.just_crossed,
        }
    }
}

/// Counts each track at most once per line.
#[derive(Debug, Clone)]
pub struct CrossingCounter {
    lines: Vec<LineCounter>,
}

impl CrossingCounter {
    /// Lines must be valid and uniquely named; totals are looked up by name.
    pub fn new(lines: Vec<CountLine>) -> Result<Self, ConfigError> {
        let mut names = HashSet::new();
        for line in &lines {
            line.validate()?;
            if !names.insert(line.name.as_str()) {
                return Err(ConfigError::DuplicateLine(line.name.clone()));
            }
        }
        Ok(Self {
            lines: lines.into_iter().map(LineCounter::new).collect(),
        })
    }

    /// Test every confirmed track against every line for this frame.
    ///
    /// Only tracks matched this frame are tested. A coasting track's box is
    /// extrapolated, so it can neither count nor use up its one count.
    pub fn observe(&mut self, tracks: &[TrackSnapshot]) -> Vec<CrossingEvent> {
        let mut events = Vec::new();

        for lc in &mut self.lines {
            lc.just_crossed = false;
            for track in tracks.iter().filter(|t| t.time_since_update == 0) {
                let (cx, cy) = track.center();
                if !lc.line.in_band(cx, cy) || !lc.counted.insert(track.id) {
                    continue;
                }

                let direction = lc.line.crossing_direction(track.velocity);
                lc.total += 1;
                match direction {
                    CrossingDirection::Positive => lc.positive += 1,
                    CrossingDirection::Negative => lc.negative += 1,
                    CrossingDirection::Stationary => {}
                }
                lc.just_crossed = true;

                info!(
                    line = %lc.line.name,
                    track = %track.id,
                    class = %track.class_label,
                    ?direction,
                    total = lc.total,
                    "line crossed"
                );
                events.push(CrossingEvent {
                    line: lc.line.name.clone(),
                    track_id: track.id,
                    class_label: track.class_label.clone(),
                    direction,
                });
            }
        }

        events
    }

    /// Drop the per-frame flags without touching any counts.
    pub fn clear_flags(&mut self) {
        for lc in &mut self.lines {
            lc.just_crossed = false;
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &CountLine> {
        self.lines.iter().map(|lc| &lc.line)
    }

    pub fn reports(&self) -> Vec<LineReport> {
        self.lines.iter().map(LineCounter::report).collect()
    }

    pub fn total(&self, line: &str) -> Option<u64> {
        self.lines
            .iter()
            .find(|lc| lc.line.name == line)
            .map(|lc| lc.total)
    }

    pub fn has_counted(&self, line: &str, id: TrackId) -> bool {
        self.lines
            .iter()
            .any(|lc| lc.line.name == line && lc.counted.contains(&id))
    }

    /// Distinct objects counted on any line.
    pub fn distinct_total(&self) -> usize {
        self.lines
            .iter()
            .flat_map(|lc| lc.counted.iter())
            .collect::<HashSet<_>>()
            .len()
    }
}
