use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::counter::{CountLine, CrossingCounter, CrossingEvent, LineReport};
use crate::detection::Detection;
use crate::error::TrackError;
use crate::kalman_filter::{ConstantVelocity, MotionModel};
use crate::track::TrackSnapshot;
use crate::tracker::TrackRegistry;

/// Everything the display layer needs after one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    /// 1-based index of the frame this report belongs to
    pub frame_index: u64,
    /// False when the frame was skipped and no state changed
    pub success: bool,
    pub tracks: Vec<TrackSnapshot>,
    pub lines: Vec<LineReport>,
    pub events: Vec<CrossingEvent>,
    /// Distinct objects counted on any line so far
    pub distinct_total: usize,
    pub rejected: usize,
    pub filtered: usize,
}

/// Track registry and crossing counter driven as one serialized unit of
/// work per frame. Frames must be fed in arrival order.
#[derive(Debug)]
pub struct CountingEngine<M = ConstantVelocity> {
    registry: TrackRegistry<M>,
    counter: CrossingCounter,
    frames: u64,
}

impl<M: MotionModel> CountingEngine<M> {
    pub fn new(config: &Config) -> Result<Self, TrackError> {
        let registry = TrackRegistry::new(config)?;
        let counter = CrossingCounter::new(config.count_lines()?)?;
        Ok(Self {
            registry,
            counter,
            frames: 0,
        })
    }

    /// Run the full per-frame protocol on one frame's detections.
    pub fn process_frame(&mut self, detections: &[Detection]) -> FrameReport {
        self.frames += 1;
        let update = self.registry.update(detections);
        let tracks = self.registry.confirmed();
        let events = self.counter.observe(&tracks);
        debug!(
            frame = self.frames,
            live = self.registry.len(),
            confirmed = tracks.len(),
            created = update.created.len(),
            evicted = update.evicted.len(),
            crossings = events.len(),
            "frame processed"
        );

        FrameReport {
            frame_index: self.frames,
            success: true,
            tracks,
            lines: self.counter.reports(),
            events,
            distinct_total: self.counter.distinct_total(),
            rejected: update.rejected,
            filtered: update.filtered,
        }
    }

    /// Like [`process_frame`](Self::process_frame), but refuses any frame
    /// that is not the next one in sequence.
    pub fn process_sequenced(
        &mut self,
        frame_index: u64,
        detections: &[Detection],
    ) -> Result<FrameReport, TrackError> {
        let expected = self.frames + 1;
        if frame_index != expected {
            return Err(TrackError::OutOfOrderFrame {
                expected,
                got: frame_index,
            });
        }
        Ok(self.process_frame(detections))
    }

    /// Account for a frame whose detections could not be acquired. No track
    /// or count state changes; the report carries the current state.
    pub fn skip_frame(&mut self) -> FrameReport {
        self.frames += 1;
        self.counter.clear_flags();
        debug!(frame = self.frames, "frame skipped");

        FrameReport {
            frame_index: self.frames,
            success: false,
            tracks: self.registry.confirmed(),
            lines: self.counter.reports(),
            events: Vec::new(),
            distinct_total: self.counter.distinct_total(),
            rejected: 0,
            filtered: 0,
        }
    }
}

impl<M> CountingEngine<M> {
    pub fn registry(&self) -> &TrackRegistry<M> {
        &self.registry
    }

    pub fn counter(&self) -> &CrossingCounter {
        &self.counter
    }

    pub fn lines(&self) -> impl Iterator<Item = &CountLine> {
        self.counter.lines()
    }

    /// Frames seen so far, skipped ones included.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}
