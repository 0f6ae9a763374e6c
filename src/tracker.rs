use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::association::associate;
use crate::config::Config;
use crate::detection::{filter_detections, BBox, Detection};
use crate::error::ConfigError;
use crate::kalman_filter::{ConstantVelocity, MotionModel};
use crate::track::{Track, TrackId, TrackSnapshot};

/// What one call to [`TrackRegistry::update`] changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameUpdate {
    /// Track/detection pairs that passed the IoU gate
    pub matched: usize,
    pub created: Vec<TrackId>,
    pub confirmed: Vec<TrackId>,
    pub evicted: Vec<TrackId>,
    /// Malformed detections dropped at the input boundary
    pub rejected: usize,
    /// Valid detections ignored for confidence or class
    pub filtered: usize,
    /// Detections not turned into tracks because of `max_tracks`
    pub capped: usize,
}

/// Owns every live track and runs the per-frame lifecycle.
#[derive(Debug)]
pub struct TrackRegistry<M = ConstantVelocity> {
    tracks: HashMap<TrackId, Track<M>>,
    /// Last identity handed out; identities start at 1
    last_id: u64,
    min_iou: f32,
    min_hits: u32,
    max_age: u32,
    max_tracks: Option<usize>,
    min_confidence: f32,
    classes: Vec<String>,
}

impl<M: MotionModel> TrackRegistry<M> {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(TrackRegistry {
            tracks: HashMap::new(),
            last_id: 0,
            min_iou: config.min_iou,
            min_hits: config.min_hits,
            max_age: config.max_age,
            max_tracks: config.max_tracks,
            min_confidence: config.min_confidence,
            classes: config.classes.clone(),
        })
    }

    /// Process one frame of detections end to end.
    pub fn update(&mut self, detections: &[Detection]) -> FrameUpdate {
        let input = filter_detections(detections, self.min_confidence, &self.classes);
        let mut out = FrameUpdate {
            rejected: input.rejected,
            filtered: input.filtered,
            ..Default::default()
        };
        let dets = input.accepted;

        // Identity order keeps the solver's tie-breaking reproducible
        let ids = self.sorted_ids();

        // Predict locations
        let predicted: Vec<BBox> = ids
            .iter()
            .filter_map(|id| self.tracks.get_mut(id).map(|t| t.predict()))
            .collect();
        let det_boxes: Vec<BBox> = dets.iter().map(|d| d.bbox).collect();

        let assignment = associate(&predicted, &det_boxes, self.min_iou);
        trace!(
            tracks = ids.len(),
            detections = dets.len(),
            matches = assignment.matches.len(),
            "associated frame"
        );

        // Update matched tracks
        for &(ti, di) in &assignment.matches {
            let Some(track) = self.tracks.get_mut(&ids[ti]) else {
                continue;
            };
            out.matched += 1;
            if track.mark_matched(dets[di], self.min_hits) {
                debug!(track = %track.id(), class = %track.class_label(), "track confirmed");
                out.confirmed.push(track.id());
            }
        }

        // Age unmatched tracks, evicting the ones past max_age
        for &ti in &assignment.unmatched_tracks {
            let id = ids[ti];
            let dead = match self.tracks.get_mut(&id) {
                Some(track) => track.mark_missed(self.max_age),
                None => false,
            };
            if dead {
                self.tracks.remove(&id);
                debug!(track = %id, "track evicted");
                out.evicted.push(id);
            }
        }

        // Create new tracks for unmatched detections
        for &di in &assignment.unmatched_detections {
            if !self.make_room(&mut out) {
                out.capped += 1;
                continue;
            }
            let id = self.next_id();
            let track = Track::new(id, dets[di], self.min_hits);
            debug!(track = %id, class = %track.class_label(), status = ?track.status(), "track created");
            if track.is_confirmed() {
                out.confirmed.push(id);
            }
            self.tracks.insert(id, track);
            out.created.push(id);
        }

        out
    }

    /// Enforce `max_tracks` before a birth by evicting the longest-unmatched
    /// tentative track. Tracks matched or born this frame have
    /// `time_since_update == 0` and are never victims. Returns false if no
    /// room could be made.
    fn make_room(&mut self, out: &mut FrameUpdate) -> bool {
        let Some(cap) = self.max_tracks else {
            return true;
        };
        if self.tracks.len() < cap {
            return true;
        }

        let victim = self
            .tracks
            .values()
            .filter(|t| t.is_tentative() && t.time_since_update() > 0)
            .max_by(|a, b| {
                a.time_since_update()
                    .cmp(&b.time_since_update())
                    .then(b.id().cmp(&a.id()))
            })
            .map(|t| t.id());

        match victim {
            Some(id) => {
                self.tracks.remove(&id);
                warn!(track = %id, cap, "track cap reached, evicting tentative track");
                out.evicted.push(id);
                true
            }
            None => {
                warn!(cap, "track cap reached with no stale tentative track, dropping detection");
                false
            }
        }
    }

    fn next_id(&mut self) -> TrackId {
        self.last_id += 1;
        TrackId(self.last_id)
    }

    fn sorted_ids(&self) -> Vec<TrackId> {
        let mut ids: Vec<TrackId> = self.tracks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Confirmed tracks in identity order. Tentative tracks are never exposed.
    pub fn confirmed(&self) -> Vec<TrackSnapshot> {
        self.sorted_ids()
            .iter()
            .filter_map(|id| self.tracks.get(id))
            .filter(|t| t.is_confirmed())
            .map(Track::snapshot)
            .collect()
    }
}

impl<M> TrackRegistry<M> {
    pub fn get(&self, id: TrackId) -> Option<&Track<M>> {
        self.tracks.get(&id)
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.tracks.contains_key(&id)
    }

    /// Live tracks, tentative and confirmed.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track<M>> {
        self.tracks.values()
    }

    pub fn last_id(&self) -> Option<TrackId> {
        (self.last_id > 0).then_some(TrackId(self.last_id))
    }
}
