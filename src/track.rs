use std::collections::{HashMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::detection::{BBox, Detection};
use crate::kalman_filter::MotionModel;

/// Number of recent class labels kept for the majority vote.
const CLASS_HISTORY: usize = 10;

/// Process-unique track identity. Allocated from 1 upward, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status. Only ever moves forward: Tentative -> Confirmed -> Dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrackStatus {
    Tentative,
    Confirmed,
    Dead,
}

/// One physically distinct object being followed over time.
#[derive(Debug, Clone)]
pub struct Track<M> {
    id: TrackId,
    model: M,
    bbox: BBox,
    status: TrackStatus,
    /// Consecutive matched frames since the last miss
    hit_streak: u32,
    /// Total matched frames, including the one that created the track
    hits: u32,
    /// Frames since the last successful match
    time_since_update: u32,
    /// Frames this track has been alive
    age: u32,
    confidence: f32,
    class_label: String,
    class_hist: VecDeque<String>,
}

impl<M: MotionModel> Track<M> {
    /// Create a new track from an unmatched detection.
    pub fn new(id: TrackId, detection: &Detection, min_hits: u32) -> Self {
        let model = M::initiate(&detection.bbox);
        let status = if min_hits <= 1 {
            TrackStatus::Confirmed
        } else {
            TrackStatus::Tentative
        };
        let mut class_hist = VecDeque::with_capacity(CLASS_HISTORY);
        class_hist.push_back(detection.class_label.clone());

        Track {
            id,
            bbox: model.bbox(),
            model,
            status,
            hit_streak: 1,
            hits: 1,
            time_since_update: 0,
            age: 0,
            confidence: detection.confidence,
            class_label: detection.class_label.clone(),
            class_hist,
        }
    }

    /// Advance the motion model one frame.
    pub fn predict(&mut self) -> BBox {
        self.age += 1;
        self.bbox = self.model.predict();
        self.bbox
    }

    /// Fuse a matched detection. Returns true if this confirmed the track.
    pub fn mark_matched(&mut self, detection: &Detection, min_hits: u32) -> bool {
        self.model.update(&detection.bbox);
        self.bbox = self.model.bbox();
        self.hits += 1;
        self.hit_streak += 1;
        self.time_since_update = 0;
        self.confidence = detection.confidence;
        self.push_class(&detection.class_label);

        if self.status == TrackStatus::Tentative && self.hit_streak >= min_hits {
            self.status = TrackStatus::Confirmed;
            return true;
        }
        false
    }

    /// Record a frame without a match. Returns true once the track is dead.
    pub fn mark_missed(&mut self, max_age: u32) -> bool {
        self.time_since_update += 1;
        self.hit_streak = 0;
        if self.time_since_update > max_age {
            self.status = TrackStatus::Dead;
        }
        self.is_dead()
    }

    /// Update class label to most common in history
    fn push_class(&mut self, label: &str) {
        if self.class_hist.len() == CLASS_HISTORY {
            self.class_hist.pop_front();
        }
        self.class_hist.push_back(label.to_string());

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for c in &self.class_hist {
            *counts.entry(c.as_str()).or_insert(0) += 1;
        }
        // Ties go to the most recent label
        let best = self
            .class_hist
            .iter()
            .max_by_key(|c| counts.get(c.as_str()).copied().unwrap_or(0))
            .cloned();
        if let Some(best) = best {
            self.class_label = best;
        }
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        let (vx, vy) = self.model.velocity();
        TrackSnapshot {
            id: self.id,
            bbox: self.bbox,
            velocity: (vx, vy),
            class_label: self.class_label.clone(),
            confidence: self.confidence,
            hits: self.hits,
            time_since_update: self.time_since_update,
        }
    }
}

impl<M> Track<M> {
    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn bbox(&self) -> &BBox {
        &self.bbox
    }

    pub fn status(&self) -> TrackStatus {
        self.status
    }

    pub fn hit_streak(&self) -> u32 {
        self.hit_streak
    }

    pub fn hits(&self) -> u32 {
        self.hits
    }

    pub fn time_since_update(&self) -> u32 {
        self.time_since_update
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn class_label(&self) -> &str {
        &self.class_label
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == TrackStatus::Confirmed
    }

    pub fn is_tentative(&self) -> bool {
        self.status == TrackStatus::Tentative
    }

    pub fn is_dead(&self) -> bool {
        self.status == TrackStatus::Dead
    }
}

/// Read-only view of a confirmed track handed to the counter and display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub id: TrackId,
    pub bbox: BBox,
    /// Center velocity estimate, units per frame
    pub velocity: (f32, f32),
    pub class_label: String,
    pub confidence: f32,
    pub hits: u32,
    pub time_since_update: u32,
}

impl TrackSnapshot {
    /// Reference point used for line crossing.
    pub fn center(&self) -> (f32, f32) {
        self.bbox.center()
    }
}
