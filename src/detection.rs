use nalgebra::SVector;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::DetectionError;
use crate::utils;

/// Axis-aligned bounding box in (x1, y1, x2, y2) image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    #[serde(deserialize_with = "nan_if_null")]
    pub x1: f32,
    #[serde(deserialize_with = "nan_if_null")]
    pub y1: f32,
    #[serde(deserialize_with = "nan_if_null")]
    pub x2: f32,
    #[serde(deserialize_with = "nan_if_null")]
    pub y2: f32,
}

/// serde_json writes NaN as `null`; read it back as NaN so validation sees it.
fn nan_if_null<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f32>::deserialize(deserializer)?.unwrap_or(f32::NAN))
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Box centered on (cx, cy). Width and height must already be positive.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    /// Measurement vector (cx, cy, w, h) used by the motion model.
    pub fn to_cxcywh(&self) -> SVector<f32, 4> {
        let (cx, cy) = self.center();
        SVector::<f32, 4>::new(cx, cy, self.width(), self.height())
    }

    pub fn as_array(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Areas are taken in f64 so very large boxes still overlap themselves.
    pub fn iou(&self, other: &BBox) -> f32 {
        let a = self.as_array().map(f64::from);
        let b = other.as_array().map(f64::from);
        utils::compute_iou_array(&a, &b) as f32
    }

    pub fn check(&self) -> Result<(), DetectionError> {
        if !self.as_array().iter().all(|v| v.is_finite()) {
            return Err(DetectionError::NonFinite);
        }
        if self.x1 >= self.x2 || self.y1 >= self.y2 {
            return Err(DetectionError::Inverted);
        }
        // The motion model works in f32 and squares the extents
        if !(self.width() * self.height()).is_finite() {
            return Err(DetectionError::AreaOverflow);
        }
        Ok(())
    }
}

/// A single detection result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BBox,
    #[serde(deserialize_with = "nan_if_null")]
    pub confidence: f32,
    pub class_label: String,
}

impl Detection {
    pub fn new(bbox: BBox, confidence: f32, class_label: impl Into<String>) -> Self {
        Self {
            bbox,
            confidence,
            class_label: class_label.into(),
        }
    }

    pub fn bbox(&self) -> &BBox {
        &self.bbox
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Reject geometry or scores the tracker cannot use.
    pub fn validate(&self) -> Result<(), DetectionError> {
        self.bbox.check()?;
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(DetectionError::ConfidenceOutOfRange(self.confidence));
        }
        Ok(())
    }
}

/// Decode one frame's detections entry by entry. An entry that is not a
/// detection at all is counted and skipped instead of failing the frame.
pub fn decode_detections(entries: Vec<serde_json::Value>) -> (Vec<Detection>, usize) {
    let mut detections = Vec::with_capacity(entries.len());
    let mut undecodable = 0;
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<Detection>(entry) {
            Ok(det) => detections.push(det),
            Err(err) => {
                tracing::warn!(index, "dropping undecodable detection: {err}");
                undecodable += 1;
            }
        }
    }
    (detections, undecodable)
}

/// Detections that survived validation and filtering, plus what was dropped.
#[derive(Debug, Default)]
pub struct FilteredDetections<'a> {
    pub accepted: Vec<&'a Detection>,
    pub rejected: usize,
    pub filtered: usize,
}

/// Input boundary: malformed detections are rejected, low-confidence or
/// unwanted classes are filtered. Neither case aborts the frame.
pub fn filter_detections<'a>(
    detections: &'a [Detection],
    min_confidence: f32,
    classes: &[String],
) -> FilteredDetections<'a> {
    let mut out = FilteredDetections {
        accepted: Vec::with_capacity(detections.len()),
        ..Default::default()
    };

    for det in detections {
        if let Err(err) = det.validate() {
            tracing::warn!(class = %det.class_label, bbox = ?det.bbox, "dropping detection: {err}");
            out.rejected += 1;
            continue;
        }
        if det.confidence < min_confidence
            || (!classes.is_empty() && !classes.iter().any(|c| c == &det.class_label))
        {
            out.filtered += 1;
            continue;
        }
        out.accepted.push(det);
    }

    out
}
