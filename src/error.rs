use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("min_iou must be within [0, 1], got {0}")]
    MinIou(f32),
    #[error("min_confidence must be within [0, 1], got {0}")]
    MinConfidence(f32),
    #[error("min_hits must be at least 1")]
    MinHits,
    #[error("max_tracks must be at least 1 when set")]
    MaxTracks,
    #[error("frame dimensions must be positive, got {width}x{height}")]
    FrameSize { width: u32, height: u32 },
    #[error("frame {width}x{height} is too small to place the default count lines")]
    FrameTooSmall { width: u32, height: u32 },
    #[error("count line `{0}` has a non-finite endpoint")]
    NonFiniteLine(String),
    #[error("count line `{0}` has coincident endpoints")]
    CoincidentEndpoints(String),
    #[error("count line `{name}` has an invalid margin {margin}")]
    LineMargin { name: String, margin: f32 },
    #[error("count line name `{0}` is used more than once")]
    DuplicateLine(String),
}

/// Why a single detection was dropped at the input boundary.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum DetectionError {
    #[error("bounding box has non-finite coordinates")]
    NonFinite,
    #[error("bounding box is inverted or empty")]
    Inverted,
    #[error("bounding box area overflows")]
    AreaOverflow,
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f32),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("frame {got} arrived out of order, expected frame {expected}")]
    OutOfOrderFrame { expected: u64, got: u64 },
}
