pub mod association;
pub mod config;
pub mod counter;
pub mod detection;
pub mod engine;
pub mod error;
pub mod kalman_filter;
pub mod track;
pub mod tracker;
pub mod utils;

// Re-export main types
pub use crate::config::Config;
pub use crate::counter::{CountLine, CrossingCounter, CrossingDirection, CrossingEvent, Point};
pub use crate::detection::{BBox, Detection};
pub use crate::engine::{CountingEngine, FrameReport};
pub use crate::error::{ConfigError, DetectionError, TrackError};
pub use crate::kalman_filter::{ConstantVelocity, MotionModel};
pub use crate::track::{TrackId, TrackSnapshot, TrackStatus};
pub use crate::tracker::TrackRegistry;
