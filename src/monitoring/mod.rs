//! Run Monitoring Module
//!
//! Tracks when node visits start and finish during a run.
//!
//! # Components
//!
//! - [`ExecutionTimeline`]: Visit start/end timing for Gantt charts

pub mod timeline;

pub use timeline::{EventType, ExecutionTimeline, TimelineEvent};
