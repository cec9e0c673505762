pub mod aggregate;
pub mod dataset;
pub mod window;

pub use aggregate::{aggregate, Window, WindowSummary};
pub use dataset::{Segment, SegmentDatasetBuilder};
pub use window::{EvaluatedWindow, SlidingWindowSegmenter, Step};
