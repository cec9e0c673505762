pub mod ecg;

pub use ecg::{PanTompkinsDetector, PeakDetectorConfig, RPeakDetector};
