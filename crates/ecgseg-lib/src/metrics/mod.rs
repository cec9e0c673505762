pub mod heart_rate;
pub mod polarity;

pub use heart_rate::{compute_epoch, estimate_bpm, CardiacEpoch};
pub use polarity::{is_flipped, scan_directory, PolarityReport};
