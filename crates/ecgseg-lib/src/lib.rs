pub mod config;
pub mod detectors;
pub mod error;
pub mod io;
pub mod metrics;
pub mod segment;
pub mod signal;
pub mod source;

pub use config::*;
pub use detectors::*;
pub use error::*;
pub use metrics::*;
pub use segment::*;
pub use signal::*;
pub use source::*;
