pub mod detector;
pub mod ranker;
pub mod types;

pub use detector::{detect, detect_with_stats};
pub use ranker::{rank, top};
pub use types::{DEFAULT_MIN_PROFIT_PCT, DEFAULT_TIME_WINDOW_SECS, Detection, DetectorConfig};
