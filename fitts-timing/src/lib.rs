pub mod frame;
pub mod timer;

pub use frame::{CalibrationStats, FrameLimiter};
pub use timer::{HighPrecisionTimer, ManualTimer, Timer};
