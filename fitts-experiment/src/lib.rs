pub mod config;
pub mod error;
pub mod logger;
pub mod placer;
pub mod sequencer;
pub mod state;

pub use config::SessionConfig;
pub use error::{ConfigError, LogError};
pub use logger::{CsvFileSink, FrameLogger, LogRecord, LogSink, MemorySink};
pub use placer::TargetPlacer;
pub use sequencer::TrialSequencer;
pub use state::{EventOutcome, SessionEvent, SessionKey, SessionStateMachine, TrialProgress};
