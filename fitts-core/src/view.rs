use crate::{SessionPhase, Target};

/// Read-only snapshot of a session handed to the renderer each frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionView {
    pub phase: SessionPhase,
    pub pointer: (i32, i32),
    pub target: Option<Target>,
    /// (current 1-based trial, total) while a block is running
    pub progress: Option<(usize, usize)>,
    pub countdown_remaining_ms: Option<u64>,
    pub completed_targets: usize,
    pub total_targets: usize,
    pub practice_targets: usize,
    pub mean_reaction_time_ms: Option<f64>,
    pub log_saved: bool,
}
