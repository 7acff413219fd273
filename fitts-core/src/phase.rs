use serde::Serialize;
use std::fmt;

/// Phases of a pointing session, in protocol order
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum SessionPhase {
    StartScreen,
    Trial,
    Transition,
    Countdown,
    Experiment,
    BreakScreen,
    End,
}

impl Default for SessionPhase {
    fn default() -> Self {
        SessionPhase::StartScreen
    }
}

impl SessionPhase {
    /// A target is on screen and every frame is logged.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Trial | Self::Experiment)
    }

    pub fn is_practice(&self) -> bool {
        matches!(self, Self::Trial)
    }

    pub fn is_experiment(&self) -> bool {
        matches!(self, Self::Experiment)
    }

    /// Phases that react to the "continue" key.
    pub fn awaits_continue(&self) -> bool {
        matches!(self, Self::Transition | Self::BreakScreen)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::StartScreen => "start",
            Self::Trial => "trial",
            Self::Transition => "transition",
            Self::Countdown => "countdown",
            Self::Experiment => "experiment",
            Self::BreakScreen => "break",
            Self::End => "end",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
