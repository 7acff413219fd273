use crate::config::SessionConfig;
use crate::error::{ConfigError, LogError};
use crate::logger::{FrameLogger, LogRecord, LogSink};
use crate::placer::TargetPlacer;
use crate::sequencer::TrialSequencer;
use fitts_core::{SessionPhase, SessionView};
use fitts_input::RawPointerState;
use fitts_timing::Timer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKey {
    Quit,
    Save,
    Repeat,
    Continue,
}

/// Input the session reacts to, already translated from window events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    PrimaryClick,
    Key(SessionKey),
    CloseRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Ignored,
    Handled,
    Exit,
}

/// Hit counters for the running blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialProgress {
    pub trial_index: usize,
    pub experiment_index: usize,
    /// Target shown to hit, main experiment only
    pub reaction_times: Vec<u64>,
    pub misses: usize,
}

impl TrialProgress {
    pub fn mean_reaction_time_ms(&self) -> Option<f64> {
        if self.reaction_times.is_empty() {
            return None;
        }
        let sum: u64 = self.reaction_times.iter().sum();
        Some(sum as f64 / self.reaction_times.len() as f64)
    }
}

pub struct SessionStateMachine<T: Timer, W: LogSink> {
    phase: SessionPhase,
    config: SessionConfig,
    timer: T,
    pointer: RawPointerState,
    sequencer: TrialSequencer,
    placer: TargetPlacer,
    logger: FrameLogger<W>,
    progress: TrialProgress,
    countdown_started_ms: u64,
}

impl<T: Timer, W: LogSink> SessionStateMachine<T, W> {
    pub fn new(
        config: SessionConfig,
        timer: T,
        pointer: RawPointerState,
        sink: W,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (width, height) = pointer.bounds();
        Ok(Self {
            phase: SessionPhase::StartScreen,
            sequencer: TrialSequencer::from_config(&config),
            placer: TargetPlacer::new(width, height),
            logger: FrameLogger::new(sink),
            progress: TrialProgress::default(),
            countdown_started_ms: 0,
            config,
            timer,
            pointer,
        })
    }

    pub fn handle_event(&mut self, event: SessionEvent) -> Result<EventOutcome, LogError> {
        match event {
            SessionEvent::CloseRequested | SessionEvent::Key(SessionKey::Quit) => {
                tracing::info!(phase = %self.phase, "quit requested");
                self.save()?;
                Ok(EventOutcome::Exit)
            }
            SessionEvent::Key(SessionKey::Save) => {
                self.save()?;
                Ok(EventOutcome::Handled)
            }
            SessionEvent::Key(SessionKey::Repeat) if self.phase == SessionPhase::Transition => {
                self.start_practice();
                Ok(EventOutcome::Handled)
            }
            SessionEvent::Key(SessionKey::Continue) if self.phase.awaits_continue() => {
                if self.phase == SessionPhase::Transition {
                    self.progress.experiment_index = 0;
                    self.progress.reaction_times.clear();
                    self.sequencer.restart_experiment();
                }
                self.start_countdown();
                Ok(EventOutcome::Handled)
            }
            SessionEvent::Key(_) => Ok(EventOutcome::Ignored),
            SessionEvent::PrimaryClick => self.handle_click(),
        }
    }

    fn handle_click(&mut self) -> Result<EventOutcome, LogError> {
        match self.phase {
            SessionPhase::StartScreen => {
                self.start_practice();
                Ok(EventOutcome::Handled)
            }
            SessionPhase::Trial => {
                if !self.register_click() {
                    return Ok(EventOutcome::Handled);
                }
                self.progress.trial_index += 1;
                if self.progress.trial_index >= self.config.practice_targets {
                    self.close_block(self.progress.trial_index);
                    self.set_phase(SessionPhase::Transition);
                } else {
                    self.place_practice_target();
                }
                Ok(EventOutcome::Handled)
            }
            SessionPhase::Experiment => {
                if !self.register_click() {
                    return Ok(EventOutcome::Handled);
                }
                let now = self.timer.ticks_ms();
                self.progress
                    .reaction_times
                    .push(now.saturating_sub(self.placer.shown_at_ms()));
                self.progress.experiment_index += 1;

                let done = self.progress.experiment_index;
                if done >= self.config.total_experiment_targets() {
                    self.close_block(done);
                    self.set_phase(SessionPhase::End);
                    self.save()?;
                } else if done % self.config.break_interval == 0 {
                    self.close_block(done);
                    self.set_phase(SessionPhase::BreakScreen);
                } else {
                    self.place_experiment_target()?;
                }
                Ok(EventOutcome::Handled)
            }
            _ => Ok(EventOutcome::Ignored),
        }
    }

    /// Hit tests the cursor and flags the click for the log. Misses leave
    /// counters and target untouched.
    fn register_click(&mut self) -> bool {
        let (x, y) = self.pointer.snapshot_position();
        let hit = self.placer.current().is_some_and(|t| t.contains(x, y));
        self.logger.mark_click(hit);
        if !hit {
            self.progress.misses += 1;
            tracing::debug!(x, y, phase = %self.phase, "miss");
        }
        hit
    }

    /// Logs the frame of a block-ending hit while the target is still current.
    fn close_block(&mut self, trial_number: usize) {
        let now = self.timer.ticks_ms();
        self.logger
            .log_frame(trial_number, now, &self.pointer, &mut self.placer);
    }

    fn start_practice(&mut self) {
        self.progress.trial_index = 0;
        self.sequencer.restart_practice();
        self.enter_block(SessionPhase::Trial);
        self.place_practice_target();
    }

    fn start_countdown(&mut self) {
        self.countdown_started_ms = self.timer.ticks_ms();
        self.set_phase(SessionPhase::Countdown);
    }

    fn enter_block(&mut self, phase: SessionPhase) {
        self.pointer.reset_frame_delta();
        self.logger.clear_flags();
        self.set_phase(phase);
    }

    fn place_practice_target(&mut self) {
        if let Some(condition) = self.sequencer.next_practice() {
            self.placer.place(condition, self.timer.ticks_ms());
        }
    }

    fn place_experiment_target(&mut self) -> Result<(), LogError> {
        match self.sequencer.next_experiment() {
            Some(condition) => {
                self.placer.place(condition, self.timer.ticks_ms());
                Ok(())
            }
            None => {
                tracing::warn!("main sequence exhausted early");
                self.set_phase(SessionPhase::End);
                self.save().map(|_| ())
            }
        }
    }

    fn set_phase(&mut self, next: SessionPhase) {
        if next != self.phase {
            tracing::info!(from = %self.phase, to = %next, "phase change");
        }
        self.phase = next;
    }

    /// Advances clock-driven phases. Called once per frame.
    pub fn update(&mut self) -> Result<(), LogError> {
        if self.phase == SessionPhase::Countdown
            && self.countdown_remaining_ms() == Some(0)
        {
            self.enter_block(SessionPhase::Experiment);
            self.place_experiment_target()?;
        }
        Ok(())
    }

    pub fn countdown_remaining_ms(&self) -> Option<u64> {
        if self.phase != SessionPhase::Countdown {
            return None;
        }
        let elapsed = self
            .timer
            .ticks_ms()
            .saturating_sub(self.countdown_started_ms);
        Some(self.config.countdown_ms.saturating_sub(elapsed))
    }

    /// Appends this frame's record while a block is running.
    pub fn log_frame(&mut self) -> Option<&LogRecord> {
        let trial_number = match self.phase {
            SessionPhase::Trial => self.progress.trial_index + 1,
            SessionPhase::Experiment => self.progress.experiment_index + 1,
            _ => return None,
        };
        let now = self.timer.ticks_ms();
        self.logger
            .log_frame(trial_number, now, &self.pointer, &mut self.placer)
    }

    /// Writes the log once; later calls are no-ops.
    pub fn save(&mut self) -> Result<bool, LogError> {
        self.logger.save()
    }

    /// Final save plus a summary line.
    pub fn shutdown(&mut self) -> Result<bool, LogError> {
        let written = self.save()?;
        tracing::info!(
            phase = %self.phase,
            completed = self.progress.experiment_index,
            misses = self.progress.misses,
            mean_rt_ms = self.progress.mean_reaction_time_ms().unwrap_or(0.0),
            records = self.logger.records().len(),
            "session finished"
        );
        Ok(written)
    }

    pub fn view(&self) -> SessionView {
        let progress = match self.phase {
            SessionPhase::Trial => Some((
                self.progress.trial_index + 1,
                self.config.practice_targets,
            )),
            SessionPhase::Experiment => Some((
                self.progress.experiment_index + 1,
                self.config.total_experiment_targets(),
            )),
            _ => None,
        };
        SessionView {
            phase: self.phase,
            pointer: self.pointer.snapshot_position(),
            target: self
                .phase
                .is_active()
                .then(|| self.placer.current().copied())
                .flatten(),
            progress,
            countdown_remaining_ms: self.countdown_remaining_ms(),
            completed_targets: self.progress.experiment_index,
            total_targets: self.config.total_experiment_targets(),
            practice_targets: self.config.practice_targets,
            mean_reaction_time_ms: self.progress.mean_reaction_time_ms(),
            log_saved: self.logger.is_saved(),
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.pointer.resize(width, height);
        self.placer.resize(width, height);
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn progress(&self) -> &TrialProgress {
        &self.progress
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn placer(&self) -> &TargetPlacer {
        &self.placer
    }

    pub fn sequencer(&self) -> &TrialSequencer {
        &self.sequencer
    }

    pub fn logger(&self) -> &FrameLogger<W> {
        &self.logger
    }

    pub fn pointer(&self) -> &RawPointerState {
        &self.pointer
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::MemorySink;
    use fitts_timing::ManualTimer;

    fn session() -> SessionStateMachine<ManualTimer, MemorySink> {
        SessionStateMachine::new(
            SessionConfig::default(),
            ManualTimer::new(),
            RawPointerState::new(1920, 1080),
            MemorySink::default(),
        )
        .unwrap()
    }

    fn aim_at_target(s: &SessionStateMachine<ManualTimer, MemorySink>) {
        let t = *s.placer().current().unwrap();
        let (x, y) = s.pointer().position();
        s.pointer().apply_delta(t.x as f64 - x, t.y as f64 - y);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SessionConfig {
            repetitions: 0,
            ..SessionConfig::default()
        };
        let result = SessionStateMachine::new(
            config,
            ManualTimer::new(),
            RawPointerState::new(800, 600),
            MemorySink::default(),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn start_click_places_first_practice_target() {
        let mut s = session();
        assert!(s.view().target.is_none());
        assert_eq!(s.handle_event(SessionEvent::PrimaryClick).unwrap(), EventOutcome::Handled);
        assert_eq!(s.phase(), SessionPhase::Trial);

        let view = s.view();
        let target = view.target.unwrap();
        assert!(target.on_left_side);
        assert_eq!(target.y, 540);
        assert_eq!(view.progress, Some((1, 3)));
    }

    #[test]
    fn keys_outside_their_phase_are_ignored() {
        let mut s = session();
        assert_eq!(
            s.handle_event(SessionEvent::Key(SessionKey::Continue)).unwrap(),
            EventOutcome::Ignored
        );
        assert_eq!(
            s.handle_event(SessionEvent::Key(SessionKey::Repeat)).unwrap(),
            EventOutcome::Ignored
        );
        assert_eq!(s.phase(), SessionPhase::StartScreen);
    }

    #[test]
    fn start_click_is_not_logged_as_a_click() {
        let mut s = session();
        s.handle_event(SessionEvent::PrimaryClick).unwrap();
        let record = s.log_frame().unwrap();
        assert!(!record.clicked);
        assert_eq!(record.trial_number, 1);
    }

    #[test]
    fn hit_records_reaction_time_in_experiment() {
        let mut s = session();
        s.handle_event(SessionEvent::PrimaryClick).unwrap();
        for _ in 0..3 {
            aim_at_target(&s);
            s.handle_event(SessionEvent::PrimaryClick).unwrap();
        }
        s.handle_event(SessionEvent::Key(SessionKey::Continue)).unwrap();
        s.timer().advance_ms(3000);
        s.update().unwrap();
        assert_eq!(s.phase(), SessionPhase::Experiment);

        s.timer().advance_ms(450);
        aim_at_target(&s);
        s.handle_event(SessionEvent::PrimaryClick).unwrap();
        assert_eq!(s.progress().reaction_times, vec![450]);
        assert_eq!(s.view().mean_reaction_time_ms, Some(450.0));
    }

    #[test]
    fn quit_saves_and_exits() {
        let mut s = session();
        assert_eq!(
            s.handle_event(SessionEvent::Key(SessionKey::Quit)).unwrap(),
            EventOutcome::Exit
        );
        assert!(s.logger().is_saved());
        assert_eq!(
            s.handle_event(SessionEvent::CloseRequested).unwrap(),
            EventOutcome::Exit
        );
        assert_eq!(s.logger().sink().writes.len(), 1);
    }

    #[test]
    fn mean_reaction_time() {
        let progress = TrialProgress {
            reaction_times: vec![300, 500, 400],
            ..TrialProgress::default()
        };
        assert_eq!(progress.mean_reaction_time_ms(), Some(400.0));
        assert_eq!(TrialProgress::default().mean_reaction_time_ms(), None);
    }
}
