use thiserror::Error;

/// High-level phases a session can be in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Accepting joins; teams can still be rebalanced.
    Lobby,
    /// Question generation is in flight; joins are still admitted but no
    /// round may start.
    Preparing,
    /// A round has a live deadline.
    Running,
    /// Deadline suspended with the remaining time preserved.
    Paused(PauseReason),
    /// Terminal; summary and history are read-only thereafter.
    Finished(FinishReason),
}

impl SessionPhase {
    /// Wire label for snapshots and the directory.
    pub fn label(&self) -> &'static str {
        match self {
            SessionPhase::Lobby => "lobby",
            SessionPhase::Preparing => "preparing",
            SessionPhase::Running => "running",
            SessionPhase::Paused(_) => "paused",
            SessionPhase::Finished(_) => "finished",
        }
    }
}

/// Why a session entered the paused state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    /// The host explicitly paused the match.
    HostRequest,
    /// The host's transport dropped; a grace window is running.
    HostDisconnected,
    /// The current round has no question material; host intervention needed.
    MissingQuestion,
}

impl PauseReason {
    /// Wire label for snapshots.
    pub fn label(self) -> &'static str {
        match self {
            PauseReason::HostRequest => "host_request",
            PauseReason::HostDisconnected => "host_disconnected",
            PauseReason::MissingQuestion => "missing_question",
        }
    }
}

/// Why a session reached the finished state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Every planned round resolved.
    PlanCompleted,
    /// The host stopped the match early.
    ManualStop,
}

impl FinishReason {
    /// Wire label for snapshots and summaries.
    pub fn label(self) -> &'static str {
        match self {
            FinishReason::PlanCompleted => "plan_completed",
            FinishReason::ManualStop => "manual_stop",
        }
    }
}

/// Events that can be applied to the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Host starts the match from the lobby.
    StartRequested,
    /// The full question set has been applied; rounds may begin.
    QuestionsReady,
    /// Suspend the live deadline.
    Pause(PauseReason),
    /// Resume after a pause, restoring the remaining deadline.
    Resume,
    /// Terminate the match.
    Finish(FinishReason),
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the machine was in when the invalid event was received.
    pub from: SessionPhase,
    /// The event that cannot be applied from this phase.
    pub event: SessionEvent,
}

/// State machine sequencing a session from lobby to finished.
///
/// Writers are already serialized by the per-session lock, so transitions
/// validate and commit in one step; the version counter lets snapshot
/// consumers detect staleness.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    phase: SessionPhase,
    version: usize,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Lobby,
            version: 0,
        }
    }
}

impl SessionMachine {
    /// Create a new machine initialised in the lobby.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    /// Version counter, incremented on every committed transition.
    pub fn version(&self) -> usize {
        self.version
    }

    /// True while the terminal phase has not been reached.
    pub fn is_live(&self) -> bool {
        !matches!(self.phase, SessionPhase::Finished(_))
    }

    /// Validate and commit a transition, returning the new phase.
    pub fn apply(&mut self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.phase = next.clone();
        self.version += 1;
        Ok(next)
    }

    /// Compute the phase an event would lead to, without committing.
    fn compute_transition(&self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = match (self.phase.clone(), event) {
            (SessionPhase::Lobby, SessionEvent::StartRequested) => SessionPhase::Preparing,
            (SessionPhase::Preparing, SessionEvent::QuestionsReady) => SessionPhase::Running,
            (SessionPhase::Running, SessionEvent::Pause(reason)) => SessionPhase::Paused(reason),
            // A host drop or generation failure while still preparing parks
            // the session instead of tearing it down.
            (SessionPhase::Preparing, SessionEvent::Pause(reason)) => SessionPhase::Paused(reason),
            (SessionPhase::Paused(_), SessionEvent::Resume) => SessionPhase::Running,
            (SessionPhase::Running, SessionEvent::Finish(reason))
            | (SessionPhase::Paused(_), SessionEvent::Finish(reason))
            | (SessionPhase::Preparing, SessionEvent::Finish(reason)) => {
                SessionPhase::Finished(reason)
            }
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut SessionMachine, event: SessionEvent) -> SessionPhase {
        sm.apply(event).unwrap()
    }

    #[test]
    fn initial_state_is_lobby() {
        let sm = SessionMachine::new();
        assert_eq!(sm.phase(), &SessionPhase::Lobby);
        assert!(sm.is_live());
    }

    #[test]
    fn full_happy_path_through_match() {
        let mut sm = SessionMachine::new();

        assert_eq!(
            apply(&mut sm, SessionEvent::StartRequested),
            SessionPhase::Preparing
        );
        assert_eq!(
            apply(&mut sm, SessionEvent::QuestionsReady),
            SessionPhase::Running
        );
        assert_eq!(
            apply(&mut sm, SessionEvent::Pause(PauseReason::HostRequest)),
            SessionPhase::Paused(PauseReason::HostRequest)
        );
        assert_eq!(apply(&mut sm, SessionEvent::Resume), SessionPhase::Running);
        assert_eq!(
            apply(&mut sm, SessionEvent::Finish(FinishReason::PlanCompleted)),
            SessionPhase::Finished(FinishReason::PlanCompleted)
        );
        assert!(!sm.is_live());
    }

    #[test]
    fn host_disconnect_pauses_while_preparing() {
        let mut sm = SessionMachine::new();
        apply(&mut sm, SessionEvent::StartRequested);

        assert_eq!(
            apply(&mut sm, SessionEvent::Pause(PauseReason::HostDisconnected)),
            SessionPhase::Paused(PauseReason::HostDisconnected)
        );
    }

    #[test]
    fn pause_reason_is_preserved() {
        let mut sm = SessionMachine::new();
        apply(&mut sm, SessionEvent::StartRequested);
        apply(&mut sm, SessionEvent::QuestionsReady);
        apply(&mut sm, SessionEvent::Pause(PauseReason::MissingQuestion));

        match sm.phase() {
            SessionPhase::Paused(reason) => assert_eq!(*reason, PauseReason::MissingQuestion),
            other => panic!("expected paused phase, got {other:?}"),
        }
    }

    #[test]
    fn finish_from_paused_is_allowed() {
        let mut sm = SessionMachine::new();
        apply(&mut sm, SessionEvent::StartRequested);
        apply(&mut sm, SessionEvent::QuestionsReady);
        apply(&mut sm, SessionEvent::Pause(PauseReason::HostRequest));

        assert_eq!(
            apply(&mut sm, SessionEvent::Finish(FinishReason::ManualStop)),
            SessionPhase::Finished(FinishReason::ManualStop)
        );
    }

    #[test]
    fn rounds_cannot_start_from_lobby() {
        let mut sm = SessionMachine::new();
        let err = sm.apply(SessionEvent::QuestionsReady).unwrap_err();
        assert_eq!(err.from, SessionPhase::Lobby);
        assert_eq!(err.event, SessionEvent::QuestionsReady);
    }

    #[test]
    fn finished_is_terminal() {
        let mut sm = SessionMachine::new();
        apply(&mut sm, SessionEvent::StartRequested);
        apply(&mut sm, SessionEvent::QuestionsReady);
        apply(&mut sm, SessionEvent::Finish(FinishReason::PlanCompleted));

        assert!(sm.apply(SessionEvent::Resume).is_err());
        assert!(
            sm.apply(SessionEvent::Pause(PauseReason::HostRequest))
                .is_err()
        );
    }

    #[test]
    fn version_increments_on_each_transition() {
        let mut sm = SessionMachine::new();
        assert_eq!(sm.version(), 0);
        apply(&mut sm, SessionEvent::StartRequested);
        assert_eq!(sm.version(), 1);
        apply(&mut sm, SessionEvent::QuestionsReady);
        assert_eq!(sm.version(), 2);
    }
}
