//! Per-connection lifecycle state machine.
//!
//! Wraps [`DeviceState`] with transition validation, time-in-state and a
//! bounded history of recent transitions for diagnostics.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use vitalgate_core::constants::MAX_STATE_HISTORY;
use vitalgate_core::{DeviceState, Error};

/// One recorded state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: DeviceState,
    pub to: DeviceState,
    pub at: Instant,
}

impl StateTransition {
    fn new(from: DeviceState, to: DeviceState) -> Self {
        Self {
            from,
            to,
            at: Instant::now(),
        }
    }
}

/// Enforces the transitions allowed by [`DeviceState::can_transition_to`].
///
/// ```
/// use vitalgate_core::DeviceState;
/// use vitalgate_hardware::state::ConnectionStateMachine;
///
/// let mut machine = ConnectionStateMachine::new();
/// machine.transition_to(DeviceState::Connecting).unwrap();
/// machine.transition_to(DeviceState::Connected).unwrap();
/// assert!(machine.transition_to(DeviceState::Reconnecting).is_err());
/// assert_eq!(machine.history().len(), 2);
/// ```
#[derive(Debug)]
pub struct ConnectionStateMachine {
    current: DeviceState,
    entered_at: Instant,
    history: VecDeque<StateTransition>,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self {
            current: DeviceState::Discovered,
            entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_STATE_HISTORY),
        }
    }

    pub fn current(&self) -> DeviceState {
        self.current
    }

    pub fn time_in_state(&self) -> Duration {
        self.entered_at.elapsed()
    }

    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Move to `target`, recording the transition.
    ///
    /// # Errors
    ///
    /// `Error::InvalidStateTransition` when the move is not allowed; the
    /// machine is left unchanged.
    pub fn transition_to(&mut self, target: DeviceState) -> Result<StateTransition, Error> {
        if !self.current.can_transition_to(&target) {
            return Err(Error::InvalidStateTransition {
                from: self.current.to_string(),
                to: target.to_string(),
            });
        }
        let transition = StateTransition::new(self.current, target);
        self.current = target;
        self.entered_at = transition.at;
        self.history.push_back(transition);
        if self.history.len() > MAX_STATE_HISTORY {
            self.history.pop_front();
        }
        Ok(transition)
    }
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_recovery_cycle() {
        let mut m = ConnectionStateMachine::new();
        for state in [
            DeviceState::Connecting,
            DeviceState::Connected,
            DeviceState::Reading,
            DeviceState::Error,
            DeviceState::Reconnecting,
            DeviceState::Connected,
            DeviceState::Reading,
            DeviceState::Disconnected,
        ] {
            m.transition_to(state).unwrap();
        }
        assert_eq!(m.current(), DeviceState::Disconnected);
        assert_eq!(m.history().len(), 8);
        assert_eq!(m.history()[3].from, DeviceState::Reading);
        assert_eq!(m.history()[3].to, DeviceState::Error);
    }

    #[test]
    fn test_invalid_transition_leaves_state() {
        let mut m = ConnectionStateMachine::new();
        let err = m.transition_to(DeviceState::Reading).unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
        assert_eq!(m.current(), DeviceState::Discovered);
        assert!(m.history().is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut m = ConnectionStateMachine::new();
        m.transition_to(DeviceState::Connecting).unwrap();
        m.transition_to(DeviceState::Connected).unwrap();
        for _ in 0..MAX_STATE_HISTORY {
            m.transition_to(DeviceState::Reading).unwrap();
            m.transition_to(DeviceState::Connected).unwrap();
        }
        assert_eq!(m.history().len(), MAX_STATE_HISTORY);
        assert_eq!(m.history().back().unwrap().to, DeviceState::Connected);
    }
}
