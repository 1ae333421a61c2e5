//! Consumer-side run state
//!
//! Tracks a run from the events it emits. Usable by anything reading the
//! NDJSON stream, not only the process runner.

use crate::event::{DeployEvent, Level};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Idle,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunPhase::Succeeded | RunPhase::Failed | RunPhase::Cancelled
        )
    }
}

/// Public result of a run: `success` is exit success AND no failed result line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunState {
    phase: RunPhase,
    failed_result_seen: bool,
    last_error_message: Option<String>,
    events_seen: usize,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Idle,
            failed_result_seen: false,
            last_error_message: None,
            events_seen: 0,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn last_error_message(&self) -> Option<&str> {
        self.last_error_message.as_deref()
    }

    pub fn events_seen(&self) -> usize {
        self.events_seen
    }

    /// Whether a failed result line has been seen, regardless of exit status
    pub fn has_failed_result(&self) -> bool {
        self.failed_result_seen
    }

    /// Begin a run, discarding anything from a previous one
    pub fn start(&mut self) {
        *self = Self::new();
        self.phase = RunPhase::Running;
    }

    pub fn observe(&mut self, event: &DeployEvent) {
        if self.phase.is_terminal() {
            return;
        }
        if self.phase == RunPhase::Idle {
            self.phase = RunPhase::Running;
        }
        self.events_seen += 1;

        let failed_result = event.is_failed_result();
        if failed_result {
            self.failed_result_seen = true;
        }
        if (failed_result || event.level == Level::Error) && !event.message.trim().is_empty() {
            self.last_error_message = Some(event.message.clone());
        }
    }

    /// Settle the run from the exit status
    pub fn finish(&mut self, exit_success: bool) -> RunResult {
        if !self.phase.is_terminal() {
            self.phase = if exit_success && !self.failed_result_seen {
                RunPhase::Succeeded
            } else {
                RunPhase::Failed
            };
        }
        self.result()
    }

    pub fn cancel(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = RunPhase::Cancelled;
        }
    }

    pub fn result(&self) -> RunResult {
        RunResult {
            success: self.phase == RunPhase::Succeeded,
            last_error_message: self.last_error_message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ResultStatus;

    #[test]
    fn test_success_requires_clean_exit_and_no_failed_result() {
        let mut state = RunState::new();
        state.start();
        state.observe(&DeployEvent::info("working"));
        assert_eq!(state.finish(true), RunResult { success: true, last_error_message: None });

        let mut state = RunState::new();
        state.start();
        state.observe(&DeployEvent::result(ResultStatus::Error, "stack failed"));
        let result = state.finish(true);
        assert!(!result.success);
        assert_eq!(result.last_error_message.as_deref(), Some("stack failed"));
        assert_eq!(state.phase(), RunPhase::Failed);

        let mut state = RunState::new();
        state.start();
        assert!(!state.finish(false).success);
    }

    #[test]
    fn test_last_error_wins() {
        let mut state = RunState::new();
        state.observe(&DeployEvent::error("first"));
        state.observe(&DeployEvent::warn("not an error"));
        state.observe(&DeployEvent::error("second"));
        assert_eq!(state.phase(), RunPhase::Running);
        assert_eq!(state.last_error_message(), Some("second"));
        assert_eq!(state.events_seen(), 3);
    }

    #[test]
    fn test_failed_result_message_is_the_error_at_any_level() {
        let mut state = RunState::new();
        state.start();
        state.observe(&DeployEvent::error("unrelated stderr"));
        state.observe(&DeployEvent::from_line(
            r#"{"type":"result","status":"error","level":"info","message":"Stack rolled back"}"#,
        ));
        let result = state.finish(true);
        assert!(!result.success);
        assert_eq!(result.last_error_message.as_deref(), Some("Stack rolled back"));
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        let mut state = RunState::new();
        state.start();
        state.cancel();
        state.observe(&DeployEvent::error("late"));
        assert_eq!(state.phase(), RunPhase::Cancelled);
        assert!(!state.finish(true).success);
        assert_eq!(state.events_seen(), 0);
    }

    #[test]
    fn test_restart_clears_previous_run() {
        let mut state = RunState::new();
        state.start();
        state.observe(&DeployEvent::error("old"));
        state.finish(false);

        state.start();
        assert_eq!(state.phase(), RunPhase::Running);
        assert!(state.last_error_message().is_none());
    }

    #[test]
    fn test_result_wire_shape() {
        let json = serde_json::to_value(RunResult {
            success: false,
            last_error_message: Some("boom".to_string()),
        })
        .unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["lastErrorMessage"], "boom");
    }
}
