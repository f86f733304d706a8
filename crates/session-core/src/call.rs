//! # Call State Machine
//!
//! ```text
//! Created ──ring──▶ Ringing ──answer──▶ Answered ──ack──▶ Active ◀──┐
//!    │                 │                    │                │      │ transfer
//!    └──fail──▶ Failed ◀┘                    │                ▼      │ done/failed
//!                                            │           Transferring┘
//!                 Terminated ◀──hangup───────┴────────────────┘
//! ```
//!
//! Transitions are pure: the caller supplies the current instant so that
//! timing rules (the early-disconnect window in particular) can be tested
//! without a clock.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{Result, SessionError};
use crate::routing::Destination;

/// Lifecycle state of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Created,
    Ringing,
    Answered,
    Active,
    Transferring,
    Terminated,
    Failed,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CallState::Terminated | CallState::Failed)
    }

    /// Media is flowing between both legs
    pub fn is_established(self) -> bool {
        matches!(self, CallState::Active | CallState::Transferring)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CallState::Created => "created",
            CallState::Ringing => "ringing",
            CallState::Answered => "answered",
            CallState::Active => "active",
            CallState::Transferring => "transferring",
            CallState::Terminated => "terminated",
            CallState::Failed => "failed",
        })
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallEvent {
    Ring,
    Answer,
    Acknowledge,
    TransferStart,
    TransferComplete,
    TransferFailed,
    Hangup,
    Fail,
}

impl fmt::Display for CallEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CallEvent::Ring => "ring",
            CallEvent::Answer => "answer",
            CallEvent::Acknowledge => "acknowledge",
            CallEvent::TransferStart => "transfer_start",
            CallEvent::TransferComplete => "transfer_complete",
            CallEvent::TransferFailed => "transfer_failed",
            CallEvent::Hangup => "hangup",
            CallEvent::Fail => "fail",
        })
    }
}

/// Why a call ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    CallerHangup,
    CalleeHangup,
    Cancelled,
    NoRoute,
    NotAcceptable,
    Rejected { status: u16 },
    MediaUnavailable,
    Timeout,
    CollaboratorFailed,
    LocalHangup,
    Shutdown,
}

/// What to do with a teardown request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownDecision {
    /// Spurious early BYE from an interactive call; answer it, keep the call
    Suppressed,
    /// Retransmission of a BYE that was already suppressed
    Retransmission,
    Terminate,
}

/// One end-to-end conversation
#[derive(Debug, Clone)]
pub struct Call {
    pub call_id: String,
    pub from: String,
    pub to: String,
    pub dialed: String,
    pub destination: Destination,
    state: CallState,
    pub created_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<EndReason>,
    pub transfer_target: Option<String>,
    /// Session clock instant the call entered `Active`
    active_since: Option<Instant>,
    /// When the first teardown request was observed and suppressed
    pub first_disconnect_at: Option<Instant>,
    suppressed_cseq: Option<u32>,
}

impl Call {
    pub fn new(
        call_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        dialed: impl Into<String>,
        destination: Destination,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            from: from.into(),
            to: to.into(),
            dialed: dialed.into(),
            destination,
            state: CallState::Created,
            created_at: Utc::now(),
            answered_at: None,
            ended_at: None,
            end_reason: None,
            transfer_target: None,
            active_since: None,
            first_disconnect_at: None,
            suppressed_cseq: None,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn active_since(&self) -> Option<Instant> {
        self.active_since
    }

    /// Apply `event`, returning the new state
    pub fn apply(&mut self, event: CallEvent, now: Instant) -> Result<CallState> {
        use CallEvent::*;
        use CallState::*;

        let next = match (self.state, event) {
            (Created, Ring) => Ringing,
            (Ringing, Answer) => Answered,
            (Answered, Acknowledge) => Active,
            (Active, TransferStart) => Transferring,
            (Transferring, TransferComplete) | (Transferring, TransferFailed) => Active,
            (Created | Ringing | Answered, Fail) => Failed,
            (Created | Ringing | Answered | Active | Transferring, Hangup) => Terminated,
            (from, event) => return Err(SessionError::InvalidTransition { from, event }),
        };

        match next {
            Answered => self.answered_at = Some(Utc::now()),
            Active if self.state == Answered => self.active_since = Some(now),
            Terminated | Failed => self.ended_at = Some(Utc::now()),
            _ => {}
        }
        debug!(call_id = %self.call_id, from = %self.state, to = %next, %event, "call state transition");
        self.state = next;
        Ok(next)
    }

    /// Move to a terminal state, recording why
    pub fn end(&mut self, reason: EndReason, now: Instant) -> Result<CallState> {
        let event = match self.state {
            CallState::Created | CallState::Ringing => match reason {
                EndReason::Cancelled
                | EndReason::CallerHangup
                | EndReason::LocalHangup
                | EndReason::Shutdown => CallEvent::Hangup,
                _ => CallEvent::Fail,
            },
            _ => CallEvent::Hangup,
        };
        let state = self.apply(event, now)?;
        self.end_reason = Some(reason);
        Ok(state)
    }

    /// Decide whether a BYE with `cseq` arriving at `now` ends the call.
    ///
    /// Interactive destinations suppress the first BYE seen within `window`
    /// of entering `Active`. Retransmissions of that BYE are absorbed; any
    /// later BYE is honored.
    pub fn on_teardown_request(&mut self, cseq: u32, now: Instant, window: Duration) -> TeardownDecision {
        if self.suppressed_cseq == Some(cseq) {
            return TeardownDecision::Retransmission;
        }
        let in_window = self
            .active_since
            .map_or(false, |since| now.saturating_duration_since(since) < window);
        if self.state.is_established()
            && self.destination.is_interactive()
            && self.suppressed_cseq.is_none()
            && in_window
        {
            self.first_disconnect_at = Some(now);
            self.suppressed_cseq = Some(cseq);
            info!(
                call_id = %self.call_id,
                destination = %self.destination,
                cseq,
                "suppressed early teardown request"
            );
            return TeardownDecision::Suppressed;
        }
        TeardownDecision::Terminate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const WINDOW: Duration = Duration::from_secs(2);

    fn call(destination: Destination) -> Call {
        Call::new("c1@10.0.0.5", "sip:1001@pbx", "sip:0@pbx", "0", destination)
    }

    fn active(destination: Destination, at: Instant) -> Call {
        let mut call = call(destination);
        call.apply(CallEvent::Ring, at).unwrap();
        call.apply(CallEvent::Answer, at).unwrap();
        call.apply(CallEvent::Acknowledge, at).unwrap();
        call
    }

    #[test]
    fn happy_path() {
        let t0 = Instant::now();
        let mut call = active(Destination::AutoAttendant, t0);
        assert_eq!(call.state(), CallState::Active);
        assert!(call.answered_at.is_some());
        assert_eq!(call.active_since(), Some(t0));
        assert_eq!(call.end(EndReason::CallerHangup, t0).unwrap(), CallState::Terminated);
        assert_eq!(call.end_reason, Some(EndReason::CallerHangup));
        assert!(call.ended_at.is_some());
    }

    #[test]
    fn transfer_returns_to_active() {
        let t0 = Instant::now();
        let mut call = active(Destination::Extension { number: "1001".into() }, t0);
        call.apply(CallEvent::TransferStart, t0).unwrap();
        assert_eq!(call.apply(CallEvent::TransferFailed, t0).unwrap(), CallState::Active);
        call.apply(CallEvent::TransferStart, t0).unwrap();
        assert_eq!(call.apply(CallEvent::TransferComplete, t0).unwrap(), CallState::Active);
        // leaving Transferring keeps the original activation instant
        assert_eq!(call.active_since(), Some(t0));
    }

    #[test]
    fn setup_failures() {
        let t0 = Instant::now();
        let mut call = call(Destination::AutoAttendant);
        call.apply(CallEvent::Ring, t0).unwrap();
        assert_eq!(call.end(EndReason::NotAcceptable, t0).unwrap(), CallState::Failed);

        let mut cancelled = self::call(Destination::AutoAttendant);
        cancelled.apply(CallEvent::Ring, t0).unwrap();
        assert_eq!(cancelled.end(EndReason::Cancelled, t0).unwrap(), CallState::Terminated);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let t0 = Instant::now();
        let mut call = call(Destination::AutoAttendant);
        let err = call.apply(CallEvent::Acknowledge, t0).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidTransition {
                from: CallState::Created,
                event: CallEvent::Acknowledge
            }
        ));
        assert_eq!(call.state(), CallState::Created);
    }

    #[test]
    fn early_bye_on_ivr_call_is_suppressed_once() {
        let t0 = Instant::now();
        let mut call = active(Destination::AutoAttendant, t0);

        let early = t0 + Duration::from_millis(150);
        assert_eq!(call.on_teardown_request(2, early, WINDOW), TeardownDecision::Suppressed);
        assert_eq!(call.state(), CallState::Active);
        assert_eq!(call.first_disconnect_at, Some(early));

        assert_eq!(
            call.on_teardown_request(2, t0 + Duration::from_millis(400), WINDOW),
            TeardownDecision::Retransmission
        );
        assert_eq!(
            call.on_teardown_request(3, t0 + Duration::from_secs(5), WINDOW),
            TeardownDecision::Terminate
        );
    }

    #[test]
    fn second_bye_inside_window_is_honored() {
        let t0 = Instant::now();
        let mut call = active(Destination::Voicemail { mailbox: None }, t0);
        assert_eq!(
            call.on_teardown_request(2, t0 + Duration::from_millis(100), WINDOW),
            TeardownDecision::Suppressed
        );
        assert_eq!(
            call.on_teardown_request(3, t0 + Duration::from_millis(300), WINDOW),
            TeardownDecision::Terminate
        );
    }

    #[test]
    fn extension_calls_honor_first_bye() {
        let t0 = Instant::now();
        let mut call = active(Destination::Extension { number: "1002".into() }, t0);
        assert_eq!(
            call.on_teardown_request(2, t0 + Duration::from_millis(150), WINDOW),
            TeardownDecision::Terminate
        );
    }

    #[test]
    fn late_bye_on_ivr_call_is_honored() {
        let t0 = Instant::now();
        let mut call = active(Destination::AutoAttendant, t0);
        assert_eq!(
            call.on_teardown_request(2, t0 + Duration::from_secs(3), WINDOW),
            TeardownDecision::Terminate
        );
    }

    fn any_event() -> impl Strategy<Value = CallEvent> {
        prop_oneof![
            Just(CallEvent::Ring),
            Just(CallEvent::Answer),
            Just(CallEvent::Acknowledge),
            Just(CallEvent::TransferStart),
            Just(CallEvent::TransferComplete),
            Just(CallEvent::TransferFailed),
            Just(CallEvent::Hangup),
            Just(CallEvent::Fail),
        ]
    }

    proptest! {
        #[test]
        fn terminal_states_are_final(events in proptest::collection::vec(any_event(), 0..24)) {
            let t0 = Instant::now();
            let mut call = call(Destination::AutoAttendant);
            let mut ended = false;
            for event in events {
                let before = call.state();
                let result = call.apply(event, t0);
                if ended {
                    prop_assert!(result.is_err());
                    prop_assert_eq!(call.state(), before);
                }
                if call.state().is_terminal() {
                    ended = true;
                }
            }
        }
    }
}
