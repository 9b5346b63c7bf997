//! Module Status State Machine
//!
//! A module moves through five states:
//!
//! ```text
//!             fetch            definition
//!   Waiting ---------> Fetching ---------> Waiting
//!      |                  |
//!      | count == 0       | transport error
//!      v                  v
//!    Ready ----------> Error <------- Waiting (dependency failed)
//!      |                  |
//!      v                  | re-define
//!   Success            Waiting
//! ```
//!
//! `Status::transition` only validates a move and reports the effects the
//! caller has to carry out. It never touches the registry itself, so the
//! table below can be tested on its own.

use smallvec::{smallvec, SmallVec};

/// Loading state of a module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    /// Created or (re)defined; dependencies are still outstanding.
    Waiting,
    /// A script fetch is in flight and no definition has arrived yet.
    Fetching,
    /// All dependencies succeeded; the factory is about to run.
    Ready,
    /// The factory produced an export.
    Success,
    /// Fetch, factory, or a dependency failed.
    Error,
}

impl Status {
    /// `Success` and `Error` end a definition's life; dependents have been told.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Success | Status::Error)
    }

    /// Whether a definition can still change the outcome.
    pub fn is_pending(self) -> bool {
        matches!(self, Status::Waiting | Status::Fetching | Status::Ready)
    }

    /// Check whether `self -> to` is a legal move.
    pub fn can_transition(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (Waiting, Fetching)
                | (Waiting, Ready)
                | (Waiting, Error)
                | (Fetching, Waiting)
                | (Fetching, Error)
                | (Ready, Success)
                | (Ready, Error)
                | (Error, Waiting)
        )
    }

    /// Validate `self -> to` and return the effects entering `to` requires.
    pub fn transition(self, to: Status) -> Result<Effects, TransitionError> {
        if !self.can_transition(to) {
            return Err(TransitionError { from: self, to });
        }
        Ok(match to {
            Status::Waiting => SmallVec::new(),
            Status::Fetching => smallvec![Effect::Fetch],
            Status::Ready => smallvec![Effect::InvokeFactory],
            Status::Success => smallvec![Effect::NotifyDependents],
            Status::Error => smallvec![Effect::InvokeErrorHandler, Effect::NotifyDependents],
        })
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Status::Waiting => "waiting",
            Status::Fetching => "fetching",
            Status::Ready => "ready",
            Status::Success => "success",
            Status::Error => "error",
        };
        f.write_str(label)
    }
}

/// Work a transition asks the context to perform, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Ask the transport for the module's script.
    Fetch,
    /// Run the factory with the dependency exports.
    InvokeFactory,
    /// Call the module's own error callback, if it has one.
    InvokeErrorHandler,
    /// Deliver the outcome to every attached dependent and clear the list.
    NotifyDependents,
}

/// Effects produced by a single transition.
pub type Effects = SmallVec<[Effect; 2]>;

/// An attempted move the state machine does not allow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionError {
    pub from: Status,
    pub to: Status,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Illegal status transition: {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for TransitionError {}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Status; 5] = [
        Status::Waiting,
        Status::Fetching,
        Status::Ready,
        Status::Success,
        Status::Error,
    ];

    #[test]
    fn test_fetch_transition_requests_fetch() {
        let effects = Status::Waiting.transition(Status::Fetching).unwrap();
        assert_eq!(effects.as_slice(), &[Effect::Fetch]);
    }

    #[test]
    fn test_ready_invokes_factory() {
        let effects = Status::Waiting.transition(Status::Ready).unwrap();
        assert_eq!(effects.as_slice(), &[Effect::InvokeFactory]);
    }

    #[test]
    fn test_error_reports_then_notifies() {
        let effects = Status::Ready.transition(Status::Error).unwrap();
        assert_eq!(
            effects.as_slice(),
            &[Effect::InvokeErrorHandler, Effect::NotifyDependents]
        );
    }

    #[test]
    fn test_definition_arrival_has_no_effects() {
        let effects = Status::Fetching.transition(Status::Waiting).unwrap();
        assert!(effects.is_empty());
    }

    #[test]
    fn test_success_is_final() {
        for to in ALL {
            assert!(
                !Status::Success.can_transition(to),
                "success -> {} should be rejected",
                to
            );
        }
    }

    #[test]
    fn test_error_only_reopens_through_definition() {
        for to in ALL {
            assert_eq!(Status::Error.can_transition(to), to == Status::Waiting);
        }
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let err = Status::Fetching.transition(Status::Ready).unwrap_err();
        assert_eq!(err.from, Status::Fetching);
        assert_eq!(err.to, Status::Ready);
        assert!(err.to_string().contains("fetching -> ready"));

        assert!(Status::Waiting.transition(Status::Success).is_err());
        assert!(Status::Ready.transition(Status::Waiting).is_err());
        assert!(Status::Waiting.transition(Status::Waiting).is_err());
    }

    #[test]
    fn test_terminal_and_pending_partition() {
        for status in ALL {
            assert_ne!(status.is_terminal(), status.is_pending());
        }
    }
}
