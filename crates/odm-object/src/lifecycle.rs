//! Two-phase initialisation state machine
//!
//! ```text
//! Constructed -> SyncInitDone -> Ready
//!                             -> Failed
//! ```
//!
//! `Ready` and `Failed` are terminal for a generation. Replacing the
//! serialized value starts a new generation from `Constructed`.

use crate::error::{ObjectError, ObjectResult};
use std::sync::Arc;

/// Lifecycle state of a domain object
#[derive(Debug, Clone)]
pub enum Lifecycle {
    Constructed,
    SyncInitDone,
    Ready,
    Failed(Arc<ObjectError>),
}

impl Lifecycle {
    /// Discriminant without payload
    #[inline]
    #[must_use]
    pub fn phase(&self) -> Phase {
        match self {
            Self::Constructed => Phase::Constructed,
            Self::SyncInitDone => Phase::SyncInitDone,
            Self::Ready => Phase::Ready,
            Self::Failed(_) => Phase::Failed,
        }
    }

    /// Initialisation has finished, successfully or not
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed(_))
    }
}

/// Payload-free lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Constructed,
    SyncInitDone,
    Ready,
    Failed,
}

/// Phases reachable from `from`
#[must_use]
pub fn allowed_transitions(from: Phase) -> &'static [Phase] {
    use Phase::{Constructed, Failed, Ready, SyncInitDone};
    match from {
        Constructed => &[SyncInitDone],
        // Constructed again when replaced before the async phase settles
        SyncInitDone => &[Ready, Failed, Constructed],
        Ready | Failed => &[Constructed],
    }
}

/// Validates a lifecycle transition
///
/// # Errors
/// Returns `IllegalTransition` if `to` is not reachable from `from`
pub fn validate_transition(from: Phase, to: Phase) -> ObjectResult<()> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(ObjectError::IllegalTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_path_is_allowed() {
        assert!(validate_transition(Phase::Constructed, Phase::SyncInitDone).is_ok());
        assert!(validate_transition(Phase::SyncInitDone, Phase::Ready).is_ok());
        assert!(validate_transition(Phase::SyncInitDone, Phase::Failed).is_ok());
    }

    #[test]
    fn sync_phase_cannot_be_skipped() {
        assert!(validate_transition(Phase::Constructed, Phase::Ready).is_err());
        assert!(validate_transition(Phase::Constructed, Phase::Failed).is_err());
    }

    #[test]
    fn terminal_states_only_restart() {
        for terminal in [Phase::Ready, Phase::Failed] {
            assert_eq!(allowed_transitions(terminal), &[Phase::Constructed]);
            assert!(validate_transition(terminal, Phase::SyncInitDone).is_err());
        }
    }

    #[test]
    fn lifecycle_phase_mapping() {
        let failed = Lifecycle::Failed(Arc::new(ObjectError::init("boom")));
        assert_eq!(failed.phase(), Phase::Failed);
        assert!(failed.is_terminal());
        assert!(!Lifecycle::SyncInitDone.is_terminal());
    }
}
