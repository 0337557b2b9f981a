use crate::CoreError;
use std::fmt;

/// The two long-running repository operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkKind {
    StoreAll,
    RestoreAll,
}

impl fmt::Display for BulkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkKind::StoreAll => write!(f, "store-all"),
            BulkKind::RestoreAll => write!(f, "restore-all"),
        }
    }
}

/// Process-local view of the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationState {
    #[default]
    Idle,
    BulkRunning(BulkKind),
}

impl OperationState {
    #[inline]
    pub fn is_bulk_running(self) -> bool {
        matches!(self, OperationState::BulkRunning(_))
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationState::Idle => write!(f, "idle"),
            OperationState::BulkRunning(kind) => write!(f, "running {kind}"),
        }
    }
}

pub fn validate_transition(from: OperationState, to: OperationState) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (OperationState::Idle, OperationState::BulkRunning(_))
            | (OperationState::BulkRunning(_), OperationState::Idle)
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORE: OperationState = OperationState::BulkRunning(BulkKind::StoreAll);
    const RESTORE: OperationState = OperationState::BulkRunning(BulkKind::RestoreAll);

    #[test]
    fn valid_transitions() {
        assert!(validate_transition(OperationState::Idle, STORE).is_ok());
        assert!(validate_transition(OperationState::Idle, RESTORE).is_ok());
        assert!(validate_transition(STORE, OperationState::Idle).is_ok());
        assert!(validate_transition(RESTORE, OperationState::Idle).is_ok());
    }

    #[test]
    fn invalid_transitions() {
        assert!(validate_transition(OperationState::Idle, OperationState::Idle).is_err());
        assert!(validate_transition(STORE, RESTORE).is_err());
        assert!(validate_transition(STORE, STORE).is_err());
    }

    #[test]
    fn display() {
        assert_eq!(OperationState::Idle.to_string(), "idle");
        assert_eq!(RESTORE.to_string(), "running restore-all");
        let err = validate_transition(STORE, RESTORE).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid state transition: running store-all -> running restore-all"
        );
    }

    #[test]
    fn default_is_idle() {
        assert_eq!(OperationState::default(), OperationState::Idle);
        assert!(!OperationState::default().is_bulk_running());
        assert!(STORE.is_bulk_running());
    }
}
