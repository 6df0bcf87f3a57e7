//! Lab lifecycle rules
//!
//! A participant's lab starts with its first finished step and completes once
//! every step required in the session mode is done. Completion sticks: no step
//! action moves a completed lab back. A reset does, and always lands on
//! `not-started`.

use crate::error::AccessError;
use labsync_model::LabState;

/// Something that moves a lab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabChange {
    /// First step finished
    Start,
    /// Last required step finished
    Finish,
    /// Progress on the lab cleared
    Reset,
}

impl LabChange {
    /// State the change leads to
    #[inline]
    #[must_use]
    pub fn target(self) -> LabState {
        match self {
            Self::Start => LabState::InProgress,
            Self::Finish => LabState::Completed,
            Self::Reset => LabState::NotStarted,
        }
    }
}

/// Apply `change` to a lab in state `from`
///
/// Finishing an unstarted lab is allowed for labs whose only required step is
/// the one just done. Resetting an unstarted lab is a no-op.
///
/// # Errors
/// [`AccessError::IllegalTransition`] when starting a lab twice or touching a
/// completed lab with anything but a reset
pub fn apply_change(from: LabState, change: LabChange) -> Result<LabState, AccessError> {
    use LabState::{InProgress, NotStarted};

    let to = change.target();
    match (from, change) {
        (NotStarted, LabChange::Start) | (NotStarted | InProgress, LabChange::Finish) | (_, LabChange::Reset) => {
            Ok(to)
        }
        _ => Err(AccessError::IllegalTransition { from, to }),
    }
}

/// States a lab in `from` can move to
#[must_use]
pub fn allowed_transitions(from: LabState) -> Vec<LabState> {
    [LabChange::Start, LabChange::Finish, LabChange::Reset]
        .into_iter()
        .filter_map(|change| apply_change(from, change).ok())
        .filter(|&to| to != from)
        .collect()
}
