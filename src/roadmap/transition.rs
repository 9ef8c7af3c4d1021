//! Status state machine for roadmap milestones.
//!
//! | From      | Allowed next                                 |
//! |-----------|----------------------------------------------|
//! | pending   | pending, active, paused, blocked, completed  |
//! | active    | active, paused, blocked, completed           |
//! | paused    | paused, active, blocked, completed           |
//! | blocked   | blocked, active, paused, completed           |
//! | completed | completed                                    |

use crate::models::RoadmapStatus;
use crate::{Error, Result};

/// Statuses reachable from `from`, including staying put.
pub fn allowed_transitions(from: RoadmapStatus) -> &'static [RoadmapStatus] {
    use crate::models::RoadmapStatus::*;
    match from {
        Pending => &[Pending, Active, Paused, Blocked, Completed],
        Active => &[Active, Paused, Blocked, Completed],
        Paused => &[Paused, Active, Blocked, Completed],
        Blocked => &[Blocked, Active, Paused, Completed],
        Completed => &[Completed],
    }
}

/// Check that `from -> to` is a legal move.
pub fn validate_transition(from: RoadmapStatus, to: RoadmapStatus) -> Result<()> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
