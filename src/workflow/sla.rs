// SLA clock accounting across pause/resume boundaries.

use chrono::{DateTime, Utc};

use super::transitions::TransitionTable;
use super::types::WorkflowState;

/// The SLA fields an entity should carry after crossing a transition
/// boundary. Computed purely from (table, from, to, now, current fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlaFields {
    pub sla_paused_at: Option<DateTime<Utc>>,
    pub cumulative_paused_seconds: i64,
}

/// Apply the pause/resume rules for a `from -> to` transition.
///
/// Entering a pause-flagged state stamps `sla_paused_at` unless the clock is
/// already paused (pause-to-pause moves keep the original stamp). Leaving
/// pause into a non-paused state folds the elapsed interval into the
/// cumulative counter and clears the stamp. The counter is clamped so clock
/// skew can never drive it backwards.
pub fn apply_boundary<S: WorkflowState>(
    table: &TransitionTable<S>,
    from: S,
    to: S,
    now: DateTime<Utc>,
    sla_paused_at: Option<DateTime<Utc>>,
    cumulative_paused_seconds: i64,
) -> SlaFields {
    let entering_pause = table.pauses_sla(to);
    let leaving_pause = table.pauses_sla(from) && !entering_pause;

    if entering_pause {
        SlaFields {
            sla_paused_at: sla_paused_at.or(Some(now)),
            cumulative_paused_seconds,
        }
    } else if leaving_pause {
        let elapsed = sla_paused_at
            .map(|paused_at| (now - paused_at).num_seconds().max(0))
            .unwrap_or(0);
        SlaFields {
            sla_paused_at: None,
            cumulative_paused_seconds: cumulative_paused_seconds + elapsed,
        }
    } else {
        SlaFields {
            sla_paused_at,
            cumulative_paused_seconds,
        }
    }
}
