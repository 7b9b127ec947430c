//! The job status graph shared by collection requests and orders.
//!
//! ```text
//! pending -> assigned -> in_progress -> completed
//!               |             |
//!               +-> cancelled <-+
//! ```
//!
//! `pending -> assigned` only happens through a partner claim, never through a
//! plain status update.

use crate::domain::actor::{Actor, Role};
use crate::error::{LogisticsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Assigned,
        JobStatus::InProgress,
        JobStatus::Completed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Assigned => "assigned",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Statuses in which a pickup partner must be attached to the job.
    pub fn requires_partner(&self) -> bool {
        matches!(
            self,
            JobStatus::Assigned | JobStatus::InProgress | JobStatus::Completed
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }

    /// Whether the price may still change.
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = LogisticsError;

    fn from_str(s: &str) -> Result<Self> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| LogisticsError::ValidationError(format!("Unknown status '{s}'")))
    }
}

/// The transition table. Total over every pair; anything not listed is denied.
pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;
    matches!(
        (from, to),
        (Pending, Assigned)
            | (Assigned, InProgress)
            | (Assigned, Cancelled)
            | (InProgress, Completed)
            | (InProgress, Cancelled)
    )
}

/// Checks a status update requested by `actor` against the graph and the role gate.
///
/// The claim edge is rejected here because it is only reachable through
/// [`crate::application::lifecycle::LifecycleManager::claim`].
pub fn validate_update(
    from: JobStatus,
    to: JobStatus,
    actor: &Actor,
    owner: uuid::Uuid,
    partner: Option<uuid::Uuid>,
) -> Result<()> {
    let is_owner = actor.role == Role::Mcp && actor.user_id == owner;
    let is_partner = actor.role == Role::PickupPartner && partner == Some(actor.user_id);
    if !is_owner && !is_partner {
        return Err(LogisticsError::Unauthorized(format!(
            "user {} is neither the owner nor the assigned partner",
            actor.user_id
        )));
    }

    if to == JobStatus::Assigned || !can_transition(from, to) {
        return Err(LogisticsError::InvalidTransition { from, to });
    }

    // the owner may only call the job off; progress is reported by the partner
    if is_owner && !is_partner && to != JobStatus::Cancelled {
        return Err(LogisticsError::Unauthorized(format!(
            "only the assigned partner may move a job to {to}"
        )));
    }

    Ok(())
}
