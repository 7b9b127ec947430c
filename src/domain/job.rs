use crate::config::EngineConfig;
use crate::domain::money::Price;
use crate::domain::payment::PaymentStatus;
use crate::domain::status::JobStatus;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Collection,
    Order,
}

impl JobKind {
    pub fn label(&self) -> &'static str {
        match self {
            JobKind::Collection => "Collection",
            JobKind::Order => "Order",
        }
    }
}

/// Points a payment transaction at the job it settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobRef {
    pub kind: JobKind,
    pub id: Uuid,
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.label().to_lowercase(), self.id)
    }
}

/// A `[longitude, latitude]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint(pub f64, pub f64);

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        (-180.0..=180.0).contains(&self.0) && (-90.0..=90.0).contains(&self.1)
    }
}

/// Context attached to a status change: where it happened and why.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub location: Option<GeoPoint>,
    pub notes: Option<String>,
}

impl StatusChange {
    pub fn note(notes: impl Into<String>) -> Self {
        Self {
            location: None,
            notes: Some(notes.into()),
        }
    }
}

/// A pickup job with the pending -> assigned -> in_progress -> completed lifecycle.
///
/// Implementors only apply mutations; every rule about *whether* a mutation is
/// allowed lives in the lifecycle manager.
pub trait Job: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: JobKind;

    /// Unvalidated creation input.
    type Draft: Send + 'static;

    fn from_draft(
        id: Uuid,
        owner: Uuid,
        draft: Self::Draft,
        now: DateTime<Utc>,
        config: &EngineConfig,
    ) -> Result<Self>;

    fn id(&self) -> Uuid;
    fn owner(&self) -> Uuid;
    fn pickup_partner(&self) -> Option<Uuid>;
    fn status(&self) -> JobStatus;
    fn price(&self) -> Price;
    fn created_at(&self) -> DateTime<Utc>;

    /// Attaches `partner` and moves the job to `assigned` in one step.
    fn assign(&mut self, partner: Uuid, at: DateTime<Utc>);

    /// Moves the job to `status`. Cancelling detaches the partner.
    fn apply_status(&mut self, status: JobStatus, change: &StatusChange, at: DateTime<Utc>);

    fn set_price(&mut self, price: Price, at: DateTime<Utc>);
    fn set_payment_status(&mut self, status: PaymentStatus, at: DateTime<Utc>);

    fn job_ref(&self) -> JobRef {
        JobRef {
            kind: Self::KIND,
            id: self.id(),
        }
    }
}

/// Query over a job store; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobFilter {
    pub owner: Option<Uuid>,
    pub partner: Option<Uuid>,
    pub status: Option<JobStatus>,
    pub unassigned: bool,
}

impl JobFilter {
    pub fn owned_by(owner: Uuid) -> Self {
        Self {
            owner: Some(owner),
            ..Self::default()
        }
    }

    pub fn assigned_to(partner: Uuid) -> Self {
        Self {
            partner: Some(partner),
            ..Self::default()
        }
    }

    pub fn available() -> Self {
        Self {
            status: Some(JobStatus::Pending),
            unassigned: true,
            ..Self::default()
        }
    }

    pub fn matches<J: Job>(&self, job: &J) -> bool {
        self.owner.is_none_or(|owner| job.owner() == owner)
            && self.partner.is_none_or(|p| job.pickup_partner() == Some(p))
            && self.status.is_none_or(|s| job.status() == s)
            && (!self.unassigned || job.pickup_partner().is_none())
    }
}

pub(crate) fn require<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| crate::error::LogisticsError::ValidationError(format!("{field} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_point_bounds() {
        assert!(GeoPoint(77.59, 12.97).is_valid());
        assert!(!GeoPoint(190.0, 0.0).is_valid());
        assert!(!GeoPoint(0.0, -91.0).is_valid());
    }

    #[test]
    fn test_job_ref_display() {
        let job = JobRef {
            kind: JobKind::Collection,
            id: Uuid::nil(),
        };
        assert_eq!(
            job.to_string(),
            "collection:00000000-0000-0000-0000-000000000000"
        );
    }
}
