use crate::config::EngineConfig;
use crate::domain::job::{Job, JobKind, StatusChange, require};
use crate::domain::money::Price;
use crate::domain::payment::PaymentStatus;
use crate::domain::status::JobStatus;
use crate::error::{LogisticsError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WasteType {
    Plastic,
    Paper,
    Metal,
    Glass,
    EWaste,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityUnit {
    Kg,
    Pieces,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub landmark: Option<String>,
}

/// Creation input for a collection request, as submitted by an MCP.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDraft {
    pub waste_type: Option<WasteType>,
    pub quantity: Option<Decimal>,
    pub unit: Option<QuantityUnit>,
    #[serde(default)]
    pub address: Address,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub price: Option<Decimal>,
}

/// A pickup job raised by an MCP.
///
/// `pickup_partner` is `Some` exactly while `status` is assigned, in progress
/// or completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRequest {
    pub id: Uuid,
    pub mcp: Uuid,
    pub pickup_partner: Option<Uuid>,
    pub status: JobStatus,
    pub waste_type: WasteType,
    pub quantity: Decimal,
    pub unit: QuantityUnit,
    pub address: Address,
    pub scheduled_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub price: Price,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job for CollectionRequest {
    const KIND: JobKind = JobKind::Collection;
    type Draft = CollectionDraft;

    fn from_draft(
        id: Uuid,
        owner: Uuid,
        draft: CollectionDraft,
        now: DateTime<Utc>,
        _config: &EngineConfig,
    ) -> Result<Self> {
        let waste_type = require(draft.waste_type, "wasteType")?;
        let quantity = require(draft.quantity, "quantity")?;
        let unit = require(draft.unit, "unit")?;
        let scheduled_date = require(draft.scheduled_date, "scheduledDate")?;
        if quantity <= Decimal::ZERO {
            return Err(LogisticsError::ValidationError(
                "quantity must be greater than 0".to_string(),
            ));
        }
        let price = draft.price.map(Price::new).transpose()?.unwrap_or_default();

        Ok(Self {
            id,
            mcp: owner,
            pickup_partner: None,
            status: JobStatus::Pending,
            waste_type,
            quantity,
            unit,
            address: draft.address,
            scheduled_date,
            notes: draft.notes,
            price,
            payment_status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn owner(&self) -> Uuid {
        self.mcp
    }

    fn pickup_partner(&self) -> Option<Uuid> {
        self.pickup_partner
    }

    fn status(&self) -> JobStatus {
        self.status
    }

    fn price(&self) -> Price {
        self.price
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn assign(&mut self, partner: Uuid, at: DateTime<Utc>) {
        self.pickup_partner = Some(partner);
        self.status = JobStatus::Assigned;
        self.updated_at = at;
    }

    fn apply_status(&mut self, status: JobStatus, _change: &StatusChange, at: DateTime<Utc>) {
        self.status = status;
        if !status.requires_partner() {
            self.pickup_partner = None;
        }
        self.updated_at = at;
    }

    fn set_price(&mut self, price: Price, at: DateTime<Utc>) {
        self.price = price;
        self.updated_at = at;
    }

    fn set_payment_status(&mut self, status: PaymentStatus, at: DateTime<Utc>) {
        self.payment_status = status;
        self.updated_at = at;
    }
}
