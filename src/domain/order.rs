use crate::config::EngineConfig;
use crate::domain::job::{GeoPoint, Job, JobKind, StatusChange, require};
use crate::domain::money::Price;
use crate::domain::payment::PaymentStatus;
use crate::domain::status::JobStatus;
use crate::error::{LogisticsError, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoAddress {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub zip_code: Option<String>,
    pub coordinates: GeoPoint,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: Decimal,
    pub width: Decimal,
    pub height: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDetails {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub weight: Option<Decimal>,
    pub dimensions: Option<Dimensions>,
    pub special_instructions: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Commission {
    pub percentage: Decimal,
    /// Set when the order completes.
    pub amount: Option<Decimal>,
}

/// One audit record per status change. Never edited once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub status: JobStatus,
    pub timestamp: DateTime<Utc>,
    pub location: Option<GeoPoint>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub score: u8,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub pickup_address: Option<GeoAddress>,
    pub delivery_address: Option<GeoAddress>,
    #[serde(default)]
    pub customer_details: CustomerDetails,
    #[serde(default)]
    pub package_details: PackageDetails,
    pub price: Option<Decimal>,
    pub estimated_pickup_time: Option<DateTime<Utc>>,
    pub estimated_delivery_time: Option<DateTime<Utc>>,
}

/// A delivery-style job with geolocated endpoints and an audit timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub mcp_id: Uuid,
    pub pickup_partner_id: Option<Uuid>,
    pub status: JobStatus,
    pub pickup_address: GeoAddress,
    pub delivery_address: GeoAddress,
    pub customer_details: CustomerDetails,
    pub package_details: PackageDetails,
    pub price: Price,
    pub payment_status: PaymentStatus,
    pub commission: Commission,
    pub timeline: Vec<TimelineEntry>,
    pub estimated_pickup_time: DateTime<Utc>,
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    pub actual_pickup_time: Option<DateTime<Utc>>,
    pub actual_delivery_time: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub rating: Option<Rating>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `ORD<yymmdd><4 random digits>`.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("ORD{}{:04}", now.format("%y%m%d"), suffix)
}

fn validate_address(address: Option<GeoAddress>, field: &str) -> Result<GeoAddress> {
    let address = require(address, field)?;
    if !address.coordinates.is_valid() {
        return Err(LogisticsError::ValidationError(format!(
            "{field} coordinates must be [longitude, latitude]"
        )));
    }
    Ok(address)
}

impl Order {
    fn push_timeline(&mut self, status: JobStatus, change: &StatusChange, at: DateTime<Utc>) {
        self.timeline.push(TimelineEntry {
            status,
            timestamp: at,
            location: change.location,
            notes: change.notes.clone(),
        });
    }

    /// Records the MCP's rating of a completed delivery. Ratings are final.
    pub fn rate(&mut self, score: u8, comment: Option<String>, at: DateTime<Utc>) -> Result<()> {
        if !(1..=5).contains(&score) {
            return Err(LogisticsError::ValidationError(
                "rating score must be between 1 and 5".to_string(),
            ));
        }
        if self.status != JobStatus::Completed {
            return Err(LogisticsError::InvalidState(format!(
                "order {} is {}, only completed orders can be rated",
                self.order_number, self.status
            )));
        }
        if self.rating.is_some() {
            return Err(LogisticsError::InvalidState(format!(
                "order {} is already rated",
                self.order_number
            )));
        }
        self.rating = Some(Rating { score, comment });
        self.updated_at = at;
        Ok(())
    }
}

impl Job for Order {
    const KIND: JobKind = JobKind::Order;
    type Draft = OrderDraft;

    fn from_draft(
        id: Uuid,
        owner: Uuid,
        draft: OrderDraft,
        now: DateTime<Utc>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let pickup_address = validate_address(draft.pickup_address, "pickupAddress")?;
        let delivery_address = validate_address(draft.delivery_address, "deliveryAddress")?;
        let estimated_pickup_time = require(draft.estimated_pickup_time, "estimatedPickupTime")?;
        if draft
            .package_details
            .weight
            .is_some_and(|weight| weight <= Decimal::ZERO)
        {
            return Err(LogisticsError::ValidationError(
                "package weight must be greater than 0".to_string(),
            ));
        }
        if !(Decimal::ZERO..=Decimal::ONE_HUNDRED).contains(&config.commission_percentage) {
            return Err(LogisticsError::ValidationError(
                "commission percentage must be between 0 and 100".to_string(),
            ));
        }
        let price = draft.price.map(Price::new).transpose()?.unwrap_or_default();

        let mut order = Self {
            id,
            order_number: generate_order_number(now),
            mcp_id: owner,
            pickup_partner_id: None,
            status: JobStatus::Pending,
            pickup_address,
            delivery_address,
            customer_details: draft.customer_details,
            package_details: draft.package_details,
            price,
            payment_status: PaymentStatus::Pending,
            commission: Commission {
                percentage: config.commission_percentage,
                amount: None,
            },
            timeline: Vec::new(),
            estimated_pickup_time,
            estimated_delivery_time: draft.estimated_delivery_time,
            actual_pickup_time: None,
            actual_delivery_time: None,
            cancellation_reason: None,
            rating: None,
            created_at: now,
            updated_at: now,
        };
        order.push_timeline(JobStatus::Pending, &StatusChange::default(), now);
        Ok(order)
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn owner(&self) -> Uuid {
        self.mcp_id
    }

    fn pickup_partner(&self) -> Option<Uuid> {
        self.pickup_partner_id
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
        self.pickup_partner_id = Some(partner);
        self.status = JobStatus::Assigned;
        self.push_timeline(JobStatus::Assigned, &StatusChange::default(), at);
        self.updated_at = at;
    }

    fn apply_status(&mut self, status: JobStatus, change: &StatusChange, at: DateTime<Utc>) {
        let previous = self.status;
        match status {
            JobStatus::InProgress => {
                if previous == JobStatus::Completed {
                    // completion rolled back
                    self.actual_delivery_time = None;
                    self.commission.amount = None;
                }
                self.actual_pickup_time.get_or_insert(at);
            }
            JobStatus::Completed => {
                self.actual_delivery_time = Some(at);
                // at most 100% of the price, so this cannot overflow
                self.commission.amount = self.price.percent(self.commission.percentage).ok();
            }
            JobStatus::Cancelled => {
                self.cancellation_reason = change.notes.clone();
            }
            JobStatus::Pending | JobStatus::Assigned => {}
        }
        self.status = status;
        if !status.requires_partner() {
            self.pickup_partner_id = None;
        }
        self.push_timeline(status, change, at);
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
