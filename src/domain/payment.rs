use crate::domain::job::JobRef;
use crate::domain::money::Price;
use crate::error::{LogisticsError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Payment,
    Refund,
    Commission,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Upi,
    BankTransfer,
}

/// Method-specific settlement details captured when a payment is recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub transaction_id: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub bank_name: Option<String>,
    pub account_number: Option<String>,
    pub upi_id: Option<String>,
}

/// The payment record a completed job produces. At most one exists per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub job: JobRef,
    pub mcp: Uuid,
    pub pickup_partner: Option<Uuid>,
    pub amount: Price,
    #[serde(rename = "type")]
    pub kind: PaymentType,
    pub status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub payment_details: Option<PaymentDetails>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    /// The pending cash payment raised when a job completes. The method can be
    /// changed when the payment is actually recorded.
    pub fn for_completed_job(
        job: JobRef,
        mcp: Uuid,
        pickup_partner: Option<Uuid>,
        amount: Price,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job,
            mcp,
            pickup_partner,
            amount,
            kind: PaymentType::Payment,
            status: PaymentStatus::Pending,
            payment_method: PaymentMethod::Cash,
            payment_details: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn involves(&self, user: Uuid) -> bool {
        self.mcp == user || self.pickup_partner == Some(user)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub total_transactions: usize,
    pub total_amount: Decimal,
    pub by_payment_method: BTreeMap<PaymentMethod, Decimal>,
    pub by_type: BTreeMap<PaymentType, Decimal>,
}

impl PaymentSummary {
    /// Aggregates completed transactions; anything else is ignored.
    pub fn from_transactions<'a>(
        transactions: impl IntoIterator<Item = &'a PaymentTransaction>,
    ) -> Result<Self> {
        transactions
            .into_iter()
            .filter(|tx| tx.status == PaymentStatus::Completed)
            .try_fold(Self::default(), |mut summary, tx| {
                let amount = tx.amount.value();
                summary.total_transactions += 1;
                add_to(&mut summary.total_amount, amount)?;
                add_to(summary.by_payment_method.entry(tx.payment_method).or_default(), amount)?;
                add_to(summary.by_type.entry(tx.kind).or_default(), amount)?;
                Ok(summary)
            })
    }
}

fn add_to(total: &mut Decimal, amount: Decimal) -> Result<()> {
    *total = total.checked_add(amount).ok_or_else(|| {
        LogisticsError::InvalidAmount("payment totals are out of range".to_string())
    })?;
    Ok(())
}
