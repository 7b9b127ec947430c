use crate::application::wallet::WalletEngine;
use crate::domain::money::Amount;
use crate::domain::wallet::{
    EntryStatus, EntryType, LedgerEntry, ReferenceType, WalletStatus, new_reference,
};
use crate::error::{LogisticsError, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerOpType {
    Deposit,
    Withdrawal,
    Transfer,
    Suspend,
    Activate,
}

/// One row of a ledger replay file.
///
/// `counterparty` is only read by transfers and `amount` is ignored by status
/// changes. A `reference` pins the ledger reference of a deposit or
/// withdrawal, so replaying the same row twice is rejected.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LedgerOp {
    #[serde(rename = "type")]
    pub kind: LedgerOpType,
    pub user: Uuid,
    pub counterparty: Option<Uuid>,
    pub amount: Option<Decimal>,
    pub reference: Option<String>,
}

impl LedgerOp {
    fn amount(&self) -> Result<Amount> {
        let value = self
            .amount
            .ok_or_else(|| LogisticsError::ValidationError(format!("{:?} requires an amount", self.kind)))?;
        Amount::new(value)
    }

    fn entry(&self, kind: EntryType, reference_type: ReferenceType, description: &str) -> Result<LedgerEntry> {
        let now = Utc::now();
        let reference = self
            .reference
            .clone()
            .unwrap_or_else(|| new_reference(reference_type, now));
        Ok(LedgerEntry::new(
            kind,
            self.amount()?,
            description,
            reference,
            reference_type,
            EntryStatus::Completed,
            now,
        ))
    }

    /// Applies the row to `engine`.
    pub async fn apply(self, engine: &WalletEngine) -> Result<()> {
        match self.kind {
            LedgerOpType::Deposit => {
                let entry = self.entry(EntryType::Credit, ReferenceType::Deposit, "Cash deposit")?;
                engine.add_transaction(self.user, entry).await?;
            }
            LedgerOpType::Withdrawal => {
                let entry = self.entry(EntryType::Debit, ReferenceType::Withdrawal, "Withdrawal")?;
                engine.add_transaction(self.user, entry).await?;
            }
            LedgerOpType::Transfer => {
                let to = self.counterparty.ok_or_else(|| {
                    LogisticsError::ValidationError("transfer requires a counterparty".to_string())
                })?;
                let amount = self.amount()?;
                engine
                    .transfer_funds(self.user, to, amount.value(), None)
                    .await?;
            }
            LedgerOpType::Suspend => {
                engine.set_status(self.user, WalletStatus::Suspended).await?;
            }
            LedgerOpType::Activate => {
                engine.set_status(self.user, WalletStatus::Active).await?;
            }
        }
        Ok(())
    }
}

/// Reads ledger operations from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths,
/// so trailing optional columns may be left off.
pub struct LedgerReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> LedgerReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes the rows, one `Result` per record.
    pub fn operations(self) -> impl Iterator<Item = Result<LedgerOp>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LogisticsError::from))
    }
}
