use crate::domain::money::{Amount, Balance, checked_sum};
use crate::error::{LogisticsError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceType {
    Order,
    Transfer,
    Deposit,
    Withdrawal,
}

impl ReferenceType {
    /// Prefix of generated references, e.g. `TRF1760799200000a1b2c3d4`.
    pub fn prefix(&self) -> &'static str {
        match self {
            ReferenceType::Order => "ORD",
            ReferenceType::Transfer => "TRF",
            ReferenceType::Deposit => "DEP",
            ReferenceType::Withdrawal => "WDL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletStatus {
    Active,
    Suspended,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    pub order_id: Option<Uuid>,
    pub from_wallet: Option<Uuid>,
    pub to_wallet: Option<Uuid>,
    pub gateway_payment_id: Option<String>,
    pub gateway_order_id: Option<String>,
}

/// A single credit or debit embedded in a wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    #[serde(rename = "type")]
    pub kind: EntryType,
    pub amount: Amount,
    pub description: String,
    pub reference: String,
    pub reference_type: ReferenceType,
    pub status: EntryStatus,
    #[serde(default)]
    pub metadata: EntryMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        kind: EntryType,
        amount: Amount,
        description: impl Into<String>,
        reference: impl Into<String>,
        reference_type: ReferenceType,
        status: EntryStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            amount,
            description: description.into(),
            reference: reference.into(),
            reference_type,
            status,
            metadata: EntryMetadata::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_metadata(mut self, metadata: EntryMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Effect on the balance once completed: `+amount` for credits, `-amount` for debits.
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            EntryType::Credit => self.amount.value(),
            EntryType::Debit => -self.amount.value(),
        }
    }
}

/// Generates a ledger reference that is unique in practice: millisecond
/// timestamp plus a random suffix.
pub fn new_reference(reference_type: ReferenceType, now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}{}{}",
        reference_type.prefix(),
        now.timestamp_millis(),
        &suffix[..8]
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Settlement {
    Completed,
    Failed,
}

/// Per-user balance ledger.
///
/// `balance` always equals the signed sum of the completed entries. Every
/// mutation below either keeps that true or leaves the wallet untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: Balance,
    pub currency: String,
    pub status: WalletStatus,
    pub transactions: Vec<LedgerEntry>,
    pub last_transaction: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(user_id: Uuid, currency: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            balance: Balance::ZERO,
            currency: currency.into(),
            status: WalletStatus::Active,
            transactions: Vec::new(),
            last_transaction: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn ensure_active(&self) -> Result<()> {
        match self.status {
            WalletStatus::Active => Ok(()),
            WalletStatus::Suspended => Err(LogisticsError::WalletSuspended(self.id)),
        }
    }

    pub fn entry(&self, reference: &str) -> Option<&LedgerEntry> {
        self.transactions.iter().find(|e| e.reference == reference)
    }

    fn ensure_funds(&self, amount: Amount) -> Result<()> {
        if self.balance.covers(amount) {
            Ok(())
        } else {
            Err(LogisticsError::InsufficientFunds {
                available: self.balance.value(),
                requested: amount.value(),
            })
        }
    }

    /// Appends `entry`, adjusting the balance when it is already completed.
    ///
    /// A completed debit the balance cannot cover is rejected and not recorded.
    pub fn add_transaction(&mut self, entry: LedgerEntry, now: DateTime<Utc>) -> Result<()> {
        self.ensure_active()?;
        if self.entry(&entry.reference).is_some() {
            return Err(LogisticsError::DuplicateReference(entry.reference));
        }
        if entry.status == EntryStatus::Completed {
            if entry.kind == EntryType::Debit {
                self.ensure_funds(entry.amount)?;
            }
            self.balance = self.balance.checked_add(entry.signed_amount())?;
        }
        self.transactions.push(entry);
        self.last_transaction = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Resolves a pending entry. Completing a debit is subject to the same
    /// funds check as [`Wallet::add_transaction`].
    pub fn settle(&mut self, reference: &str, outcome: Settlement, now: DateTime<Utc>) -> Result<&LedgerEntry> {
        self.ensure_active()?;
        let index = self
            .transactions
            .iter()
            .position(|e| e.reference == reference)
            .ok_or_else(|| LogisticsError::not_found("Ledger entry", reference))?;

        let entry = self.transactions[index].clone();
        if entry.status != EntryStatus::Pending {
            return Err(LogisticsError::InvalidState(format!(
                "ledger entry {reference} is already settled"
            )));
        }

        match outcome {
            Settlement::Completed => {
                if entry.kind == EntryType::Debit {
                    self.ensure_funds(entry.amount)?;
                }
                self.balance = self.balance.checked_add(entry.signed_amount())?;
                self.transactions[index].status = EntryStatus::Completed;
            }
            Settlement::Failed => self.transactions[index].status = EntryStatus::Failed,
        }
        self.transactions[index].updated_at = now;
        self.last_transaction = Some(now);
        self.updated_at = now;
        Ok(&self.transactions[index])
    }

    /// Recomputes the balance from the completed entries.
    pub fn ledger_balance(&self) -> Result<Balance> {
        checked_sum(
            self.transactions
                .iter()
                .filter(|e| e.status == EntryStatus::Completed)
                .map(LedgerEntry::signed_amount),
        )
        .map(Balance::new)
    }

    pub fn history(&self, query: &HistoryQuery) -> HistoryPage {
        let matching: Vec<&LedgerEntry> = self
            .transactions
            .iter()
            .rev()
            .filter(|e| query.matches(e))
            .collect();

        let total = matching.len();
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(1);
        let start = (query.page.max(1) as usize - 1) * limit as usize;
        HistoryPage {
            transactions: matching
                .into_iter()
                .skip(start)
                .take(limit as usize)
                .cloned()
                .collect(),
            total,
            page: query.page,
            limit,
            total_pages: total.div_ceil(limit as usize),
        }
    }

    pub fn statement(&self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Statement> {
        let completed = || {
            self.transactions
                .iter()
                .filter(|e| e.status == EntryStatus::Completed)
        };
        let opening = checked_sum(
            completed()
                .filter(|e| start.is_some_and(|s| e.created_at < s))
                .map(LedgerEntry::signed_amount),
        )?;
        let in_range = |e: &&LedgerEntry| {
            start.is_none_or(|s| e.created_at >= s) && end.is_none_or(|t| e.created_at <= t)
        };
        let total_for = |kind: EntryType| {
            checked_sum(
                completed()
                    .filter(in_range)
                    .filter(|e| e.kind == kind)
                    .map(|e| e.amount.value()),
            )
        };
        let total_credits = total_for(EntryType::Credit)?;
        let total_debits = total_for(EntryType::Debit)?;
        let closing_balance = Balance::new(opening)
            .checked_add(total_credits)?
            .checked_sub(total_debits)?;

        Ok(Statement {
            wallet_id: self.id,
            currency: self.currency.clone(),
            start,
            end,
            opening_balance: Balance::new(opening),
            total_credits,
            total_debits,
            closing_balance,
            transactions: self.transactions.iter().filter(in_range).cloned().collect(),
        })
    }
}

/// Page size when a query does not name one.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Filters for [`Wallet::history`]. Date bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub kind: Option<EntryType>,
    pub status: Option<EntryStatus>,
    #[serde(default = "first_page")]
    pub page: u32,
    pub limit: Option<u32>,
}

fn first_page() -> u32 {
    1
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            kind: None,
            status: None,
            page: 1,
            limit: None,
        }
    }
}

impl HistoryQuery {
    pub fn page(page: u32, limit: u32) -> Self {
        Self {
            page,
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn validate(&self, max_limit: u32) -> Result<()> {
        if self.page == 0 {
            return Err(LogisticsError::ValidationError("page starts at 1".to_string()));
        }
        if self.limit.is_some_and(|limit| limit == 0 || limit > max_limit) {
            return Err(LogisticsError::ValidationError(format!(
                "limit must be between 1 and {max_limit}"
            )));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date)
            && start > end
        {
            return Err(LogisticsError::ValidationError(
                "startDate is after endDate".to_string(),
            ));
        }
        Ok(())
    }

    fn matches(&self, entry: &LedgerEntry) -> bool {
        self.start_date.is_none_or(|s| entry.created_at >= s)
            && self.end_date.is_none_or(|e| entry.created_at <= e)
            && self.kind.is_none_or(|k| entry.kind == k)
            && self.status.is_none_or(|s| entry.status == s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub transactions: Vec<LedgerEntry>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
    pub total_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    pub wallet_id: Uuid,
    pub currency: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub opening_balance: Balance,
    pub total_credits: Decimal,
    pub total_debits: Decimal,
    pub closing_balance: Balance,
    pub transactions: Vec<LedgerEntry>,
}
