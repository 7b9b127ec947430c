use super::{Outcome, notify};
use crate::config::EngineConfig;
use crate::domain::money::{Amount, Balance};
use crate::domain::notification::{Notification, NotificationKind};
use crate::domain::ports::{NotifierRef, WalletStoreRef};
use crate::domain::wallet::{
    EntryMetadata, EntryStatus, EntryType, HistoryPage, HistoryQuery, LedgerEntry, ReferenceType,
    Settlement, Statement, Wallet, WalletStatus, new_reference,
};
use crate::error::{LogisticsError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositMethod {
    /// Settled on the spot.
    Cash,
    /// Left pending until the gateway confirms it.
    Online,
}

/// A wallet together with the ledger entry an operation appended to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub wallet: Wallet,
    pub entry: LedgerEntry,
}

/// Both legs of a completed transfer. They share one reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub reference: String,
    pub from: Posting,
    pub to: Posting,
}

fn posting(wallet: Wallet, reference: &str) -> Result<Posting> {
    let entry = wallet
        .entry(reference)
        .cloned()
        .ok_or_else(|| LogisticsError::not_found("Ledger entry", reference))?;
    Ok(Posting { wallet, entry })
}

/// Applies credits and debits to per-user wallets.
///
/// Wallets are keyed by their owner and created on first use. Every balance
/// change is a single conditional write, so concurrent debits cannot overdraw.
pub struct WalletEngine {
    wallets: WalletStoreRef,
    notifier: NotifierRef,
    config: EngineConfig,
}

impl WalletEngine {
    pub fn new(wallets: WalletStoreRef, notifier: NotifierRef, config: EngineConfig) -> Self {
        Self {
            wallets,
            notifier,
            config,
        }
    }

    pub async fn wallet(&self, user_id: Uuid) -> Result<Wallet> {
        self.wallets
            .get(user_id)
            .await?
            .ok_or_else(|| LogisticsError::not_found("Wallet", user_id))
    }

    /// Returns the user's wallet, creating an empty one if needed.
    async fn open_wallet(&self, user_id: Uuid) -> Result<Wallet> {
        if let Some(wallet) = self.wallets.get(user_id).await? {
            return Ok(wallet);
        }
        let wallet = self.wallets.get_or_insert(self.empty_wallet(user_id)).await?;
        info!(user = %user_id, wallet = %wallet.id, "wallet created");
        Ok(wallet)
    }

    fn empty_wallet(&self, user_id: Uuid) -> Wallet {
        Wallet::new(user_id, self.config.currency.clone(), Utc::now())
    }

    /// The stored wallet, or an unsaved empty one for a user who has none yet.
    async fn view(&self, user_id: Uuid) -> Result<Wallet> {
        Ok(self
            .wallets
            .get(user_id)
            .await?
            .unwrap_or_else(|| self.empty_wallet(user_id)))
    }

    pub async fn get_balance(&self, user_id: Uuid) -> Result<Balance> {
        Ok(self.view(user_id).await?.balance)
    }

    pub async fn all_wallets(&self) -> Result<Vec<Wallet>> {
        self.wallets.get_all().await
    }

    /// Appends `entry` to the user's wallet, moving the balance if it is completed.
    #[tracing::instrument(skip(self, entry), fields(reference = %entry.reference))]
    pub async fn add_transaction(&self, user_id: Uuid, entry: LedgerEntry) -> Result<Posting> {
        self.open_wallet(user_id).await?;
        let reference = entry.reference.clone();
        let wallet = self
            .wallets
            .update_atomic(
                user_id,
                Box::new(move |wallet: &mut Wallet| wallet.add_transaction(entry, Utc::now())),
            )
            .await?;
        info!(user = %user_id, balance = %wallet.balance, "ledger entry added");
        posting(wallet, &reference)
    }

    #[tracing::instrument(skip(self, description))]
    pub async fn deposit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        method: DepositMethod,
        description: Option<String>,
    ) -> Result<Outcome<Posting>> {
        let amount = Amount::new(amount)?;
        let now = Utc::now();
        let status = match method {
            DepositMethod::Cash => EntryStatus::Completed,
            DepositMethod::Online => EntryStatus::Pending,
        };
        let entry = LedgerEntry::new(
            EntryType::Credit,
            amount,
            description.unwrap_or_else(|| "Wallet deposit".to_string()),
            new_reference(ReferenceType::Deposit, now),
            ReferenceType::Deposit,
            status,
            now,
        );
        let posted = self.add_transaction(user_id, entry).await?;
        Ok(self.announce(posted, "Deposit").await)
    }

    #[tracing::instrument(skip(self, description))]
    pub async fn withdraw(
        &self,
        user_id: Uuid,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<Outcome<Posting>> {
        let amount = Amount::new(amount)?;
        let now = Utc::now();
        let entry = LedgerEntry::new(
            EntryType::Debit,
            amount,
            description.unwrap_or_else(|| "Wallet withdrawal".to_string()),
            new_reference(ReferenceType::Withdrawal, now),
            ReferenceType::Withdrawal,
            EntryStatus::Completed,
            now,
        );
        let posted = self.add_transaction(user_id, entry).await?;
        Ok(self.announce(posted, "Withdrawal").await)
    }

    /// Moves `amount` from one user's wallet to another's.
    ///
    /// The debit and the credit are committed together or not at all.
    #[tracing::instrument(skip(self, description))]
    pub async fn transfer_funds(
        &self,
        from_user: Uuid,
        to_user: Uuid,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<Outcome<Transfer>> {
        let amount = Amount::new(amount)?;
        if from_user == to_user {
            return Err(LogisticsError::ValidationError(
                "cannot transfer to the same wallet".to_string(),
            ));
        }
        self.open_wallet(from_user).await?;
        self.open_wallet(to_user).await?;

        let now = Utc::now();
        let reference = new_reference(ReferenceType::Transfer, now);
        let description = description.unwrap_or_else(|| format!("Transfer to {to_user}"));
        let shared = reference.clone();

        let (source, destination) = self
            .wallets
            .update_pair_atomic(
                from_user,
                to_user,
                Box::new(move |source: &mut Wallet, destination: &mut Wallet| {
                    destination.ensure_active()?;
                    let debit = LedgerEntry::new(
                        EntryType::Debit,
                        amount,
                        description,
                        shared.clone(),
                        ReferenceType::Transfer,
                        EntryStatus::Completed,
                        now,
                    )
                    .with_metadata(EntryMetadata {
                        to_wallet: Some(destination.id),
                        ..EntryMetadata::default()
                    });
                    source.add_transaction(debit, now)?;

                    let credit = LedgerEntry::new(
                        EntryType::Credit,
                        amount,
                        format!("Transfer from {}", source.user_id),
                        shared,
                        ReferenceType::Transfer,
                        EntryStatus::Completed,
                        now,
                    )
                    .with_metadata(EntryMetadata {
                        from_wallet: Some(source.id),
                        ..EntryMetadata::default()
                    });
                    destination.add_transaction(credit, now)
                }),
            )
            .await?;
        info!(%reference, from = %from_user, to = %to_user, amount = %amount.value(), "funds transferred");

        let transfer = Transfer {
            from: posting(source, &reference)?,
            to: posting(destination, &reference)?,
            reference,
        };
        let notification = Notification::new(
            to_user,
            NotificationKind::WalletUpdated,
            "Transfer received",
            format!("{} {} received from {from_user}", amount.value(), transfer.to.wallet.currency),
        )
        .for_wallet(transfer.to.wallet.id, amount.value());
        let mut outcome = Outcome::new(transfer);
        notify(self.notifier.as_ref(), notification, &mut outcome).await;
        Ok(outcome)
    }

    /// Completes or fails a pending entry, e.g. once a gateway confirms a deposit.
    #[tracing::instrument(skip(self))]
    pub async fn settle_entry(
        &self,
        user_id: Uuid,
        reference: &str,
        settlement: Settlement,
    ) -> Result<Outcome<Posting>> {
        let target = reference.to_string();
        let wallet = self
            .wallets
            .update_atomic(
                user_id,
                Box::new(move |wallet: &mut Wallet| {
                    wallet.settle(&target, settlement, Utc::now()).map(|_| ())
                }),
            )
            .await?;
        info!(user = %user_id, %reference, ?settlement, "ledger entry settled");
        let posted = posting(wallet, reference)?;
        Ok(self.announce(posted, "Ledger entry").await)
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_status(&self, user_id: Uuid, status: WalletStatus) -> Result<Wallet> {
        self.open_wallet(user_id).await?;
        let wallet = self
            .wallets
            .update_atomic(
                user_id,
                Box::new(move |wallet: &mut Wallet| {
                    wallet.status = status;
                    wallet.updated_at = Utc::now();
                    Ok(())
                }),
            )
            .await?;
        info!(user = %user_id, ?status, "wallet status changed");
        Ok(wallet)
    }

    /// A page of the user's ledger entries, newest first.
    pub async fn get_history(&self, user_id: Uuid, mut query: HistoryQuery) -> Result<HistoryPage> {
        query.validate(self.config.max_page_limit)?;
        query.limit.get_or_insert(self.config.default_page_limit);
        Ok(self.view(user_id).await?.history(&query))
    }

    pub async fn statement(
        &self,
        user_id: Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Statement> {
        if let (Some(s), Some(e)) = (start, end)
            && s > e
        {
            return Err(LogisticsError::ValidationError(
                "statement start is after its end".to_string(),
            ));
        }
        self.view(user_id).await?.statement(start, end)
    }

    async fn announce(&self, posted: Posting, what: &str) -> Outcome<Posting> {
        let mut outcome = Outcome::new(posted);
        if outcome.value.entry.status == EntryStatus::Pending {
            return outcome;
        }
        let entry = &outcome.value.entry;
        let wallet = &outcome.value.wallet;
        let notification = Notification::new(
            wallet.user_id,
            NotificationKind::WalletUpdated,
            format!("{what} {:?}", entry.status).to_lowercase(),
            format!(
                "{what} of {} {} is {:?}; balance {}",
                entry.amount.value(),
                wallet.currency,
                entry.status,
                wallet.balance
            ),
        )
        .for_wallet(wallet.id, entry.amount.value());
        notify(self.notifier.as_ref(), notification, &mut outcome).await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemoryWalletStore;
    use crate::infrastructure::notifier::RecordingNotifier;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn engine() -> (WalletEngine, RecordingNotifier) {
        let notifier = RecordingNotifier::new();
        let engine = WalletEngine::new(
            Arc::new(InMemoryWalletStore::new()),
            Arc::new(notifier.clone()),
            EngineConfig::default(),
        );
        (engine, notifier)
    }

    #[tokio::test]
    async fn test_wallet_created_on_first_financial_operation() {
        let (engine, _) = engine();
        let user = Uuid::new_v4();
        assert!(matches!(
            engine.wallet(user).await,
            Err(LogisticsError::NotFound { .. })
        ));

        // reads see an empty wallet without storing one
        assert_eq!(engine.get_balance(user).await.unwrap(), Balance::ZERO);
        assert_eq!(engine.get_history(user, HistoryQuery::default()).await.unwrap().total, 0);
        let statement = engine.statement(user, None, None).await.unwrap();
        assert_eq!(statement.closing_balance, Balance::ZERO);
        assert!(engine.all_wallets().await.unwrap().is_empty());

        engine.deposit(user, dec!(5), DepositMethod::Cash, None).await.unwrap();
        let wallet = engine.wallet(user).await.unwrap();
        assert_eq!(wallet.currency, "INR");
        assert_eq!(engine.all_wallets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_overflowing_deposit_is_rejected() {
        let (engine, _) = engine();
        let user = Uuid::new_v4();
        engine
            .deposit(user, Decimal::MAX, DepositMethod::Cash, None)
            .await
            .unwrap();

        assert!(matches!(
            engine.deposit(user, Decimal::MAX, DepositMethod::Cash, None).await,
            Err(LogisticsError::InvalidAmount(_))
        ));
        let wallet = engine.wallet(user).await.unwrap();
        assert_eq!(wallet.balance, Balance::new(Decimal::MAX));
        assert_eq!(wallet.transactions.len(), 1);
    }

    #[tokio::test]
    async fn test_deposit_and_withdraw() {
        let (engine, notifier) = engine();
        let user = Uuid::new_v4();
        engine
            .deposit(user, dec!(100), DepositMethod::Cash, None)
            .await
            .unwrap();
        let posted = engine.withdraw(user, dec!(30.50), None).await.unwrap().value;
        assert_eq!(posted.wallet.balance, Balance::new(dec!(69.50)));
        assert_eq!(posted.entry.kind, EntryType::Debit);
        assert!(posted.entry.reference.starts_with("WDL"));
        assert_eq!(notifier.sent().await.len(), 2);

        assert!(matches!(
            engine.withdraw(user, dec!(100), None).await,
            Err(LogisticsError::InsufficientFunds { .. })
        ));
        assert_eq!(engine.get_balance(user).await.unwrap(), Balance::new(dec!(69.50)));
    }

    #[tokio::test]
    async fn test_online_deposit_waits_for_settlement() {
        let (engine, _) = engine();
        let user = Uuid::new_v4();
        let posted = engine
            .deposit(user, dec!(40), DepositMethod::Online, None)
            .await
            .unwrap()
            .value;
        assert_eq!(posted.entry.status, EntryStatus::Pending);
        assert_eq!(posted.wallet.balance, Balance::ZERO);

        let settled = engine
            .settle_entry(user, &posted.entry.reference, Settlement::Completed)
            .await
            .unwrap()
            .value;
        assert_eq!(settled.entry.status, EntryStatus::Completed);
        assert_eq!(settled.wallet.balance, Balance::new(dec!(40)));
    }

    #[tokio::test]
    async fn test_invalid_amounts() {
        let (engine, _) = engine();
        let user = Uuid::new_v4();
        assert!(matches!(
            engine.deposit(user, dec!(0), DepositMethod::Cash, None).await,
            Err(LogisticsError::InvalidAmount(_))
        ));
        assert!(matches!(
            engine.transfer_funds(user, Uuid::new_v4(), dec!(-5), None).await,
            Err(LogisticsError::InvalidAmount(_))
        ));
    }

    #[tokio::test]
    async fn test_transfer_moves_funds_with_shared_reference() {
        let (engine, notifier) = engine();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        engine.deposit(a, dec!(150), DepositMethod::Cash, None).await.unwrap();

        let transfer = engine
            .transfer_funds(a, b, dec!(100), Some("settlement".into()))
            .await
            .unwrap()
            .value;
        assert!(transfer.reference.starts_with("TRF"));
        assert_eq!(transfer.from.entry.reference, transfer.to.entry.reference);
        assert_eq!(transfer.from.wallet.balance, Balance::new(dec!(50)));
        assert_eq!(transfer.to.wallet.balance, Balance::new(dec!(100)));
        assert_eq!(transfer.from.entry.metadata.to_wallet, Some(transfer.to.wallet.id));
        assert_eq!(transfer.to.entry.metadata.from_wallet, Some(transfer.from.wallet.id));

        let last = notifier.sent().await.pop().unwrap();
        assert_eq!(last.user_id, b);
    }

    #[tokio::test]
    async fn test_transfer_insufficient_funds_changes_nothing() {
        let (engine, _) = engine();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        engine.deposit(a, dec!(50), DepositMethod::Cash, None).await.unwrap();
        let before_a = engine.wallet(a).await.unwrap();

        assert!(matches!(
            engine.transfer_funds(a, b, dec!(100), None).await,
            Err(LogisticsError::InsufficientFunds { .. })
        ));
        assert_eq!(engine.wallet(a).await.unwrap(), before_a);
        let destination = engine.wallet(b).await.unwrap();
        assert_eq!(destination.balance, Balance::ZERO);
        assert!(destination.transactions.is_empty());
    }

    #[tokio::test]
    async fn test_suspended_wallets_block_transfers() {
        let (engine, _) = engine();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        engine.deposit(a, dec!(50), DepositMethod::Cash, None).await.unwrap();

        engine.set_status(b, WalletStatus::Suspended).await.unwrap();
        assert!(matches!(
            engine.transfer_funds(a, b, dec!(10), None).await,
            Err(LogisticsError::WalletSuspended(_))
        ));

        engine.set_status(b, WalletStatus::Active).await.unwrap();
        engine.set_status(a, WalletStatus::Suspended).await.unwrap();
        assert!(matches!(
            engine.transfer_funds(a, b, dec!(10), None).await,
            Err(LogisticsError::WalletSuspended(_))
        ));
        assert_eq!(engine.get_balance(a).await.unwrap(), Balance::new(dec!(50)));
    }

    #[tokio::test]
    async fn test_transfer_to_self_rejected() {
        let (engine, _) = engine();
        let a = Uuid::new_v4();
        assert!(matches!(
            engine.transfer_funds(a, a, dec!(1), None).await,
            Err(LogisticsError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_history_uses_configured_limits() {
        let (engine, _) = engine();
        let user = Uuid::new_v4();
        for _ in 0..12 {
            engine.deposit(user, dec!(1), DepositMethod::Cash, None).await.unwrap();
        }
        let page = engine.get_history(user, HistoryQuery::default()).await.unwrap();
        assert_eq!(page.limit, 10);
        assert_eq!(page.transactions.len(), 10);
        assert_eq!(page.total_pages, 2);

        assert!(matches!(
            engine.get_history(user, HistoryQuery::page(1, 500)).await,
            Err(LogisticsError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_undo_deposit() {
        let (engine, notifier) = engine();
        notifier.set_failing(true);
        let user = Uuid::new_v4();
        let outcome = engine
            .deposit(user, dec!(25), DepositMethod::Cash, None)
            .await
            .unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(engine.get_balance(user).await.unwrap(), Balance::new(dec!(25)));
    }
}
