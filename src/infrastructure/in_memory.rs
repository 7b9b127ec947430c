use crate::domain::job::{Job, JobFilter, JobRef};
use crate::domain::ports::{JobStore, Mutation, PairMutation, PaymentStore, WalletStore};
use crate::domain::payment::PaymentTransaction;
use crate::domain::wallet::Wallet;
use crate::error::{LogisticsError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Applies `mutation` to a copy of the document at `key` and commits the copy on success.
fn apply<T: Clone>(
    docs: &mut HashMap<Uuid, T>,
    key: Uuid,
    entity: &'static str,
    mutation: Mutation<T>,
) -> Result<T> {
    let mut doc = docs
        .get(&key)
        .cloned()
        .ok_or_else(|| LogisticsError::not_found(entity, key))?;
    mutation(&mut doc)?;
    docs.insert(key, doc.clone());
    Ok(doc)
}

fn newest_first<T>(docs: &mut [T], created_at: impl Fn(&T) -> chrono::DateTime<chrono::Utc>) {
    docs.sort_by_key(|doc| std::cmp::Reverse(created_at(doc)));
}

/// A thread-safe in-memory job store.
///
/// Uses `Arc<RwLock<HashMap<Uuid, J>>>`; every conditional update runs under
/// the write lock, so two racing claims observe each other.
#[derive(Clone)]
pub struct InMemoryJobStore<J> {
    jobs: Arc<RwLock<HashMap<Uuid, J>>>,
}

impl<J> Default for InMemoryJobStore<J> {
    fn default() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<J> InMemoryJobStore<J> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<J: Job> JobStore<J> for InMemoryJobStore<J> {
    async fn insert(&self, job: J) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id(), job);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<J>> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(&id).cloned())
    }

    async fn find(&self, filter: &JobFilter) -> Result<Vec<J>> {
        let jobs = self.jobs.read().await;
        let mut found: Vec<J> = jobs.values().filter(|job| filter.matches(*job)).cloned().collect();
        newest_first(&mut found, J::created_at);
        Ok(found)
    }

    async fn update_atomic(&self, id: Uuid, mutation: Mutation<J>) -> Result<J> {
        let mut jobs = self.jobs.write().await;
        apply(&mut jobs, id, J::KIND.label(), mutation)
    }
}

/// A thread-safe in-memory store for payment transactions, indexed by job.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    inner: Arc<RwLock<PaymentTables>>,
}

#[derive(Default)]
struct PaymentTables {
    payments: HashMap<Uuid, PaymentTransaction>,
    by_job: HashMap<JobRef, Uuid>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert_for_job(&self, tx: PaymentTransaction) -> Result<(PaymentTransaction, bool)> {
        let mut tables = self.inner.write().await;
        if let Some(existing) = tables.by_job.get(&tx.job).and_then(|id| tables.payments.get(id)) {
            return Ok((existing.clone(), false));
        }
        tables.by_job.insert(tx.job, tx.id);
        tables.payments.insert(tx.id, tx.clone());
        Ok((tx, true))
    }

    async fn get(&self, id: Uuid) -> Result<Option<PaymentTransaction>> {
        let tables = self.inner.read().await;
        Ok(tables.payments.get(&id).cloned())
    }

    async fn find_for_job(&self, job: JobRef) -> Result<Option<PaymentTransaction>> {
        let tables = self.inner.read().await;
        Ok(tables
            .by_job
            .get(&job)
            .and_then(|id| tables.payments.get(id))
            .cloned())
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<PaymentTransaction>> {
        let tables = self.inner.read().await;
        let mut found: Vec<_> = tables
            .payments
            .values()
            .filter(|tx| tx.involves(user_id))
            .cloned()
            .collect();
        newest_first(&mut found, |tx| tx.created_at);
        Ok(found)
    }

    async fn update_atomic(
        &self,
        id: Uuid,
        mutation: Mutation<PaymentTransaction>,
    ) -> Result<PaymentTransaction> {
        let mut tables = self.inner.write().await;
        apply(&mut tables.payments, id, "Transaction", mutation)
    }
}

/// A thread-safe in-memory wallet store keyed by owner.
#[derive(Default, Clone)]
pub struct InMemoryWalletStore {
    wallets: Arc<RwLock<HashMap<Uuid, Wallet>>>,
}

impl InMemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletStore for InMemoryWalletStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<Wallet>> {
        let wallets = self.wallets.read().await;
        Ok(wallets.get(&user_id).cloned())
    }

    async fn get_or_insert(&self, wallet: Wallet) -> Result<Wallet> {
        let mut wallets = self.wallets.write().await;
        Ok(wallets.entry(wallet.user_id).or_insert(wallet).clone())
    }

    async fn get_all(&self) -> Result<Vec<Wallet>> {
        let wallets = self.wallets.read().await;
        Ok(wallets.values().cloned().collect())
    }

    async fn update_atomic(&self, user_id: Uuid, mutation: Mutation<Wallet>) -> Result<Wallet> {
        let mut wallets = self.wallets.write().await;
        apply(&mut wallets, user_id, "Wallet", mutation)
    }

    async fn update_pair_atomic(
        &self,
        first: Uuid,
        second: Uuid,
        mutation: PairMutation<Wallet>,
    ) -> Result<(Wallet, Wallet)> {
        if first == second {
            return Err(LogisticsError::ValidationError(
                "a pair update needs two distinct wallets".to_string(),
            ));
        }
        let mut wallets = self.wallets.write().await;
        let mut a = wallets
            .get(&first)
            .cloned()
            .ok_or_else(|| LogisticsError::not_found("Wallet", first))?;
        let mut b = wallets
            .get(&second)
            .cloned()
            .ok_or_else(|| LogisticsError::not_found("Wallet", second))?;
        mutation(&mut a, &mut b)?;
        wallets.insert(first, a.clone());
        wallets.insert(second, b.clone());
        Ok((a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::domain::collection::{CollectionDraft, CollectionRequest, QuantityUnit, WasteType};
    use crate::domain::money::Price;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn collection(owner: Uuid) -> CollectionRequest {
        CollectionRequest::from_draft(
            Uuid::new_v4(),
            owner,
            CollectionDraft {
                waste_type: Some(WasteType::Paper),
                quantity: Some(dec!(5)),
                unit: Some(QuantityUnit::Kg),
                scheduled_date: Some(Utc::now()),
                ..Default::default()
            },
            Utc::now(),
            &EngineConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_job_store() {
        let store = InMemoryJobStore::new();
        let owner = Uuid::new_v4();
        let job = collection(owner);

        store.insert(job.clone()).await.unwrap();
        let retrieved = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(retrieved, job);
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());

        let owned = store.find(&JobFilter::owned_by(owner)).await.unwrap();
        assert_eq!(owned.len(), 1);
        let other = store.find(&JobFilter::owned_by(Uuid::new_v4())).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_document_unchanged() {
        let store = InMemoryJobStore::new();
        let job = collection(Uuid::new_v4());
        store.insert(job.clone()).await.unwrap();

        let result = store
            .update_atomic(
                job.id,
                Box::new(|c: &mut CollectionRequest| {
                    c.price = Price::new(dec!(999))?;
                    Err(LogisticsError::InvalidState("abort".into()))
                }),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(store.get(job.id).await.unwrap().unwrap(), job);
    }

    #[tokio::test]
    async fn test_update_missing_job() {
        let store: InMemoryJobStore<CollectionRequest> = InMemoryJobStore::new();
        let result = store.update_atomic(Uuid::new_v4(), Box::new(|_| Ok(()))).await;
        assert!(matches!(result, Err(LogisticsError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_payment_store_dedupes_by_job() {
        let store = InMemoryPaymentStore::new();
        let job = collection(Uuid::new_v4());
        let first = PaymentTransaction::for_completed_job(job.job_ref(), job.mcp, None, job.price, Utc::now());
        let second = PaymentTransaction::for_completed_job(job.job_ref(), job.mcp, None, job.price, Utc::now());

        let (stored, created) = store.insert_for_job(first.clone()).await.unwrap();
        assert!(created);
        assert_eq!(stored.id, first.id);

        let (stored, created) = store.insert_for_job(second).await.unwrap();
        assert!(!created);
        assert_eq!(stored.id, first.id);
        assert_eq!(store.find_by_user(job.mcp).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_wallet_store_get_or_insert_keeps_first() {
        let store = InMemoryWalletStore::new();
        let user = Uuid::new_v4();
        let first = store.get_or_insert(Wallet::new(user, "INR", Utc::now())).await.unwrap();
        let second = store.get_or_insert(Wallet::new(user, "USD", Utc::now())).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.currency, "INR");
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pair_update_is_all_or_nothing() {
        let store = InMemoryWalletStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.get_or_insert(Wallet::new(a, "INR", Utc::now())).await.unwrap();
        store.get_or_insert(Wallet::new(b, "INR", Utc::now())).await.unwrap();

        let result = store
            .update_pair_atomic(
                a,
                b,
                Box::new(|x, _y| {
                    x.currency = "EUR".into();
                    Err(LogisticsError::InvalidState("abort".into()))
                }),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(store.get(a).await.unwrap().unwrap().currency, "INR");
    }
}
