use super::job::{Job, JobFilter, JobRef};
use super::notification::Notification;
use super::payment::PaymentTransaction;
use super::wallet::Wallet;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// A conditional update. It runs against a copy of the stored document while
/// the store holds its write lock; returning `Err` discards the copy.
pub type Mutation<T> = Box<dyn FnOnce(&mut T) -> Result<()> + Send>;

/// Like [`Mutation`], over two documents committed together.
pub type PairMutation<T> = Box<dyn FnOnce(&mut T, &mut T) -> Result<()> + Send>;

#[async_trait]
pub trait JobStore<J: Job>: Send + Sync {
    async fn insert(&self, job: J) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<J>>;
    async fn find(&self, filter: &JobFilter) -> Result<Vec<J>>;
    /// Fails with `NotFound` if no job has this id.
    async fn update_atomic(&self, id: Uuid, mutation: Mutation<J>) -> Result<J>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Stores `tx` unless a payment for the same job already exists. Returns the
    /// stored record and whether it was newly created.
    async fn insert_for_job(&self, tx: PaymentTransaction) -> Result<(PaymentTransaction, bool)>;
    async fn get(&self, id: Uuid) -> Result<Option<PaymentTransaction>>;
    async fn find_for_job(&self, job: JobRef) -> Result<Option<PaymentTransaction>>;
    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<PaymentTransaction>>;
    async fn update_atomic(
        &self,
        id: Uuid,
        mutation: Mutation<PaymentTransaction>,
    ) -> Result<PaymentTransaction>;
}

#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<Wallet>>;
    /// Inserts `wallet` if its owner has none yet and returns whichever is stored.
    async fn get_or_insert(&self, wallet: Wallet) -> Result<Wallet>;
    async fn get_all(&self) -> Result<Vec<Wallet>>;
    async fn update_atomic(&self, user_id: Uuid, mutation: Mutation<Wallet>) -> Result<Wallet>;
    async fn update_pair_atomic(
        &self,
        first: Uuid,
        second: Uuid,
        mutation: PairMutation<Wallet>,
    ) -> Result<(Wallet, Wallet)>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<()>;
}

pub type JobStoreRef<J> = Arc<dyn JobStore<J>>;
pub type PaymentStoreRef = Arc<dyn PaymentStore>;
pub type WalletStoreRef = Arc<dyn WalletStore>;
pub type NotifierRef = Arc<dyn Notifier>;
