use super::{Outcome, notify};
use crate::domain::actor::{Actor, Role};
use crate::domain::collection::CollectionRequest;
use crate::domain::job::{Job, JobKind, JobRef};
use crate::domain::notification::{Notification, NotificationKind};
use crate::domain::order::Order;
use crate::domain::payment::{
    PaymentDetails, PaymentMethod, PaymentStatus, PaymentSummary, PaymentTransaction,
};
use crate::domain::ports::{JobStoreRef, NotifierRef, PaymentStoreRef};
use crate::error::{LogisticsError, Result};
use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

/// Settles the payment records raised by completed jobs.
pub struct PaymentService {
    payments: PaymentStoreRef,
    collections: JobStoreRef<CollectionRequest>,
    orders: JobStoreRef<Order>,
    notifier: NotifierRef,
}

async fn set_payment_status<J: Job>(jobs: &JobStoreRef<J>, id: Uuid, status: PaymentStatus) -> Result<()> {
    jobs.update_atomic(
        id,
        Box::new(move |job: &mut J| {
            job.set_payment_status(status, Utc::now());
            Ok(())
        }),
    )
    .await
    .map(|_| ())
}

impl PaymentService {
    pub fn new(
        payments: PaymentStoreRef,
        collections: JobStoreRef<CollectionRequest>,
        orders: JobStoreRef<Order>,
        notifier: NotifierRef,
    ) -> Self {
        Self {
            payments,
            collections,
            orders,
            notifier,
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<PaymentTransaction> {
        self.payments
            .get(id)
            .await?
            .ok_or_else(|| LogisticsError::not_found("Transaction", id))
    }

    pub async fn for_job(&self, job: JobRef) -> Result<Option<PaymentTransaction>> {
        self.payments.find_for_job(job).await
    }

    /// The caller's transactions, newest first. MCPs see what they owe,
    /// partners what they are owed.
    pub async fn list_for(&self, actor: &Actor) -> Result<Vec<PaymentTransaction>> {
        let user = actor.user_id;
        let mut transactions = self.payments.find_by_user(user).await?;
        transactions.retain(|tx| match actor.role {
            Role::Mcp => tx.mcp == user,
            Role::PickupPartner => tx.pickup_partner == Some(user),
        });
        Ok(transactions)
    }

    pub async fn summary(&self, actor: &Actor) -> Result<PaymentSummary> {
        let transactions = self.list_for(actor).await?;
        PaymentSummary::from_transactions(&transactions)
    }

    async fn mark_job(&self, job: JobRef, status: PaymentStatus) -> Result<()> {
        match job.kind {
            JobKind::Collection => set_payment_status(&self.collections, job.id, status).await,
            JobKind::Order => set_payment_status(&self.orders, job.id, status).await,
        }
    }

    /// Captures how a pending payment was settled and marks its job paid.
    #[tracing::instrument(skip(self, details), fields(actor = %actor.user_id))]
    pub async fn record_payment(
        &self,
        id: Uuid,
        method: PaymentMethod,
        details: PaymentDetails,
        actor: &Actor,
    ) -> Result<Outcome<PaymentTransaction>> {
        let before = self.get(id).await?;
        let user = actor.user_id;
        let tx = self
            .payments
            .update_atomic(
                id,
                Box::new(move |tx: &mut PaymentTransaction| {
                    if !tx.involves(user) {
                        return Err(LogisticsError::Unauthorized(format!(
                            "user {user} is not a party to transaction {}",
                            tx.id
                        )));
                    }
                    if tx.status != PaymentStatus::Pending {
                        return Err(LogisticsError::InvalidState(format!(
                            "transaction {} is already settled",
                            tx.id
                        )));
                    }
                    tx.payment_method = method;
                    tx.payment_details = Some(details);
                    tx.status = PaymentStatus::Completed;
                    tx.updated_at = Utc::now();
                    Ok(())
                }),
            )
            .await?;

        if let Err(e) = self.mark_job(tx.job, PaymentStatus::Completed).await {
            error!(transaction = %id, job = %tx.job, error = %e, "job not marked paid, reverting payment");
            return Err(self.restore(before, e).await);
        }
        info!(transaction = %id, job = %tx.job, method = ?method, "payment recorded");

        let mut outcome = Outcome::new(tx);
        if let Some(partner) = outcome.value.pickup_partner {
            let notification = Notification::new(
                partner,
                NotificationKind::PaymentReceived,
                "Payment received",
                format!(
                    "Payment of {} for {} was recorded",
                    outcome.value.amount.value(),
                    outcome.value.job
                ),
            )
            .for_job(outcome.value.job.id);
            notify(self.notifier.as_ref(), notification, &mut outcome).await;
        }
        Ok(outcome)
    }

    /// Marks a pending payment as failed, and its job's payment status with it.
    #[tracing::instrument(skip(self), fields(actor = %actor.user_id))]
    pub async fn fail_payment(
        &self,
        id: Uuid,
        reason: String,
        actor: &Actor,
    ) -> Result<PaymentTransaction> {
        let before = self.get(id).await?;
        let user = actor.user_id;
        let tx = self
            .payments
            .update_atomic(
                id,
                Box::new(move |tx: &mut PaymentTransaction| {
                    if !tx.involves(user) {
                        return Err(LogisticsError::Unauthorized(format!(
                            "user {user} is not a party to transaction {}",
                            tx.id
                        )));
                    }
                    if tx.status != PaymentStatus::Pending {
                        return Err(LogisticsError::InvalidState(format!(
                            "transaction {} is already settled",
                            tx.id
                        )));
                    }
                    tx.status = PaymentStatus::Failed;
                    tx.notes = Some(reason);
                    tx.updated_at = Utc::now();
                    Ok(())
                }),
            )
            .await?;
        if let Err(e) = self.mark_job(tx.job, PaymentStatus::Failed).await {
            error!(transaction = %id, job = %tx.job, error = %e, "job not marked failed, reverting payment");
            return Err(self.restore(before, e).await);
        }
        info!(transaction = %id, "payment failed");
        Ok(tx)
    }

    /// Puts `before` back after its job could not follow, and returns the error to report.
    async fn restore(&self, before: PaymentTransaction, cause: LogisticsError) -> LogisticsError {
        let id = before.id;
        let restored = self
            .payments
            .update_atomic(
                id,
                Box::new(move |tx: &mut PaymentTransaction| {
                    *tx = before;
                    Ok(())
                }),
            )
            .await;
        match restored {
            Ok(_) => cause,
            Err(restore_err) => {
                error!(transaction = %id, error = %restore_err, "payment could not be reverted");
                LogisticsError::Storage(format!(
                    "job update for transaction {id} failed ({cause}) and the payment could not be reverted ({restore_err})"
                ))
            }
        }
    }
}
