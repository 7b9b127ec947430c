use super::{Outcome, notify};
use crate::config::EngineConfig;
use crate::domain::actor::{Actor, Role};
use crate::domain::collection::CollectionRequest;
use crate::domain::job::{Job, JobFilter, StatusChange};
use crate::domain::money::Price;
use crate::domain::notification::{Notification, NotificationKind, Priority};
use crate::domain::order::Order;
use crate::domain::payment::PaymentTransaction;
use crate::domain::ports::{JobStoreRef, NotifierRef, PaymentStoreRef};
use crate::domain::status::{JobStatus, validate_update};
use crate::error::{LogisticsError, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use uuid::Uuid;

pub type CollectionService = LifecycleManager<CollectionRequest>;
pub type OrderService = LifecycleManager<Order>;

/// A job after a status change, with the payment a completion produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate<J> {
    pub job: J,
    pub payment: Option<PaymentTransaction>,
}

/// Owns the status of every job of kind `J`.
///
/// All writes go through the store's conditional update, so the rule checks
/// and the write happen against the same version of the document.
pub struct LifecycleManager<J: Job> {
    jobs: JobStoreRef<J>,
    payments: PaymentStoreRef,
    notifier: NotifierRef,
    config: EngineConfig,
}

fn require_role(actor: &Actor, role: Role, action: &str) -> Result<()> {
    if actor.role == role {
        Ok(())
    } else {
        Err(LogisticsError::Unauthorized(format!(
            "{:?} accounts cannot {action}",
            actor.role
        )))
    }
}

impl<J: Job> LifecycleManager<J> {
    pub fn new(
        jobs: JobStoreRef<J>,
        payments: PaymentStoreRef,
        notifier: NotifierRef,
        config: EngineConfig,
    ) -> Self {
        Self {
            jobs,
            payments,
            notifier,
            config,
        }
    }

    #[tracing::instrument(skip(self, draft), fields(kind = J::KIND.label(), mcp = %actor.user_id))]
    pub async fn create(&self, actor: &Actor, draft: J::Draft) -> Result<J> {
        require_role(actor, Role::Mcp, "create jobs")?;
        let job = J::from_draft(Uuid::new_v4(), actor.user_id, draft, Utc::now(), &self.config)?;
        self.jobs.insert(job.clone()).await?;
        info!(job = %job.id(), "job created");
        Ok(job)
    }

    pub async fn get(&self, id: Uuid) -> Result<J> {
        self.jobs
            .get(id)
            .await?
            .ok_or_else(|| LogisticsError::not_found(J::KIND.label(), id))
    }

    /// Jobs raised by the calling MCP, newest first.
    pub async fn list_for_mcp(&self, actor: &Actor) -> Result<Vec<J>> {
        require_role(actor, Role::Mcp, "list owned jobs")?;
        self.jobs.find(&JobFilter::owned_by(actor.user_id)).await
    }

    /// Jobs assigned to the calling partner, newest first.
    pub async fn list_for_partner(&self, actor: &Actor) -> Result<Vec<J>> {
        require_role(actor, Role::PickupPartner, "list assigned jobs")?;
        self.jobs.find(&JobFilter::assigned_to(actor.user_id)).await
    }

    /// Pending jobs no partner has claimed yet, newest first.
    pub async fn list_available(&self) -> Result<Vec<J>> {
        self.jobs.find(&JobFilter::available()).await
    }

    /// Assigns a pending job to the calling partner.
    ///
    /// Of several partners racing for the same job exactly one wins; the others
    /// get `AlreadyAssigned`.
    #[tracing::instrument(skip(self), fields(kind = J::KIND.label(), partner = %actor.user_id))]
    pub async fn claim(&self, id: Uuid, actor: &Actor) -> Result<Outcome<J>> {
        require_role(actor, Role::PickupPartner, "claim jobs")?;
        let partner = actor.user_id;

        let job = self
            .jobs
            .update_atomic(
                id,
                Box::new(move |job: &mut J| {
                    if job.pickup_partner().is_some() {
                        return Err(LogisticsError::AlreadyAssigned(job.id()));
                    }
                    if job.status() != JobStatus::Pending {
                        return Err(LogisticsError::InvalidState(format!(
                            "{} {} is {}, not available for pickup",
                            J::KIND.label(),
                            job.id(),
                            job.status()
                        )));
                    }
                    job.assign(partner, Utc::now());
                    Ok(())
                }),
            )
            .await?;
        info!(job = %id, "job claimed");

        let mut outcome = Outcome::new(job);
        let notification = Notification::new(
            outcome.value.owner(),
            NotificationKind::OrderAssigned,
            format!("{} assigned", J::KIND.label()),
            format!("{} {id} was claimed by partner {partner}", J::KIND.label()),
        )
        .for_job(id);
        notify(self.notifier.as_ref(), notification, &mut outcome).await;
        Ok(outcome)
    }

    /// Moves a job along the status graph.
    ///
    /// Completing a job also raises its pending cash payment. If that payment
    /// cannot be stored the completion is rolled back and the error returned, so
    /// a retry starts from `in_progress` again.
    #[tracing::instrument(skip(self, change), fields(kind = J::KIND.label(), actor = %actor.user_id))]
    pub async fn update_status(
        &self,
        id: Uuid,
        to: JobStatus,
        actor: &Actor,
        change: StatusChange,
    ) -> Result<Outcome<StatusUpdate<J>>> {
        let requester = *actor;
        let job = self
            .jobs
            .update_atomic(
                id,
                Box::new(move |job: &mut J| {
                    validate_update(
                        job.status(),
                        to,
                        &requester,
                        job.owner(),
                        job.pickup_partner(),
                    )?;
                    job.apply_status(to, &change, Utc::now());
                    Ok(())
                }),
            )
            .await?;
        info!(job = %id, status = %to, "status updated");

        let payment = if to == JobStatus::Completed {
            Some(self.raise_payment(&job).await?)
        } else {
            None
        };

        let mut outcome = Outcome::new(StatusUpdate { job, payment });
        if let Some(notification) = self.status_notification(&outcome.value.job, actor) {
            notify(self.notifier.as_ref(), notification, &mut outcome).await;
        }
        Ok(outcome)
    }

    async fn raise_payment(&self, job: &J) -> Result<PaymentTransaction> {
        let payment = PaymentTransaction::for_completed_job(
            job.job_ref(),
            job.owner(),
            job.pickup_partner(),
            job.price(),
            Utc::now(),
        );
        match self.payments.insert_for_job(payment).await {
            Ok((payment, created)) => {
                if !created {
                    warn!(job = %job.id(), payment = %payment.id, "payment already raised for job");
                }
                Ok(payment)
            }
            Err(e) => {
                error!(job = %job.id(), error = %e, "payment not stored, reverting completion");
                self.revert_completion(job.id(), e).await
            }
        }
    }

    async fn revert_completion(&self, id: Uuid, cause: LogisticsError) -> Result<PaymentTransaction> {
        let reverted = self
            .jobs
            .update_atomic(
                id,
                Box::new(|job: &mut J| {
                    if job.status() == JobStatus::Completed {
                        job.apply_status(
                            JobStatus::InProgress,
                            &StatusChange::note("completion reverted: payment could not be recorded"),
                            Utc::now(),
                        );
                    }
                    Ok(())
                }),
            )
            .await;
        match reverted {
            Ok(_) => Err(cause),
            Err(revert_err) => {
                error!(job = %id, error = %revert_err, "completion could not be reverted");
                Err(LogisticsError::Storage(format!(
                    "payment for {} {id} failed ({cause}) and the completion could not be reverted ({revert_err})",
                    J::KIND.label()
                )))
            }
        }
    }

    fn status_notification(&self, job: &J, actor: &Actor) -> Option<Notification> {
        let label = J::KIND.label();
        match job.status() {
            JobStatus::Completed => Some(
                Notification::new(
                    job.owner(),
                    NotificationKind::OrderCompleted,
                    format!("{label} completed"),
                    format!("{label} {} was completed; payment of {} is pending", job.id(), job.price().value()),
                )
                .for_job(job.id()),
            ),
            // the partner is detached by the cancel, so only the owner can be told
            JobStatus::Cancelled if actor.user_id != job.owner() => Some(
                Notification::new(
                    job.owner(),
                    NotificationKind::OrderCancelled,
                    format!("{label} cancelled"),
                    format!("{label} {} was cancelled by {}", job.id(), actor.user_id),
                )
                .for_job(job.id())
                .with_priority(Priority::High),
            ),
            _ => None,
        }
    }

    /// Changes the price of an open job. Only the owning MCP may do this.
    #[tracing::instrument(skip(self), fields(kind = J::KIND.label(), actor = %actor.user_id))]
    pub async fn update_price(&self, id: Uuid, price: Decimal, actor: &Actor) -> Result<J> {
        let price = Price::new(price)?;
        let requester = *actor;
        let job = self
            .jobs
            .update_atomic(
                id,
                Box::new(move |job: &mut J| {
                    if requester.role != Role::Mcp || job.owner() != requester.user_id {
                        return Err(LogisticsError::Unauthorized(format!(
                            "only the owning MCP may change the price of {} {}",
                            J::KIND.label(),
                            job.id()
                        )));
                    }
                    if !job.status().is_open() {
                        return Err(LogisticsError::InvalidState(format!(
                            "{} {} is {}, its price is final",
                            J::KIND.label(),
                            job.id(),
                            job.status()
                        )));
                    }
                    job.set_price(price, Utc::now());
                    Ok(())
                }),
            )
            .await?;
        info!(job = %id, price = %price.value(), "price updated");
        Ok(job)
    }
}

impl LifecycleManager<Order> {
    /// Rates a completed order. Only the owning MCP may rate, and only once.
    #[tracing::instrument(skip(self, comment), fields(actor = %actor.user_id))]
    pub async fn rate(
        &self,
        id: Uuid,
        actor: &Actor,
        score: u8,
        comment: Option<String>,
    ) -> Result<Order> {
        let requester = *actor;
        self.jobs
            .update_atomic(
                id,
                Box::new(move |order: &mut Order| {
                    if requester.role != Role::Mcp || order.mcp_id != requester.user_id {
                        return Err(LogisticsError::Unauthorized(format!(
                            "only the owning MCP may rate order {}",
                            order.order_number
                        )));
                    }
                    order.rate(score, comment, Utc::now())
                }),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::collection::{CollectionDraft, QuantityUnit, WasteType};
    use crate::domain::job::GeoPoint;
    use crate::domain::order::{GeoAddress, OrderDraft};
    use crate::domain::payment::{PaymentMethod, PaymentStatus, PaymentType};
    use crate::domain::ports::{JobStore, Mutation, PaymentStore};
    use crate::infrastructure::in_memory::{InMemoryJobStore, InMemoryPaymentStore};
    use crate::infrastructure::notifier::RecordingNotifier;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    struct Fixture {
        service: CollectionService,
        jobs: InMemoryJobStore<CollectionRequest>,
        payments: InMemoryPaymentStore,
        notifier: RecordingNotifier,
        mcp: Actor,
        partner: Actor,
    }

    fn fixture() -> Fixture {
        let jobs = InMemoryJobStore::new();
        let payments = InMemoryPaymentStore::new();
        let notifier = RecordingNotifier::new();
        let service = LifecycleManager::new(
            Arc::new(jobs.clone()),
            Arc::new(payments.clone()),
            Arc::new(notifier.clone()),
            EngineConfig::default(),
        );
        Fixture {
            service,
            jobs,
            payments,
            notifier,
            mcp: Actor::mcp(Uuid::new_v4()),
            partner: Actor::partner(Uuid::new_v4()),
        }
    }

    fn draft() -> CollectionDraft {
        CollectionDraft {
            waste_type: Some(WasteType::Metal),
            quantity: Some(dec!(40)),
            unit: Some(QuantityUnit::Kg),
            scheduled_date: Some(Utc::now()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_requires_mcp() {
        let f = fixture();
        let result = f.service.create(&f.partner, draft()).await;
        assert!(matches!(result, Err(LogisticsError::Unauthorized(_))));

        let job = f.service.create(&f.mcp, draft()).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.mcp, f.mcp.user_id);
    }

    #[tokio::test]
    async fn test_claim_errors() {
        let f = fixture();
        assert!(matches!(
            f.service.claim(Uuid::new_v4(), &f.partner).await,
            Err(LogisticsError::NotFound { .. })
        ));

        let job = f.service.create(&f.mcp, draft()).await.unwrap();
        f.service.claim(job.id, &f.partner).await.unwrap();

        let rival = Actor::partner(Uuid::new_v4());
        assert!(matches!(
            f.service.claim(job.id, &rival).await,
            Err(LogisticsError::AlreadyAssigned(_))
        ));

        f.service
            .update_status(job.id, JobStatus::Cancelled, &f.mcp, StatusChange::default())
            .await
            .unwrap();
        assert!(matches!(
            f.service.claim(job.id, &rival).await,
            Err(LogisticsError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_claim_notifies_owner() {
        let f = fixture();
        let job = f.service.create(&f.mcp, draft()).await.unwrap();
        let outcome = f.service.claim(job.id, &f.partner).await.unwrap();
        assert!(outcome.warnings.is_empty());

        let sent = f.notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_id, f.mcp.user_id);
        assert_eq!(sent[0].kind, NotificationKind::OrderAssigned);
    }

    #[tokio::test]
    async fn test_notification_failure_is_a_warning() {
        let f = fixture();
        f.notifier.set_failing(true);
        let job = f.service.create(&f.mcp, draft()).await.unwrap();

        let outcome = f.service.claim(job.id, &f.partner).await.unwrap();
        assert_eq!(outcome.value.status, JobStatus::Assigned);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(
            f.jobs.get(job.id).await.unwrap().unwrap().pickup_partner,
            Some(f.partner.user_id)
        );
    }

    #[tokio::test]
    async fn test_completion_raises_one_pending_cash_payment() {
        let f = fixture();
        let job = f.service.create(&f.mcp, draft()).await.unwrap();
        f.service.update_price(job.id, dec!(500), &f.mcp).await.unwrap();
        f.service.claim(job.id, &f.partner).await.unwrap();
        f.service
            .update_status(job.id, JobStatus::InProgress, &f.partner, StatusChange::default())
            .await
            .unwrap();
        let outcome = f
            .service
            .update_status(job.id, JobStatus::Completed, &f.partner, StatusChange::default())
            .await
            .unwrap();

        let payment = outcome.value.payment.unwrap();
        assert_eq!(payment.amount.value(), dec!(500));
        assert_eq!(payment.kind, PaymentType::Payment);
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.payment_method, PaymentMethod::Cash);
        assert_eq!(outcome.value.job.payment_status, PaymentStatus::Pending);

        // a retried completion is rejected and raises nothing
        let retry = f
            .service
            .update_status(job.id, JobStatus::Completed, &f.partner, StatusChange::default())
            .await;
        assert!(matches!(retry, Err(LogisticsError::InvalidTransition { .. })));
        assert_eq!(f.payments.find_by_user(f.mcp.user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_transition_leaves_job_unchanged() {
        let f = fixture();
        let job = f.service.create(&f.mcp, draft()).await.unwrap();
        let claimed = f.service.claim(job.id, &f.partner).await.unwrap().value;

        let result = f
            .service
            .update_status(job.id, JobStatus::Completed, &f.partner, StatusChange::default())
            .await;
        assert!(matches!(result, Err(LogisticsError::InvalidTransition { .. })));
        assert_eq!(f.service.get(job.id).await.unwrap(), claimed);
    }

    #[tokio::test]
    async fn test_update_price_rules() {
        let f = fixture();
        let job = f.service.create(&f.mcp, draft()).await.unwrap();

        let other_mcp = Actor::mcp(Uuid::new_v4());
        assert!(matches!(
            f.service.update_price(job.id, dec!(100), &other_mcp).await,
            Err(LogisticsError::Unauthorized(_))
        ));
        assert!(matches!(
            f.service.update_price(job.id, dec!(-1), &f.mcp).await,
            Err(LogisticsError::ValidationError(_))
        ));

        f.service.claim(job.id, &f.partner).await.unwrap();
        f.service
            .update_status(job.id, JobStatus::Cancelled, &f.partner, StatusChange::default())
            .await
            .unwrap();
        assert!(matches!(
            f.service.update_price(job.id, dec!(100), &f.mcp).await,
            Err(LogisticsError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_listings() {
        let f = fixture();
        let first = f.service.create(&f.mcp, draft()).await.unwrap();
        let second = f.service.create(&f.mcp, draft()).await.unwrap();
        f.service.claim(first.id, &f.partner).await.unwrap();

        assert_eq!(f.service.list_for_mcp(&f.mcp).await.unwrap().len(), 2);
        let mine = f.service.list_for_partner(&f.partner).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, first.id);
        let available = f.service.list_available().await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, second.id);
    }

    /// Accepts nothing, to exercise the rollback path.
    struct BrokenPaymentStore;

    #[async_trait]
    impl PaymentStore for BrokenPaymentStore {
        async fn insert_for_job(&self, _tx: PaymentTransaction) -> Result<(PaymentTransaction, bool)> {
            Err(LogisticsError::Storage("payments offline".into()))
        }
        async fn get(&self, _id: Uuid) -> Result<Option<PaymentTransaction>> {
            Ok(None)
        }
        async fn find_for_job(&self, _job: crate::domain::job::JobRef) -> Result<Option<PaymentTransaction>> {
            Ok(None)
        }
        async fn find_by_user(&self, _user_id: Uuid) -> Result<Vec<PaymentTransaction>> {
            Ok(Vec::new())
        }
        async fn update_atomic(
            &self,
            id: Uuid,
            _mutation: Mutation<PaymentTransaction>,
        ) -> Result<PaymentTransaction> {
            Err(LogisticsError::not_found("Transaction", id))
        }
    }

    #[tokio::test]
    async fn test_failed_payment_reverts_completion() {
        let jobs = InMemoryJobStore::<CollectionRequest>::new();
        let service: CollectionService = LifecycleManager::new(
            Arc::new(jobs.clone()),
            Arc::new(BrokenPaymentStore),
            Arc::new(RecordingNotifier::new()),
            EngineConfig::default(),
        );
        let mcp = Actor::mcp(Uuid::new_v4());
        let partner = Actor::partner(Uuid::new_v4());
        let job = service.create(&mcp, draft()).await.unwrap();
        service.claim(job.id, &partner).await.unwrap();
        service
            .update_status(job.id, JobStatus::InProgress, &partner, StatusChange::default())
            .await
            .unwrap();

        let result = service
            .update_status(job.id, JobStatus::Completed, &partner, StatusChange::default())
            .await;
        assert!(matches!(result, Err(LogisticsError::Storage(_))));

        let stored = jobs.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::InProgress);
        assert_eq!(stored.pickup_partner, Some(partner.user_id));
    }

    #[tokio::test]
    async fn test_failed_payment_reverts_order_completion() {
        let jobs = InMemoryJobStore::<Order>::new();
        let service: OrderService = LifecycleManager::new(
            Arc::new(jobs.clone()),
            Arc::new(BrokenPaymentStore),
            Arc::new(RecordingNotifier::new()),
            EngineConfig::default(),
        );
        let address = |lng, lat| GeoAddress {
            street: None,
            city: Some("Pune".into()),
            state: None,
            country: Some("IN".into()),
            zip_code: None,
            coordinates: GeoPoint(lng, lat),
        };
        let draft = OrderDraft {
            pickup_address: Some(address(73.85, 18.52)),
            delivery_address: Some(address(73.91, 18.56)),
            price: Some(dec!(300)),
            estimated_pickup_time: Some(Utc::now()),
            ..Default::default()
        };
        let mcp = Actor::mcp(Uuid::new_v4());
        let partner = Actor::partner(Uuid::new_v4());
        let order = service.create(&mcp, draft).await.unwrap();
        service.claim(order.id, &partner).await.unwrap();
        service
            .update_status(order.id, JobStatus::InProgress, &partner, StatusChange::default())
            .await
            .unwrap();

        let result = service
            .update_status(order.id, JobStatus::Completed, &partner, StatusChange::default())
            .await;
        assert!(matches!(result, Err(LogisticsError::Storage(_))));

        let stored = jobs.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::InProgress);
        assert_eq!(stored.pickup_partner_id, Some(partner.user_id));
        assert!(stored.actual_pickup_time.is_some());
        assert!(stored.actual_delivery_time.is_none());
        assert!(stored.commission.amount.is_none());
        let statuses: Vec<_> = stored.timeline.iter().map(|t| t.status).collect();
        assert_eq!(
            statuses,
            vec![
                JobStatus::Pending,
                JobStatus::Assigned,
                JobStatus::InProgress,
                JobStatus::Completed,
                JobStatus::InProgress
            ]
        );
    }
}
