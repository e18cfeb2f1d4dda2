use crate::{
    db::DbPool,
    entities::order::{self, DeliveryMethod, Entity as Order, OrderStatus, PaymentStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

/// Fields collected by the conversation before an order exists
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i64,
    pub product_id: i32,
    pub color: String,
    pub size: i32,
    pub delivery_method: DeliveryMethod,
    pub city: String,
    pub address: String,
    pub pickup_point: Option<String>,
    pub courier_comment: Option<String>,
    pub full_name: String,
    pub phone: String,
    pub amount: i64,
}

/// Result of an admission-guarded order insert
#[derive(Debug)]
pub enum AdmissionOutcome {
    /// The order was stored while the drop still had capacity
    Admitted(order::Model),
    /// The active-order count had reached the drop limit
    Closed,
}

/// Result of consuming a verified payment confirmation
#[derive(Debug)]
pub enum PaymentConfirmation {
    /// First confirmation; the order moved to paid exactly now
    Confirmed(order::Model),
    /// Replayed confirmation; the order was already paid
    AlreadyPaid(order::Model),
}

/// Durable order store: admission control, payment reconciliation, history
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    drop_limit: u64,
    // Serializes finalization so two buyers cannot both pass the capacity
    // check before either insert lands.
    admission_lock: Mutex<()>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, drop_limit: u64) -> Self {
        Self {
            db_pool,
            event_sender,
            drop_limit,
            admission_lock: Mutex::new(()),
        }
    }

    pub fn drop_limit(&self) -> u64 {
        self.drop_limit
    }

    /// Counts orders holding a drop slot (payment pending or paid)
    ///
    /// Failed payments release their slot by not counting here.
    #[instrument(skip(self))]
    pub async fn active_order_count(&self) -> Result<u64, ServiceError> {
        let db = &*self.db_pool;

        let count = Order::find()
            .filter(
                order::Column::PaymentStatus
                    .is_in([PaymentStatus::Pending, PaymentStatus::Paid]),
            )
            .count(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Database error when counting active orders");
                ServiceError::DatabaseError(e)
            })?;

        Ok(count)
    }

    /// Advisory capacity check used before starting a conversation
    ///
    /// The answer can go stale by the time the buyer finishes the flow;
    /// `create_admitted` re-checks under the lock and is the only gate that
    /// counts.
    pub async fn admission_open(&self) -> Result<bool, ServiceError> {
        Ok(self.active_order_count().await? < self.drop_limit)
    }

    /// Inserts an order iff the drop still has capacity
    ///
    /// The capacity check and the insert run under one lock and one
    /// transaction, so the active-order count can never exceed the limit.
    #[instrument(skip(self, draft), fields(user_id = draft.user_id, product_id = draft.product_id))]
    pub async fn create_admitted(&self, draft: NewOrder) -> Result<AdmissionOutcome, ServiceError> {
        let _guard = self.admission_lock.lock().await;
        let db = &*self.db_pool;

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin order admission transaction");
            ServiceError::DatabaseError(e)
        })?;

        let active = Order::find()
            .filter(
                order::Column::PaymentStatus
                    .is_in([PaymentStatus::Pending, PaymentStatus::Paid]),
            )
            .count(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, "Database error when re-checking drop capacity");
                ServiceError::DatabaseError(e)
            })?;

        if active >= self.drop_limit {
            txn.rollback().await.map_err(|e| {
                error!(error = %e, "Failed to roll back admission transaction");
                ServiceError::DatabaseError(e)
            })?;
            info!(
                user_id = draft.user_id,
                active, limit = self.drop_limit,
                "Admission refused, drop limit reached"
            );
            if let Err(e) = self
                .event_sender
                .send(Event::AdmissionRefused { user_id: draft.user_id })
                .await
            {
                warn!(error = %e, "Failed to publish admission refused event");
            }
            return Ok(AdmissionOutcome::Closed);
        }

        let now = Utc::now();
        let model = order::ActiveModel {
            user_id: Set(draft.user_id),
            product_id: Set(draft.product_id),
            color: Set(draft.color),
            size: Set(draft.size),
            delivery_method: Set(draft.delivery_method),
            city: Set(draft.city),
            address: Set(draft.address),
            pickup_point: Set(draft.pickup_point),
            courier_comment: Set(draft.courier_comment),
            full_name: Set(draft.full_name),
            phone: Set(draft.phone),
            status: Set(OrderStatus::WaitingPayment),
            payment_status: Set(PaymentStatus::Pending),
            amount: Set(draft.amount),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let inserted = model.insert(&txn).await.map_err(|e| {
            error!(error = %e, "Failed to insert order");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit order admission transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = inserted.id, user_id = inserted.user_id, "Order admitted");
        if let Err(e) = self.event_sender.send(Event::OrderCreated(inserted.id)).await {
            warn!(error = %e, "Failed to publish order created event");
        }

        Ok(AdmissionOutcome::Admitted(inserted))
    }

    /// Persists the issued payment link; the order id doubles as invoice id
    #[instrument(skip(self, payment_url))]
    pub async fn attach_payment_link(
        &self,
        order_id: i64,
        payment_url: String,
    ) -> Result<order::Model, ServiceError> {
        let db = &*self.db_pool;

        let found = Order::find_by_id(order_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(order_id, error = %e, "Database error when fetching order");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let mut active: order::ActiveModel = found.into();
        active.payment_url = Set(Some(payment_url));
        active.invoice_id = Set(Some(order_id));
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await.map_err(|e| {
            error!(order_id, error = %e, "Failed to persist payment link");
            ServiceError::DatabaseError(e)
        })?;

        if let Err(e) = self
            .event_sender
            .send(Event::PaymentLinkIssued { order_id, invoice_id: order_id })
            .await
        {
            warn!(error = %e, "Failed to publish payment link issued event");
        }

        Ok(updated)
    }

    /// Records the CRM lead id created for an order
    #[instrument(skip(self))]
    pub async fn attach_crm_lead(&self, order_id: i64, lead_id: i64) -> Result<(), ServiceError> {
        let db = &*self.db_pool;

        let found = Order::find_by_id(order_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(order_id, error = %e, "Database error when fetching order");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let mut active: order::ActiveModel = found.into();
        active.crm_lead_id = Set(Some(lead_id));
        active.updated_at = Set(Utc::now());

        active.update(db).await.map_err(|e| {
            error!(order_id, error = %e, "Failed to persist CRM lead id");
            ServiceError::DatabaseError(e)
        })?;

        if let Err(e) = self
            .event_sender
            .send(Event::CrmLeadCreated { order_id, lead_id })
            .await
        {
            warn!(error = %e, "Failed to publish CRM lead created event");
        }

        Ok(())
    }

    /// Moves an order to paid, exactly once
    ///
    /// The transition is a guarded update: it only fires while the payment
    /// status is still pending, so a replayed confirmation cannot repeat the
    /// side effects. `Err(NotFound)` means the order id does not exist.
    #[instrument(skip(self))]
    pub async fn mark_paid(&self, order_id: i64) -> Result<PaymentConfirmation, ServiceError> {
        let db = &*self.db_pool;

        let update = order::ActiveModel {
            payment_status: Set(PaymentStatus::Paid),
            status: Set(OrderStatus::PaidAccepted),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };

        let result = Order::update_many()
            .set(update)
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .exec(db)
            .await
            .map_err(|e| {
                error!(order_id, error = %e, "Failed to apply payment confirmation");
                ServiceError::DatabaseError(e)
            })?;

        let refreshed = Order::find_by_id(order_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(order_id, error = %e, "Database error when refetching order");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if result.rows_affected == 0 {
            info!(order_id, "Duplicate payment confirmation ignored");
            if let Err(e) = self
                .event_sender
                .send(Event::PaymentConfirmationDuplicate { order_id })
                .await
            {
                warn!(error = %e, "Failed to publish duplicate confirmation event");
            }
            return Ok(PaymentConfirmation::AlreadyPaid(refreshed));
        }

        info!(order_id, "Payment confirmed");
        if let Err(e) = self.event_sender.send(Event::PaymentConfirmed { order_id }).await {
            warn!(error = %e, "Failed to publish payment confirmed event");
        }

        Ok(PaymentConfirmation::Confirmed(refreshed))
    }

    /// Fetches an order by id
    #[instrument(skip(self))]
    pub async fn get(&self, order_id: i64) -> Result<Option<order::Model>, ServiceError> {
        let db = &*self.db_pool;

        let found = Order::find_by_id(order_id).one(db).await.map_err(|e| {
            error!(order_id, error = %e, "Database error when fetching order");
            ServiceError::DatabaseError(e)
        })?;

        Ok(found)
    }

    /// Resolves an order by the invoice id carried in a payment webhook
    #[instrument(skip(self))]
    pub async fn find_by_invoice(&self, invoice_id: i64) -> Result<Option<order::Model>, ServiceError> {
        let db = &*self.db_pool;

        let found = Order::find()
            .filter(order::Column::InvoiceId.eq(invoice_id))
            .one(db)
            .await
            .map_err(|e| {
                error!(invoice_id, error = %e, "Database error when resolving invoice");
                ServiceError::DatabaseError(e)
            })?;

        Ok(found)
    }

    /// Latest orders for one user, newest first
    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<order::Model>, ServiceError> {
        let db = &*self.db_pool;

        let orders = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .limit(10)
            .all(db)
            .await
            .map_err(|e| {
                error!(user_id, error = %e, "Database error when listing orders");
                ServiceError::DatabaseError(e)
            })?;

        Ok(orders)
    }
}
