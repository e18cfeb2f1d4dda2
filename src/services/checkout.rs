use crate::{
    chat::{ChatSink, OutboundMessage},
    crm::{CrmClient, CRM_STATUS_PAID},
    entities::order::{self, DeliveryMethod},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        catalog::CatalogService,
        orders::{AdmissionOutcome, NewOrder, OrderService, PaymentConfirmation},
        payments::PaymentLinkService,
    },
};
use std::sync::Arc;
use tracing::{instrument, warn};

/// Completed conversation output, validated but not yet priced
#[derive(Debug, Clone)]
pub struct CheckoutDraft {
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
}

/// Result of finalizing a completed conversation
#[derive(Debug)]
pub enum FinalizeOutcome {
    /// Order stored with its payment link attached
    Created { order: order::Model },
    /// Drop capacity ran out between catalog-open and confirm
    AdmissionClosed,
    /// The draft referenced a product that no longer exists
    SessionExpired,
}

/// Result of consuming a payment provider confirmation callback
#[derive(Debug)]
pub enum ConfirmationOutcome {
    /// First confirmation; paid side effects fired exactly now
    Confirmed { order: order::Model },
    /// Replayed confirmation; nothing changed
    AlreadyPaid { order: order::Model },
    /// Signature mismatch; nothing was looked up or mutated
    InvalidSignature,
    /// Valid signature but no order carries this invoice id
    UnknownOrder,
}

/// Orchestrates order finalization and payment reconciliation
///
/// Sits between the conversation engine and the stores: admission-guarded
/// insert, best-effort CRM lead, signed payment link, and the idempotent
/// webhook transition with its one-time side effects.
pub struct CheckoutService {
    catalog: Arc<CatalogService>,
    orders: Arc<OrderService>,
    payments: Arc<PaymentLinkService>,
    crm: Option<Arc<CrmClient>>,
    chat: Arc<dyn ChatSink>,
    event_sender: Arc<EventSender>,
    price_rub: i64,
}

impl CheckoutService {
    pub fn new(
        catalog: Arc<CatalogService>,
        orders: Arc<OrderService>,
        payments: Arc<PaymentLinkService>,
        crm: Option<Arc<CrmClient>>,
        chat: Arc<dyn ChatSink>,
        event_sender: Arc<EventSender>,
        price_rub: i64,
    ) -> Self {
        Self {
            catalog,
            orders,
            payments,
            crm,
            chat,
            event_sender,
            price_rub,
        }
    }

    /// Turns a completed draft into a stored order with a payment link
    ///
    /// CRM lead creation is best-effort: a failure is logged and the order
    /// proceeds without a lead. Payment link persistence is not: an order the
    /// buyer cannot pay for is an error.
    #[instrument(skip(self, draft), fields(user_id = draft.user_id, product_id = draft.product_id))]
    pub async fn finalize_order(&self, draft: CheckoutDraft) -> Result<FinalizeOutcome, ServiceError> {
        let Some(product) = self.catalog.get(draft.product_id).await? else {
            warn!(
                user_id = draft.user_id,
                product_id = draft.product_id,
                "Finalize referenced a product that no longer exists"
            );
            return Ok(FinalizeOutcome::SessionExpired);
        };

        let amount = if product.price > 0 {
            product.price
        } else {
            self.price_rub
        };

        let admitted = self
            .orders
            .create_admitted(NewOrder {
                user_id: draft.user_id,
                product_id: draft.product_id,
                color: draft.color,
                size: draft.size,
                delivery_method: draft.delivery_method,
                city: draft.city,
                address: draft.address,
                pickup_point: draft.pickup_point,
                courier_comment: draft.courier_comment,
                full_name: draft.full_name,
                phone: draft.phone,
                amount,
            })
            .await?;

        let order = match admitted {
            AdmissionOutcome::Closed => return Ok(FinalizeOutcome::AdmissionClosed),
            AdmissionOutcome::Admitted(order) => order,
        };

        if let Some(crm) = &self.crm {
            match crm.create_lead(&order, &product).await {
                Some(lead_id) => self.orders.attach_crm_lead(order.id, lead_id).await?,
                None => {
                    if let Err(e) = self
                        .event_sender
                        .send(Event::CrmSyncFailed { order_id: order.id })
                        .await
                    {
                        warn!(error = %e, "Failed to publish CRM sync failed event");
                    }
                }
            }
        }

        let payment_url = self.payments.build_payment_url(order.amount, order.id)?;
        let order = self.orders.attach_payment_link(order.id, payment_url).await?;

        Ok(FinalizeOutcome::Created { order })
    }

    /// Consumes a payment provider result callback
    ///
    /// Verification happens before any lookup, so a tampered request learns
    /// nothing about stored orders. Only the first `PENDING -> PAID`
    /// transition pushes the CRM status and notifies the buyer.
    #[instrument(skip(self, signature))]
    pub async fn handle_payment_confirmation(
        &self,
        out_sum: &str,
        invoice_id: i64,
        signature: &str,
    ) -> Result<ConfirmationOutcome, ServiceError> {
        if !self.payments.verify_result(out_sum, invoice_id, signature) {
            warn!(invoice_id, "Payment confirmation carried an invalid signature");
            return Ok(ConfirmationOutcome::InvalidSignature);
        }

        let Some(order) = self.orders.find_by_invoice(invoice_id).await? else {
            warn!(invoice_id, "Payment confirmation for unknown invoice");
            return Ok(ConfirmationOutcome::UnknownOrder);
        };

        let order = match self.orders.mark_paid(order.id).await {
            Ok(PaymentConfirmation::Confirmed(order)) => order,
            Ok(PaymentConfirmation::AlreadyPaid(order)) => {
                return Ok(ConfirmationOutcome::AlreadyPaid { order });
            }
            Err(ServiceError::NotFound(_)) => return Ok(ConfirmationOutcome::UnknownOrder),
            Err(e) => return Err(e),
        };

        if let Some(crm) = &self.crm {
            if let Some(lead_id) = order.crm_lead_id {
                if !crm.update_status(lead_id, CRM_STATUS_PAID).await {
                    if let Err(e) = self
                        .event_sender
                        .send(Event::CrmSyncFailed { order_id: order.id })
                        .await
                    {
                        warn!(error = %e, "Failed to publish CRM sync failed event");
                    }
                }
            }
        }

        // Fire-and-forget: the provider expects a fast acknowledgment and the
        // sink already retries internally.
        let note = OutboundMessage::text(
            order.user_id,
            format!(
                "✅ Оплата получена! Заказ №{} принят. Статус обновится в разделе \
                 «Мои заказы». Спасибо, что стали частью первого дропа 👟",
                order.id
            ),
        );
        let chat = Arc::clone(&self.chat);
        let order_id = order.id;
        tokio::spawn(async move {
            if let Err(e) = chat.deliver(note).await {
                warn!(order_id, error = %e, "Failed to deliver payment notification");
            }
        });

        Ok(ConfirmationOutcome::Confirmed { order })
    }
}
