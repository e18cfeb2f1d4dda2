use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Handle for emitting events onto the processing channel
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated(i64),
    PaymentLinkIssued {
        order_id: i64,
        invoice_id: i64,
    },

    // Payment webhook events
    PaymentConfirmed {
        order_id: i64,
    },
    PaymentConfirmationDuplicate {
        order_id: i64,
    },

    // Admission control events
    AdmissionRefused {
        user_id: i64,
    },

    // CRM side-channel events
    CrmLeadCreated {
        order_id: i64,
        lead_id: i64,
    },
    CrmSyncFailed {
        order_id: i64,
    },
}

/// Consumes events from the channel and reacts to them
///
/// The order and payment critical paths only emit here; everything consumed in
/// this loop is observability, so a handler failure never feeds back into the
/// request that produced the event.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderCreated(order_id) => {
                info!(order_id, "Order created");
            }
            Event::PaymentLinkIssued {
                order_id,
                invoice_id,
            } => {
                info!(order_id, invoice_id, "Payment link issued");
            }
            Event::PaymentConfirmed { order_id } => {
                info!(order_id, "Payment confirmed");
            }
            Event::PaymentConfirmationDuplicate { order_id } => {
                warn!(order_id, "Duplicate payment confirmation ignored");
            }
            Event::AdmissionRefused { user_id } => {
                info!(user_id, "Order refused, drop limit reached");
            }
            Event::CrmLeadCreated { order_id, lead_id } => {
                info!(order_id, lead_id, "CRM lead created");
            }
            Event::CrmSyncFailed { order_id } => {
                error!(order_id, "CRM synchronization failed");
            }
        }
    }

    info!("Event processing loop stopped");
}
