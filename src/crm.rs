//! Best-effort CRM lead integration.
//!
//! Orders are mirrored into the CRM as leads over its JSON REST surface
//! (`crm.lead.add.json`, `crm.lead.get.json`, `crm.lead.update.json`). Every
//! call here is advisory: a missing, slow, or failing CRM must never fail the
//! order path, so the API returns `Option`/`bool` and logs instead of
//! propagating errors.

use crate::config::CrmConfig;
use crate::entities::{
    order::{self, OrderStatus},
    product,
};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, instrument, warn};

/// CRM status id stamped onto a lead when its order is paid
pub const CRM_STATUS_PAID: &str = "IN_PROCESS";

pub struct CrmClient {
    client: reqwest::Client,
    base_url: String,
    lead_source_id: String,
}

impl CrmClient {
    /// Builds a client when a CRM base URL is configured, `None` otherwise
    pub fn from_config(config: &CrmConfig) -> Option<Self> {
        let base_url = config.base_url.as_deref()?.trim();
        if base_url.is_empty() {
            return None;
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap();

        Some(Self {
            client,
            base_url: format!("{}/", base_url.trim_end_matches('/')),
            lead_source_id: config.lead_source_id.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}{}", self.base_url, method)
    }

    /// Creates a preorder lead for a freshly stored order
    ///
    /// Returns the CRM lead id, or `None` when the CRM declined or
    /// misbehaved.
    #[instrument(skip(self, order, product), fields(order_id = order.id))]
    pub async fn create_lead(
        &self,
        order: &order::Model,
        product: &product::Model,
    ) -> Option<i64> {
        let mut comments = format!(
            "Модель/цвет/размер: {} / {} / {}\nДоставка: {}; {}",
            product.name, order.color, order.size, order.delivery_method, order.address
        );
        if let Some(pickup_point) = &order.pickup_point {
            comments.push_str(&format!("; ПВЗ: {}", pickup_point));
        }
        if let Some(comment) = &order.courier_comment {
            comments.push_str(&format!("; Комментарий: {}", comment));
        }
        comments.push_str(&format!("\nСтатус оплаты: {}", order.payment_status));

        let body = json!({
            "fields": {
                "TITLE": format!("Предзаказ дропа (№{})", order.id),
                "NAME": order.full_name,
                "PHONE": [{"VALUE": order.phone, "VALUE_TYPE": "WORK"}],
                "SOURCE_ID": self.lead_source_id,
                "OPENED": "Y",
                "COMMENTS": comments,
            }
        });

        let response = match self
            .client
            .post(self.method_url("crm.lead.add.json"))
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(order_id = order.id, error = %e, "CRM lead creation request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(
                order_id = order.id,
                status = %response.status(),
                "CRM rejected lead creation"
            );
            return None;
        }

        let root: Value = match response.json().await {
            Ok(root) => root,
            Err(e) => {
                warn!(order_id = order.id, error = %e, "CRM lead creation returned invalid JSON");
                return None;
            }
        };

        let lead_id = parse_lead_id(root.get("result"));
        match lead_id {
            Some(lead_id) => info!(order_id = order.id, lead_id, "CRM lead created"),
            None => warn!(order_id = order.id, "CRM lead creation response carried no id"),
        }
        lead_id
    }

    /// Fetches a lead's CRM status mapped onto the order lifecycle
    #[instrument(skip(self))]
    pub async fn fetch_status(&self, lead_id: i64) -> Option<OrderStatus> {
        let response = match self
            .client
            .get(self.method_url("crm.lead.get.json"))
            .query(&[("id", lead_id.to_string())])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(lead_id, error = %e, "CRM status fetch request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(lead_id, status = %response.status(), "CRM rejected status fetch");
            return None;
        }

        let root: Value = match response.json().await {
            Ok(root) => root,
            Err(e) => {
                warn!(lead_id, error = %e, "CRM status fetch returned invalid JSON");
                return None;
            }
        };

        let status_id = root
            .get("result")?
            .get("STATUS_ID")
            .and_then(Value::as_str)
            .unwrap_or("NEW");

        Some(map_crm_status(status_id))
    }

    /// Pushes a CRM status id onto a lead; `true` on acknowledged update
    #[instrument(skip(self))]
    pub async fn update_status(&self, lead_id: i64, status_id: &str) -> bool {
        let body = json!({
            "id": lead_id,
            "fields": {"STATUS_ID": status_id},
        });

        match self
            .client
            .post(self.method_url("crm.lead.update.json"))
            .json(&body)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(lead_id, status = %response.status(), "CRM rejected lead status update");
                false
            }
            Err(e) => {
                warn!(lead_id, error = %e, "CRM lead status update request failed");
                false
            }
        }
    }
}

fn parse_lead_id(result: Option<&Value>) -> Option<i64> {
    match result? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Maps a CRM lead status id onto the order lifecycle
///
/// CRM pipelines carry more stages than the storefront shows, so unknown
/// stages collapse onto the paid bucket rather than erroring.
pub fn map_crm_status(status_id: &str) -> OrderStatus {
    match status_id.to_ascii_uppercase().as_str() {
        "NEW" | "PREPAYMENT_INVOICE" => OrderStatus::WaitingPayment,
        "IN_PROCESS" => OrderStatus::PaidAccepted,
        "PREPARATION" => OrderStatus::Preparing,
        "DELIVERY" | "WON" => OrderStatus::Shipped,
        "FINAL_SUCCESS" => OrderStatus::Delivered,
        _ => OrderStatus::PaidAccepted,
    }
}
