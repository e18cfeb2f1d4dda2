use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Order entity
///
/// Created once per confirmed checkout, mutated only by the order lifecycle
/// service, never deleted. The invoice id is written at payment-link issuance
/// time and always equals the order id.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
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
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub amount: i64,
    #[sea_orm(column_type = "Text", nullable)]
    pub payment_url: Option<String>,
    pub invoice_id: Option<i64>,
    pub crm_lead_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Order lifecycle status
///
/// Linear, no cycles. Only the transition into `PaidAccepted` is persisted by
/// this service (verified payment webhook); the later stages are read-only
/// projections of the CRM status at display time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[sea_orm(string_value = "WAITING_PAYMENT")]
    WaitingPayment,
    #[sea_orm(string_value = "PAID_ACCEPTED")]
    PaidAccepted,
    #[sea_orm(string_value = "PREPARING")]
    Preparing,
    #[sea_orm(string_value = "SHIPPED")]
    Shipped,
    #[sea_orm(string_value = "DELIVERED")]
    Delivered,
}

/// Payment status, transitions out of `Pending` exactly once
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "PAID")]
    Paid,
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

/// Delivery method enumeration
///
/// Pickup-point delivery collects a single combined city+address line, courier
/// delivery collects an address line and then an optional comment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryMethod {
    #[sea_orm(string_value = "PICKUP_POINT")]
    PickupPoint,
    #[sea_orm(string_value = "COURIER")]
    Courier,
}
