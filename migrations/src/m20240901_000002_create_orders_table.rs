use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create orders table
        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Orders::Id)
                            .big_integer()
                            .primary_key()
                            .auto_increment()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Orders::UserId).big_integer().not_null())
                    .col(ColumnDef::new(Orders::ProductId).integer().not_null())
                    .col(ColumnDef::new(Orders::Color).string().not_null())
                    .col(ColumnDef::new(Orders::Size).integer().not_null())
                    .col(ColumnDef::new(Orders::DeliveryMethod).string().not_null())
                    .col(ColumnDef::new(Orders::City).string().not_null())
                    .col(ColumnDef::new(Orders::Address).string().not_null())
                    .col(ColumnDef::new(Orders::PickupPoint).string().null())
                    .col(ColumnDef::new(Orders::CourierComment).string().null())
                    .col(ColumnDef::new(Orders::FullName).string().not_null())
                    .col(ColumnDef::new(Orders::Phone).string().not_null())
                    .col(
                        ColumnDef::new(Orders::Status)
                            .string()
                            .not_null()
                            .default("WAITING_PAYMENT"),
                    )
                    .col(
                        ColumnDef::new(Orders::PaymentStatus)
                            .string()
                            .not_null()
                            .default("PENDING"),
                    )
                    .col(
                        ColumnDef::new(Orders::Amount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Orders::PaymentUrl).text().null())
                    .col(ColumnDef::new(Orders::InvoiceId).big_integer().null())
                    .col(ColumnDef::new(Orders::CrmLeadId).big_integer().null())
                    .col(ColumnDef::new(Orders::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Orders::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // Admission control counts by payment status on every catalog open
        manager
            .create_index(
                Index::create()
                    .name("idx_orders_payment_status")
                    .table(Orders::Table)
                    .col(Orders::PaymentStatus)
                    .to_owned(),
            )
            .await?;

        // Per-user order history lookups
        manager
            .create_index(
                Index::create()
                    .name("idx_orders_user_id")
                    .table(Orders::Table)
                    .col(Orders::UserId)
                    .to_owned(),
            )
            .await?;

        // Webhook reconciliation looks orders up by invoice id
        manager
            .create_index(
                Index::create()
                    .name("idx_orders_invoice_id")
                    .table(Orders::Table)
                    .col(Orders::InvoiceId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop orders table
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Orders {
    Table,
    Id,
    UserId,
    ProductId,
    Color,
    Size,
    DeliveryMethod,
    City,
    Address,
    PickupPoint,
    CourierComment,
    FullName,
    Phone,
    Status,
    PaymentStatus,
    Amount,
    PaymentUrl,
    InvoiceId,
    CrmLeadId,
    CreatedAt,
    UpdatedAt,
}
