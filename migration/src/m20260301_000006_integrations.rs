use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建 rmm_integrations 表
        manager
            .create_table(
                Table::create()
                    .table(RmmIntegration::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RmmIntegration::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RmmIntegration::CompanyId).integer().not_null())
                    .col(
                        ColumnDef::new(RmmIntegration::Uuid)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(RmmIntegration::Name).string().not_null())
                    .col(
                        ColumnDef::new(RmmIntegration::Vendor)
                            .string()
                            .not_null()
                            .default("generic"),
                    )
                    .col(ColumnDef::new(RmmIntegration::ApiKey).string().null())
                    .col(ColumnDef::new(RmmIntegration::WebhookSecret).string().null())
                    .col(
                        ColumnDef::new(RmmIntegration::DefaultClientId)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RmmIntegration::AutoCreateAssets)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(RmmIntegration::TicketMinSeverity)
                            .string()
                            .not_null()
                            .default("high"),
                    )
                    .col(ColumnDef::new(RmmIntegration::FieldMappings).text().null())
                    .col(
                        ColumnDef::new(RmmIntegration::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(RmmIntegration::LastReceivedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RmmIntegration::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RmmIntegration::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 创建 webhook_events 表
        manager
            .create_table(
                Table::create()
                    .table(WebhookEvent::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WebhookEvent::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WebhookEvent::CompanyId).integer().null())
                    .col(ColumnDef::new(WebhookEvent::Source).string().not_null())
                    .col(ColumnDef::new(WebhookEvent::ExternalId).string().not_null())
                    .col(ColumnDef::new(WebhookEvent::EventType).string().null())
                    .col(ColumnDef::new(WebhookEvent::Payload).text().not_null())
                    .col(
                        ColumnDef::new(WebhookEvent::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(WebhookEvent::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(WebhookEvent::Error).text().null())
                    .col(
                        ColumnDef::new(WebhookEvent::ReceivedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookEvent::ProcessedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 去重：同一来源的外部事件 ID 只能出现一次
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uniq_webhook_events_source_external")
                    .table(WebhookEvent::Table)
                    .col(WebhookEvent::Source)
                    .col(WebhookEvent::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_webhook_events_status")
                    .table(WebhookEvent::Table)
                    .col(WebhookEvent::Status)
                    .to_owned(),
            )
            .await?;

        // 创建 physical_mail_orders 表
        manager
            .create_table(
                Table::create()
                    .table(PhysicalMailOrder::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PhysicalMailOrder::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PhysicalMailOrder::CompanyId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PhysicalMailOrder::ClientId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PhysicalMailOrder::InvoiceId).integer().null())
                    .col(ColumnDef::new(PhysicalMailOrder::ProviderId).string().null())
                    .col(
                        ColumnDef::new(PhysicalMailOrder::RecipientName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PhysicalMailOrder::AddressLine1)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PhysicalMailOrder::AddressLine2)
                            .string()
                            .null(),
                    )
                    .col(ColumnDef::new(PhysicalMailOrder::City).string().not_null())
                    .col(ColumnDef::new(PhysicalMailOrder::State).string().null())
                    .col(
                        ColumnDef::new(PhysicalMailOrder::PostalCode)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PhysicalMailOrder::Country).string().not_null())
                    .col(ColumnDef::new(PhysicalMailOrder::Description).text().null())
                    .col(
                        ColumnDef::new(PhysicalMailOrder::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(PhysicalMailOrder::TrackingNumber)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PhysicalMailOrder::LastEventAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PhysicalMailOrder::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PhysicalMailOrder::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_mail_orders_provider")
                    .table(PhysicalMailOrder::Table)
                    .col(PhysicalMailOrder::ProviderId)
                    .to_owned(),
            )
            .await?;

        // 创建 failed_jobs 表
        manager
            .create_table(
                Table::create()
                    .table(FailedJob::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FailedJob::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FailedJob::JobName).string().not_null())
                    .col(ColumnDef::new(FailedJob::Payload).text().not_null())
                    .col(ColumnDef::new(FailedJob::Error).text().not_null())
                    .col(ColumnDef::new(FailedJob::Attempts).integer().not_null())
                    .col(
                        ColumnDef::new(FailedJob::FailedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FailedJob::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PhysicalMailOrder::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WebhookEvent::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RmmIntegration::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RmmIntegration {
    #[sea_orm(iden = "rmm_integrations")]
    Table,
    Id,
    CompanyId,
    Uuid,
    Name,
    Vendor,
    ApiKey,
    WebhookSecret,
    DefaultClientId,
    AutoCreateAssets,
    TicketMinSeverity,
    FieldMappings,
    IsActive,
    LastReceivedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum WebhookEvent {
    #[sea_orm(iden = "webhook_events")]
    Table,
    Id,
    CompanyId,
    Source,
    ExternalId,
    EventType,
    Payload,
    Status,
    Attempts,
    Error,
    ReceivedAt,
    ProcessedAt,
}

#[derive(DeriveIden)]
enum PhysicalMailOrder {
    #[sea_orm(iden = "physical_mail_orders")]
    Table,
    Id,
    CompanyId,
    ClientId,
    InvoiceId,
    ProviderId,
    RecipientName,
    AddressLine1,
    AddressLine2,
    City,
    State,
    PostalCode,
    Country,
    Description,
    Status,
    TrackingNumber,
    LastEventAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum FailedJob {
    #[sea_orm(iden = "failed_jobs")]
    Table,
    Id,
    JobName,
    Payload,
    Error,
    Attempts,
    FailedAt,
}
