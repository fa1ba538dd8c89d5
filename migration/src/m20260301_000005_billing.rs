use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建 rate_cards 表
        manager
            .create_table(
                Table::create()
                    .table(RateCard::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RateCard::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RateCard::CompanyId).integer().not_null())
                    .col(ColumnDef::new(RateCard::ClientId).integer().not_null())
                    .col(ColumnDef::new(RateCard::Name).string().not_null())
                    .col(
                        ColumnDef::new(RateCard::HourlyRateCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RateCard::IsDefault)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(RateCard::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(RateCard::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RateCard::UpdatedAt)
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
                    .name("idx_rate_cards_client")
                    .table(RateCard::Table)
                    .col(RateCard::CompanyId)
                    .col(RateCard::ClientId)
                    .to_owned(),
            )
            .await?;

        // 创建 time_entries 表
        manager
            .create_table(
                Table::create()
                    .table(TimeEntry::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TimeEntry::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TimeEntry::CompanyId).integer().not_null())
                    .col(ColumnDef::new(TimeEntry::UserId).integer().not_null())
                    .col(ColumnDef::new(TimeEntry::ClientId).integer().not_null())
                    .col(ColumnDef::new(TimeEntry::TicketId).integer().null())
                    .col(ColumnDef::new(TimeEntry::WorkDate).date().not_null())
                    .col(ColumnDef::new(TimeEntry::Minutes).integer().not_null())
                    .col(ColumnDef::new(TimeEntry::Description).text().null())
                    .col(
                        ColumnDef::new(TimeEntry::Billable)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(TimeEntry::Status)
                            .string()
                            .not_null()
                            .default("draft"),
                    )
                    .col(ColumnDef::new(TimeEntry::InvoiceId).integer().null())
                    .col(
                        ColumnDef::new(TimeEntry::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TimeEntry::UpdatedAt)
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
                    .name("idx_time_entries_billing")
                    .table(TimeEntry::Table)
                    .col(TimeEntry::CompanyId)
                    .col(TimeEntry::Status)
                    .col(TimeEntry::WorkDate)
                    .to_owned(),
            )
            .await?;

        // 创建 employee_time_entries 表
        manager
            .create_table(
                Table::create()
                    .table(EmployeeTimeEntry::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmployeeTimeEntry::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EmployeeTimeEntry::CompanyId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EmployeeTimeEntry::UserId).integer().not_null())
                    .col(
                        ColumnDef::new(EmployeeTimeEntry::ClockIn)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmployeeTimeEntry::ClockOut)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(EmployeeTimeEntry::BreakMinutes)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(EmployeeTimeEntry::TotalMinutes)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(EmployeeTimeEntry::Status)
                            .string()
                            .not_null()
                            .default("in_progress"),
                    )
                    .col(
                        ColumnDef::new(EmployeeTimeEntry::ExportedToPayrollAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(EmployeeTimeEntry::ApprovedBy)
                            .integer()
                            .null(),
                    )
                    .col(ColumnDef::new(EmployeeTimeEntry::Notes).text().null())
                    .col(
                        ColumnDef::new(EmployeeTimeEntry::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmployeeTimeEntry::UpdatedAt)
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
                    .name("idx_employee_time_user")
                    .table(EmployeeTimeEntry::Table)
                    .col(EmployeeTimeEntry::CompanyId)
                    .col(EmployeeTimeEntry::UserId)
                    .col(EmployeeTimeEntry::ClockIn)
                    .to_owned(),
            )
            .await?;

        // 创建 invoices 表
        manager
            .create_table(
                Table::create()
                    .table(Invoice::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Invoice::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Invoice::CompanyId).integer().not_null())
                    .col(ColumnDef::new(Invoice::ClientId).integer().not_null())
                    .col(ColumnDef::new(Invoice::Number).string().not_null())
                    .col(
                        ColumnDef::new(Invoice::Status)
                            .string()
                            .not_null()
                            .default("draft"),
                    )
                    .col(ColumnDef::new(Invoice::IssueDate).date().not_null())
                    .col(ColumnDef::new(Invoice::DueDate).date().not_null())
                    .col(
                        ColumnDef::new(Invoice::SubtotalCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Invoice::TaxRateBp)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Invoice::TaxCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Invoice::TotalCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Invoice::Notes).text().null())
                    .col(
                        ColumnDef::new(Invoice::SentAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Invoice::PaidAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Invoice::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Invoice::UpdatedAt)
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
                    .name("uniq_invoices_company_number")
                    .table(Invoice::Table)
                    .col(Invoice::CompanyId)
                    .col(Invoice::Number)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 创建 invoice_items 表
        manager
            .create_table(
                Table::create()
                    .table(InvoiceItem::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InvoiceItem::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(InvoiceItem::InvoiceId).integer().not_null())
                    .col(ColumnDef::new(InvoiceItem::Description).string().not_null())
                    .col(
                        ColumnDef::new(InvoiceItem::Quantity)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(InvoiceItem::Minutes).integer().null())
                    .col(
                        ColumnDef::new(InvoiceItem::UnitPriceCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InvoiceItem::AmountCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InvoiceItem::TimeEntryId).integer().null())
                    .col(
                        ColumnDef::new(InvoiceItem::SortOrder)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_invoice_items_invoice")
                    .table(InvoiceItem::Table)
                    .col(InvoiceItem::InvoiceId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(InvoiceItem::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Invoice::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EmployeeTimeEntry::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TimeEntry::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RateCard::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RateCard {
    #[sea_orm(iden = "rate_cards")]
    Table,
    Id,
    CompanyId,
    ClientId,
    Name,
    HourlyRateCents,
    IsDefault,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum TimeEntry {
    #[sea_orm(iden = "time_entries")]
    Table,
    Id,
    CompanyId,
    UserId,
    ClientId,
    TicketId,
    WorkDate,
    Minutes,
    Description,
    Billable,
    Status,
    InvoiceId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum EmployeeTimeEntry {
    #[sea_orm(iden = "employee_time_entries")]
    Table,
    Id,
    CompanyId,
    UserId,
    ClockIn,
    ClockOut,
    BreakMinutes,
    TotalMinutes,
    Status,
    ExportedToPayrollAt,
    ApprovedBy,
    Notes,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Invoice {
    #[sea_orm(iden = "invoices")]
    Table,
    Id,
    CompanyId,
    ClientId,
    Number,
    Status,
    IssueDate,
    DueDate,
    SubtotalCents,
    TaxRateBp,
    TaxCents,
    TotalCents,
    Notes,
    SentAt,
    PaidAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum InvoiceItem {
    #[sea_orm(iden = "invoice_items")]
    Table,
    Id,
    InvoiceId,
    Description,
    Quantity,
    Minutes,
    UnitPriceCents,
    AmountCents,
    TimeEntryId,
    SortOrder,
}
