use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建 tickets 表
        manager
            .create_table(
                Table::create()
                    .table(Ticket::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Ticket::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Ticket::CompanyId).integer().not_null())
                    .col(ColumnDef::new(Ticket::ClientId).integer().not_null())
                    .col(ColumnDef::new(Ticket::AssetId).integer().null())
                    .col(ColumnDef::new(Ticket::Number).integer().not_null())
                    .col(ColumnDef::new(Ticket::Subject).string().not_null())
                    .col(ColumnDef::new(Ticket::Description).text().null())
                    .col(
                        ColumnDef::new(Ticket::Status)
                            .string()
                            .not_null()
                            .default("new"),
                    )
                    .col(
                        ColumnDef::new(Ticket::Priority)
                            .string()
                            .not_null()
                            .default("medium"),
                    )
                    .col(
                        ColumnDef::new(Ticket::Source)
                            .string()
                            .not_null()
                            .default("manual"),
                    )
                    .col(ColumnDef::new(Ticket::AssigneeId).integer().null())
                    .col(ColumnDef::new(Ticket::CreatedBy).integer().null())
                    .col(
                        ColumnDef::new(Ticket::ResolvedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Ticket::ClosedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Ticket::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Ticket::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 工单号在租户内唯一
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uniq_tickets_company_number")
                    .table(Ticket::Table)
                    .col(Ticket::CompanyId)
                    .col(Ticket::Number)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tickets_client_status")
                    .table(Ticket::Table)
                    .col(Ticket::CompanyId)
                    .col(Ticket::ClientId)
                    .col(Ticket::Status)
                    .to_owned(),
            )
            .await?;

        // 创建 kb_articles 表
        manager
            .create_table(
                Table::create()
                    .table(KbArticle::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(KbArticle::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(KbArticle::CompanyId).integer().not_null())
                    .col(ColumnDef::new(KbArticle::Title).string().not_null())
                    .col(ColumnDef::new(KbArticle::Slug).string().not_null())
                    .col(ColumnDef::new(KbArticle::Body).text().not_null())
                    .col(ColumnDef::new(KbArticle::Category).string().null())
                    .col(
                        ColumnDef::new(KbArticle::Visibility)
                            .string()
                            .not_null()
                            .default("internal"),
                    )
                    .col(
                        ColumnDef::new(KbArticle::Status)
                            .string()
                            .not_null()
                            .default("draft"),
                    )
                    .col(
                        ColumnDef::new(KbArticle::ViewCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(KbArticle::AuthorId).integer().null())
                    .col(
                        ColumnDef::new(KbArticle::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(KbArticle::UpdatedAt)
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
                    .name("uniq_kb_articles_company_slug")
                    .table(KbArticle::Table)
                    .col(KbArticle::CompanyId)
                    .col(KbArticle::Slug)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(KbArticle::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Ticket::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Ticket {
    #[sea_orm(iden = "tickets")]
    Table,
    Id,
    CompanyId,
    ClientId,
    AssetId,
    Number,
    Subject,
    Description,
    Status,
    Priority,
    Source,
    AssigneeId,
    CreatedBy,
    ResolvedAt,
    ClosedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum KbArticle {
    #[sea_orm(iden = "kb_articles")]
    Table,
    Id,
    CompanyId,
    Title,
    Slug,
    Body,
    Category,
    Visibility,
    Status,
    ViewCount,
    AuthorId,
    CreatedAt,
    UpdatedAt,
}
