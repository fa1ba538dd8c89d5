use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 通过 OAuth2 关联的邮箱账户
        manager
            .create_table(
                Table::create()
                    .table(EmailAccount::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmailAccount::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EmailAccount::CompanyId).integer().not_null())
                    .col(ColumnDef::new(EmailAccount::UserId).integer().not_null())
                    .col(ColumnDef::new(EmailAccount::Provider).string().not_null())
                    .col(ColumnDef::new(EmailAccount::Email).string().null())
                    .col(
                        ColumnDef::new(EmailAccount::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(EmailAccount::OauthState)
                            .string()
                            .null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(EmailAccount::AccessToken).text().null())
                    .col(ColumnDef::new(EmailAccount::RefreshToken).text().null())
                    .col(
                        ColumnDef::new(EmailAccount::TokenExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(EmailAccount::Scopes).text().null())
                    .col(ColumnDef::new(EmailAccount::LastError).text().null())
                    .col(
                        ColumnDef::new(EmailAccount::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailAccount::UpdatedAt)
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
                    .name("idx_email_accounts_company")
                    .table(EmailAccount::Table)
                    .col(EmailAccount::CompanyId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EmailAccount::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum EmailAccount {
    #[sea_orm(iden = "email_accounts")]
    Table,
    Id,
    CompanyId,
    UserId,
    Provider,
    Email,
    Status,
    OauthState,
    AccessToken,
    RefreshToken,
    TokenExpiresAt,
    Scopes,
    LastError,
    CreatedAt,
    UpdatedAt,
}
