use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建 clients 表
        manager
            .create_table(
                Table::create()
                    .table(Client::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Client::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Client::CompanyId).integer().not_null())
                    .col(ColumnDef::new(Client::Name).string().not_null())
                    .col(ColumnDef::new(Client::Email).string().null())
                    .col(ColumnDef::new(Client::Phone).string().null())
                    .col(ColumnDef::new(Client::Website).string().null())
                    .col(ColumnDef::new(Client::Address).string().null())
                    .col(ColumnDef::new(Client::City).string().null())
                    .col(ColumnDef::new(Client::State).string().null())
                    .col(ColumnDef::new(Client::PostalCode).string().null())
                    .col(ColumnDef::new(Client::Country).string().null())
                    .col(
                        ColumnDef::new(Client::Status)
                            .string()
                            .not_null()
                            .default("active"),
                    )
                    .col(ColumnDef::new(Client::Notes).text().null())
                    .col(
                        ColumnDef::new(Client::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Client::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 同一租户下客户名称唯一
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uniq_clients_company_name")
                    .table(Client::Table)
                    .col(Client::CompanyId)
                    .col(Client::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 创建 contacts 表
        manager
            .create_table(
                Table::create()
                    .table(Contact::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Contact::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Contact::CompanyId).integer().not_null())
                    .col(ColumnDef::new(Contact::ClientId).integer().not_null())
                    .col(ColumnDef::new(Contact::Name).string().not_null())
                    .col(ColumnDef::new(Contact::Email).string().null())
                    .col(ColumnDef::new(Contact::Phone).string().null())
                    .col(ColumnDef::new(Contact::Title).string().null())
                    .col(
                        ColumnDef::new(Contact::IsPrimary)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Contact::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Contact::UpdatedAt)
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
                    .name("idx_contacts_client")
                    .table(Contact::Table)
                    .col(Contact::CompanyId)
                    .col(Contact::ClientId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Contact::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Client::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Client {
    #[sea_orm(iden = "clients")]
    Table,
    Id,
    CompanyId,
    Name,
    Email,
    Phone,
    Website,
    Address,
    City,
    State,
    PostalCode,
    Country,
    Status,
    Notes,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Contact {
    #[sea_orm(iden = "contacts")]
    Table,
    Id,
    CompanyId,
    ClientId,
    Name,
    Email,
    Phone,
    Title,
    IsPrimary,
    CreatedAt,
    UpdatedAt,
}
