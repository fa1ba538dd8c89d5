use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建 assets 表
        manager
            .create_table(
                Table::create()
                    .table(Asset::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Asset::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Asset::CompanyId).integer().not_null())
                    .col(ColumnDef::new(Asset::ClientId).integer().not_null())
                    .col(ColumnDef::new(Asset::Name).string().not_null())
                    .col(
                        ColumnDef::new(Asset::AssetType)
                            .string()
                            .not_null()
                            .default("other"),
                    )
                    .col(ColumnDef::new(Asset::SerialNumber).string().null())
                    .col(ColumnDef::new(Asset::Hostname).string().null())
                    .col(ColumnDef::new(Asset::IpAddress).string().null())
                    .col(ColumnDef::new(Asset::Os).string().null())
                    .col(
                        ColumnDef::new(Asset::Status)
                            .string()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(Asset::SupportStatus)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Asset::SupportContractId).integer().null())
                    .col(ColumnDef::new(Asset::RmmIntegrationId).integer().null())
                    .col(ColumnDef::new(Asset::RmmDeviceId).string().null())
                    .col(
                        ColumnDef::new(Asset::LastSeenAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Asset::Notes).text().null())
                    .col(
                        ColumnDef::new(Asset::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Asset::UpdatedAt)
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
                    .name("idx_assets_client")
                    .table(Asset::Table)
                    .col(Asset::CompanyId)
                    .col(Asset::ClientId)
                    .to_owned(),
            )
            .await?;

        // 同一 RMM 集成下设备 ID 唯一
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uniq_assets_rmm_device")
                    .table(Asset::Table)
                    .col(Asset::RmmIntegrationId)
                    .col(Asset::RmmDeviceId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 创建 contracts 表
        manager
            .create_table(
                Table::create()
                    .table(Contract::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Contract::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Contract::CompanyId).integer().not_null())
                    .col(ColumnDef::new(Contract::ClientId).integer().not_null())
                    .col(ColumnDef::new(Contract::Name).string().not_null())
                    .col(
                        ColumnDef::new(Contract::Status)
                            .string()
                            .not_null()
                            .default("draft"),
                    )
                    .col(ColumnDef::new(Contract::StartDate).date().not_null())
                    .col(ColumnDef::new(Contract::EndDate).date().null())
                    .col(
                        ColumnDef::new(Contract::MonthlyValueCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Contract::CoveredAssetTypes)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Contract::AutoAssignAssets)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Contract::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Contract::UpdatedAt)
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
                    .name("idx_contracts_client")
                    .table(Contract::Table)
                    .col(Contract::CompanyId)
                    .col(Contract::ClientId)
                    .to_owned(),
            )
            .await?;

        // 创建 contract_assets 关联表
        manager
            .create_table(
                Table::create()
                    .table(ContractAsset::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ContractAsset::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ContractAsset::ContractId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ContractAsset::AssetId).integer().not_null())
                    .col(
                        ColumnDef::new(ContractAsset::CreatedAt)
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
                    .name("uniq_contract_assets_pair")
                    .table(ContractAsset::Table)
                    .col(ContractAsset::ContractId)
                    .col(ContractAsset::AssetId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ContractAsset::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Contract::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Asset::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Asset {
    #[sea_orm(iden = "assets")]
    Table,
    Id,
    CompanyId,
    ClientId,
    Name,
    AssetType,
    SerialNumber,
    Hostname,
    IpAddress,
    Os,
    Status,
    SupportStatus,
    SupportContractId,
    RmmIntegrationId,
    RmmDeviceId,
    LastSeenAt,
    Notes,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Contract {
    #[sea_orm(iden = "contracts")]
    Table,
    Id,
    CompanyId,
    ClientId,
    Name,
    Status,
    StartDate,
    EndDate,
    MonthlyValueCents,
    CoveredAssetTypes,
    AutoAssignAssets,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ContractAsset {
    #[sea_orm(iden = "contract_assets")]
    Table,
    Id,
    ContractId,
    AssetId,
    CreatedAt,
}
