use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LinkedIdentities::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LinkedIdentities::Identity)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LinkedIdentities::AliasId).string().not_null())
                    .col(
                        ColumnDef::new(LinkedIdentities::AliasName)
                            .string()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LinkedIdentities::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum LinkedIdentities {
    Table,
    Identity,
    AliasId,
    AliasName,
}
