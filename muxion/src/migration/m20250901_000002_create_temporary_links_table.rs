use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TemporaryLinks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TemporaryLinks::Token)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TemporaryLinks::Identity).string().not_null())
                    .col(ColumnDef::new(TemporaryLinks::Url).string().not_null())
                    .col(ColumnDef::new(TemporaryLinks::Title).string().null())
                    .col(
                        ColumnDef::new(TemporaryLinks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(TemporaryLinks::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_temporary_links_expires_at")
                    .table(TemporaryLinks::Table)
                    .col(TemporaryLinks::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TemporaryLinks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TemporaryLinks {
    Table,
    Token,
    Identity,
    Url,
    Title,
    CreatedAt,
    ExpiresAt,
}
