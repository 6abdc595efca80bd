use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(StreamHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StreamHistory::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(StreamHistory::Identity).string().not_null())
                    .col(ColumnDef::new(StreamHistory::StreamId).string().not_null())
                    .col(ColumnDef::new(StreamHistory::StreamType).string().not_null())
                    .col(ColumnDef::new(StreamHistory::Title).string().not_null())
                    .col(ColumnDef::new(StreamHistory::RemoteAddr).string().null())
                    .col(ColumnDef::new(StreamHistory::UserAgent).string().null())
                    .col(
                        ColumnDef::new(StreamHistory::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_stream_history_identity_time")
                    .table(StreamHistory::Table)
                    .col(StreamHistory::Identity)
                    .col(StreamHistory::StartedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StreamHistory::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum StreamHistory {
    Table,
    Id,
    Identity,
    StreamId,
    StreamType,
    Title,
    RemoteAddr,
    UserAgent,
    StartedAt,
}
