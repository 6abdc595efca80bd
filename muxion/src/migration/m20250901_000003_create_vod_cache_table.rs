use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(VodCache::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VodCache::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(VodCache::MediaType).string().not_null())
                    .col(ColumnDef::new(VodCache::Title).string().not_null())
                    .col(ColumnDef::new(VodCache::SeriesTitle).string().null())
                    .col(ColumnDef::new(VodCache::Season).integer().null())
                    .col(ColumnDef::new(VodCache::Episode).integer().null())
                    .col(ColumnDef::new(VodCache::FilePath).string().not_null())
                    .col(ColumnDef::new(VodCache::SourceUrl).string().not_null())
                    .col(ColumnDef::new(VodCache::RequestedBy).string().not_null())
                    .col(
                        ColumnDef::new(VodCache::DownloadedBytes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(VodCache::TotalBytes).big_integer().null())
                    .col(ColumnDef::new(VodCache::FinalSize).big_integer().null())
                    .col(
                        ColumnDef::new(VodCache::Status)
                            .string()
                            .not_null()
                            .default("downloading"),
                    )
                    .col(ColumnDef::new(VodCache::Error).string().null())
                    .col(
                        ColumnDef::new(VodCache::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(VodCache::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VodCache::LastAccessAt)
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
                    .name("idx_vod_cache_expires_at")
                    .table(VodCache::Table)
                    .col(VodCache::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_vod_cache_status")
                    .table(VodCache::Table)
                    .col(VodCache::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VodCache::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum VodCache {
    Table,
    Id,
    MediaType,
    Title,
    SeriesTitle,
    Season,
    Episode,
    FilePath,
    SourceUrl,
    RequestedBy,
    DownloadedBytes,
    TotalBytes,
    FinalSize,
    Status,
    Error,
    CreatedAt,
    ExpiresAt,
    LastAccessAt,
}
